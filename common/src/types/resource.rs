use crate::stored_object;
use serde::{Deserialize, Serialize};

/// Small enumerated vocabulary for `Resource.resource_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Document,
    Code,
    Note,
    Summary,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceType::Document => "document",
            ResourceType::Code => "code",
            ResourceType::Note => "note",
            ResourceType::Summary => "summary",
        };
        f.write_str(s)
    }
}

impl From<String> for ResourceType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "code" => ResourceType::Code,
            "note" => ResourceType::Note,
            "summary" => ResourceType::Summary,
            _ => ResourceType::Document,
        }
    }
}

stored_object!(Resource, "resources", {
    file_name: String,
    resource_type: ResourceType,
    content: String,
});
