//! Data model. Every entity implements [`StoredObject`] via the
//! [`stored_object!`] macro: a string id (tolerant of SurrealDB `Thing` or
//! plain-string wire shapes), `created_at`, `updated_at`, and whatever
//! fields the entity adds.

pub mod chat_message;
pub mod chunk;
pub mod context_link;
pub mod document;
pub mod relationship;
pub mod resource;
pub mod scoring_weights;
pub mod thought;
pub mod todo;
pub mod vector_id_sequence;

use serde::{Deserialize, Serialize};

pub trait StoredObject: Serialize + for<'de> Deserialize<'de> {
    fn table_name() -> &'static str;
    fn get_id(&self) -> &str;
}

/// Generates a row-shaped entity struct with a flexible-id `id` field plus
/// `created_at`/`updated_at`, and its [`StoredObject`] impl. Talks to the
/// transactional adapter purely in terms of `chrono::DateTime<Utc>` and
/// plain strings rather than any backend-specific datetime wire format.
#[macro_export]
macro_rules! stored_object {
    ($name:ident, $table:expr, {$($(#[$attr:meta])* $field:ident: $ty:ty),* $(,)?}) => {
        #[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
        pub struct $name {
            #[serde(deserialize_with = "$crate::types::deserialize_flexible_id")]
            pub id: String,
            pub created_at: chrono::DateTime<chrono::Utc>,
            pub updated_at: chrono::DateTime<chrono::Utc>,
            $( $(#[$attr])* pub $field: $ty),*
        }

        impl $crate::types::StoredObject for $name {
            fn table_name() -> &'static str {
                $table
            }

            fn get_id(&self) -> &str {
                &self.id
            }
        }
    };
}

struct FlexibleIdVisitor;

impl<'de> serde::de::Visitor<'de> for FlexibleIdVisitor {
    type Value = String;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a string or a SurrealDB record id")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(value.to_string())
    }

    fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(value)
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        // SurrealDB record ids come back over the wire as `{ tb, id }`.
        // We only care about the id half.
        let mut id = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == "id" {
                id = Some(map.next_value::<String>()?);
            } else {
                let _ = map.next_value::<serde_json::Value>()?;
            }
        }
        id.ok_or_else(|| serde::de::Error::missing_field("id"))
    }
}

pub fn deserialize_flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserializer.deserialize_any(FlexibleIdVisitor)
}

/// Validates a caller-supplied identifier against 's character
/// class (`[A-Za-z0-9_-]+` plus ULID characters, which are a subset) and
/// length limit.
pub fn validate_identifier(id: &str) -> Result<(), crate::error::CoreError> {
    if id.is_empty() || id.len() > 255 {
        return Err(crate::error::CoreError::Validation(format!(
            "identifier length must be in 1..=255, got {}",
            id.len()
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(crate::error::CoreError::Validation(format!(
            "identifier '{id}' contains characters outside [A-Za-z0-9_-]"
        )));
    }
    const DANGEROUS_SUBSTRINGS: [&str; 6] = ["--", ";", "/*", "*/", "xp_", "drop table"];
    let lowered = id.to_ascii_lowercase();
    if DANGEROUS_SUBSTRINGS.iter().any(|needle| lowered.contains(needle)) {
        return Err(crate::error::CoreError::Validation(format!(
            "identifier '{id}' contains a disallowed substring"
        )));
    }
    Ok(())
}

/// Validates a caller-supplied metadata blob against the safety guard's
/// size limit (serialisable JSON, ≤10 KB).
pub fn validate_metadata(
    metadata: &serde_json::Value,
    max_bytes: usize,
) -> Result<(), crate::error::CoreError> {
    let encoded = serde_json::to_vec(metadata)?;
    if encoded.len() > max_bytes {
        return Err(crate::error::CoreError::Validation(format!(
            "metadata is {} bytes, exceeds limit of {max_bytes}",
            encoded.len()
        )));
    }
    Ok(())
}
