use crate::stored_object;

/// A contiguous slice of a Resource's text, paired 1-to-1 with an
/// Embedding via `vector_id`.
stored_object!(Chunk, "resource_chunks", {
    resource_id: String,
    chunk_text: String,
    vector_id: i64,
    generation_method: String,
});

impl Chunk {
    #[must_use]
    pub fn sequential(id: String, resource_id: String, chunk_text: String, vector_id: i64) -> Self {
        let now = chrono::Utc::now();
        Chunk {
            id,
            created_at: now,
            updated_at: now,
            resource_id,
            chunk_text,
            vector_id,
            generation_method: "sequential".to_string(),
        }
    }
}
