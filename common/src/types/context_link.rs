use crate::stored_object;

/// A weak many-to-many association: ChatMessage → Chunk. Deleting
/// either endpoint removes the link; it carries no state of its own.
stored_object!(ContextLink, "context_links", {
    message_id: String,
    chunk_id: String,
});
