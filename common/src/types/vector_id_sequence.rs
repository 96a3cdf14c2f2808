use crate::stored_object;

/// Single-row sequence backing `allocate_next_vector_id`. Updates are
/// serialised by the transactional adapter's own local transaction
/// semantics.
stored_object!(VectorIdSequence, "vector_id_sequence", {
    last_vector_id: i64,
});

pub const SINGLETON_ID: &str = "default";
