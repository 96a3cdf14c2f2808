//! Ingestion Pipeline: chunking, embedding, sequential
//! vector-id allocation, and persistence for Resources and their Chunks.

pub mod chunking;
pub mod config;
pub mod pipeline;

pub use chunking::{split_into_chunks, ChunkingTuning};
pub use config::IngestionConfig;
pub use pipeline::{IngestResult, IngestionPipeline};
