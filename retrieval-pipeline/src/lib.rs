//! Retrieval Pipeline: query embedding, k-NN search, chunk
//! re-hydration, score fusion, and chat/context-link logging.

pub mod config;
pub mod pipeline;
pub mod scoring;

pub use config::RetrievalConfig;
pub use pipeline::{RetrievalPipeline, RetrievalResult, RetrievedChunk};
