//! Process entry point: tracing init, config load, adapter
//! connection, engine construction. Transport is out of scope for this
//! workspace; there is no server loop here, only the startup sequence a
//! transport binary would run before handing off to its router.

use std::sync::Arc;

use common::config::get_config;
use common::embedding::HashedEmbeddingProvider;
use main::Engine;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;
    info!(
        transactional_path = %config.transactional_path,
        vector_index_path = %config.vector_index_path,
        graph_address = %config.graph_address,
        embedding_dimension = config.embedding_dimension,
        "starting long-term memory coordination engine"
    );

    // No embedding-model backend ships in this workspace; hosts wiring in a
    // real model should call `Engine::connect_with_embeddings` directly
    // instead of this binary.
    let embeddings = Arc::new(HashedEmbeddingProvider::new(config.embedding_dimension));
    let engine = Engine::connect_with_embeddings(config, embeddings).await?;

    info!("engine ready; no transport is wired in this workspace");
    let _ = engine;
    Ok(())
}
