//! Environment-driven settings. No identifiers or credentials appear in
//! code paths; everything here is read from `config.toml` (if present)
//! layered with environment variables.

use config::{Config, Environment, File};
use serde::Deserialize;

fn default_transactional_path() -> String {
    "mem://".to_string()
}

fn default_transactional_username() -> String {
    String::new()
}

fn default_transactional_password() -> String {
    String::new()
}

fn default_transactional_namespace() -> String {
    "ltmc".to_string()
}

fn default_transactional_database() -> String {
    "ltmc".to_string()
}

fn default_vector_index_path() -> String {
    "mem://".to_string()
}

fn default_vector_namespace() -> String {
    "ltmc".to_string()
}

fn default_vector_database() -> String {
    "vectors".to_string()
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_embedding_dimension() -> usize {
    384
}

fn default_graph_address() -> String {
    "mem://".to_string()
}

fn default_graph_namespace() -> String {
    "ltmc".to_string()
}

fn default_graph_database() -> String {
    "graph".to_string()
}

fn default_cache_address() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_warning_depth() -> u32 {
    7
}

fn default_max_depth() -> u32 {
    10
}

fn default_loop_window() -> usize {
    5
}

fn default_circuit_breaker_timeout_secs() -> u64 {
    30
}

fn default_max_content_bytes() -> usize {
    100 * 1024
}

fn default_max_metadata_bytes() -> usize {
    10 * 1024
}

fn default_max_concurrent_ops() -> u32 {
    50
}

fn default_max_memory_mb() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Connection address for the transactional store (source of truth).
    /// `mem://` for an embedded in-process engine, or a `ws://`/`wss://`
    /// URL for a standalone SurrealDB server.
    #[serde(default = "default_transactional_path")]
    pub transactional_path: String,
    #[serde(default = "default_transactional_username")]
    pub transactional_username: String,
    #[serde(default = "default_transactional_password")]
    pub transactional_password: String,
    #[serde(default = "default_transactional_namespace")]
    pub transactional_namespace: String,
    #[serde(default = "default_transactional_database")]
    pub transactional_database: String,
    /// Connection address for the vector store. Kept as a distinct
    /// connection from the transactional store even when both point at
    /// the same server, so each backend fails independently.
    #[serde(default = "default_vector_index_path")]
    pub vector_index_path: String,
    #[serde(default = "default_vector_namespace")]
    pub vector_namespace: String,
    #[serde(default = "default_vector_database")]
    pub vector_database: String,
    #[serde(default = "default_graph_address")]
    pub graph_address: String,
    #[serde(default = "default_graph_namespace")]
    pub graph_namespace: String,
    #[serde(default = "default_graph_database")]
    pub graph_database: String,
    #[serde(default = "default_cache_address")]
    pub cache_address: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default = "default_warning_depth")]
    pub warning_depth: u32,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_loop_window")]
    pub loop_window: usize,
    #[serde(default = "default_circuit_breaker_timeout_secs")]
    pub circuit_breaker_timeout_secs: u64,
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,
    #[serde(default = "default_max_metadata_bytes")]
    pub max_metadata_bytes: usize,
    #[serde(default = "default_max_concurrent_ops")]
    pub max_concurrent_ops: u32,
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            transactional_path: default_transactional_path(),
            transactional_username: default_transactional_username(),
            transactional_password: default_transactional_password(),
            transactional_namespace: default_transactional_namespace(),
            transactional_database: default_transactional_database(),
            vector_index_path: default_vector_index_path(),
            vector_namespace: default_vector_namespace(),
            vector_database: default_vector_database(),
            graph_address: default_graph_address(),
            graph_namespace: default_graph_namespace(),
            graph_database: default_graph_database(),
            cache_address: default_cache_address(),
            embedding_model: default_embedding_model(),
            embedding_dimension: default_embedding_dimension(),
            warning_depth: default_warning_depth(),
            max_depth: default_max_depth(),
            loop_window: default_loop_window(),
            circuit_breaker_timeout_secs: default_circuit_breaker_timeout_secs(),
            max_content_bytes: default_max_content_bytes(),
            max_metadata_bytes: default_max_metadata_bytes(),
            max_concurrent_ops: default_max_concurrent_ops(),
            max_memory_mb: default_max_memory_mb(),
        }
    }
}

/// Loads configuration from `config.toml` (optional) and environment
/// variables (prefix-free, matching field names), falling back to
/// sensible defaults for anything unset.
pub fn get_config() -> Result<AppConfig, config::ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default());

    builder.build()?.try_deserialize()
}
