use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub openai_api_key: String,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    pub http_port: u16,
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
    #[serde(default = "default_embed_dim")]
    pub embed_dim: u32,
    #[serde(default = "default_embed_batch")]
    pub embed_batch: usize,
    #[serde(default = "default_extraction_model")]
    pub extraction_model: String,
    #[serde(default = "default_answer_model")]
    pub answer_model: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: i64,
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: i64,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_rerank_candidate_multiplier")]
    pub rerank_candidate_multiplier: usize,
    #[serde(default = "default_ingest_max_body_bytes")]
    pub ingest_max_body_bytes: usize,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub reranking_enabled: bool,
    #[serde(default)]
    pub reranking_pool_size: Option<usize>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embed_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embed_dim() -> u32 {
    1536
}

fn default_embed_batch() -> usize {
    50
}

fn default_extraction_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_answer_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_chunk_size() -> usize {
    1200
}

fn default_chunk_overlap() -> usize {
    150
}

fn default_max_attempts() -> u32 {
    3
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_backoff_base_secs() -> i64 {
    30
}

fn default_claim_lease_secs() -> i64 {
    300
}

fn default_max_depth() -> u32 {
    4
}

fn default_rerank_candidate_multiplier() -> usize {
    3
}

fn default_ingest_max_body_bytes() -> usize {
    10_000_000
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

impl Default for AppConfig {
    /// In-memory defaults used by tests and local smoke runs.
    fn default() -> Self {
        Self {
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: "root".to_string(),
            surrealdb_password: "root".to_string(),
            surrealdb_namespace: "test_ns".to_string(),
            surrealdb_database: "test_db".to_string(),
            openai_api_key: "test-key".to_string(),
            openai_base_url: default_base_url(),
            http_port: 0,
            embed_model: default_embed_model(),
            embed_dim: default_embed_dim(),
            embed_batch: default_embed_batch(),
            extraction_model: default_extraction_model(),
            answer_model: default_answer_model(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_attempts: default_max_attempts(),
            poll_interval_secs: default_poll_interval_secs(),
            backoff_base_secs: default_backoff_base_secs(),
            claim_lease_secs: default_claim_lease_secs(),
            max_depth: default_max_depth(),
            rerank_candidate_multiplier: default_rerank_candidate_multiplier(),
            ingest_max_body_bytes: default_ingest_max_body_bytes(),
            webhook_secret: None,
            reranking_enabled: false,
            reranking_pool_size: None,
        }
    }
}
