use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use common::{
    error::AppError, storage::db::SurrealDbClient, utils::config::AppConfig,
    utils::embedding::EmbeddingClient,
};
use retrieval_pipeline::{answer::AnswerClient, reranking::RerankerPool};

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub embedding_client: Arc<EmbeddingClient>,
    pub answer_client: Arc<AnswerClient>,
    pub reranker_pool: Option<Arc<RerankerPool>>,
}

impl ApiState {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        openai_client: Arc<Client<OpenAIConfig>>,
        reranker_pool: Option<Arc<RerankerPool>>,
    ) -> Result<Self, AppError> {
        let embedding_client = Arc::new(EmbeddingClient::new(Arc::clone(&openai_client), &config));
        let answer_client = Arc::new(AnswerClient::new(openai_client, &config));

        Ok(Self {
            db,
            config,
            embedding_client,
            answer_client,
            reranker_pool,
        })
    }
}
