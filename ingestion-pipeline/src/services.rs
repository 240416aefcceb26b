use std::sync::Arc;

use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;

use common::{
    error::AppError,
    storage::types::document::Document,
    utils::{config::AppConfig, embedding::EmbeddingClient},
};

use crate::extraction::{ExtractionClient, ExtractionResult};

/// External collaborators of the stage handlers. Tests substitute a stub so
/// no handler test ever leaves the process.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    async fn embed_batch(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, AppError>;

    async fn extract(&self, document: &Document) -> Result<ExtractionResult, AppError>;
}

pub struct DefaultPipelineServices {
    embedding: EmbeddingClient,
    extraction: ExtractionClient,
}

impl DefaultPipelineServices {
    pub fn new(openai_client: Arc<Client<OpenAIConfig>>, config: &AppConfig) -> Self {
        Self {
            embedding: EmbeddingClient::new(Arc::clone(&openai_client), config),
            extraction: ExtractionClient::new(openai_client, config),
        }
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn embed_batch(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        self.embedding.embed_batch(inputs).await
    }

    async fn extract(&self, document: &Document) -> Result<ExtractionResult, AppError> {
        self.extraction
            .extract(
                &document.content_text,
                document.title.as_deref().unwrap_or(""),
                document.author_name.as_deref().unwrap_or(""),
                document.author_email.as_deref().unwrap_or(""),
                document.source_type.as_str(),
            )
            .await
    }
}
