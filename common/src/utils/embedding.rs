use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use std::sync::Arc;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::debug;

use crate::{error::AppError, utils::config::AppConfig};

/// Remote embedding client with a fixed model identifier and dimension.
/// Both are pinned at construction so every vector in the store is
/// comparable.
#[derive(Clone)]
pub struct EmbeddingClient {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
    dimensions: u32,
}

impl EmbeddingClient {
    pub fn new(client: Arc<Client<OpenAIConfig>>, config: &AppConfig) -> Self {
        Self {
            client,
            model: config.embed_model.clone(),
            dimensions: config.embed_dim,
        }
    }

    pub fn dimensions(&self) -> u32 {
        self.dimensions
    }

    /// Embed a single input, retrying transient failures with jittered
    /// exponential backoff. Used for query embedding.
    pub async fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let retry_strategy = ExponentialBackoff::from_millis(100).map(jitter).take(3);

        Retry::spawn(retry_strategy, || self.embed_once(input)).await
    }

    async fn embed_once(&self, input: &str) -> Result<Vec<f32>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .dimensions(self.dimensions)
            .input([input])
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        let embedding = response
            .data
            .first()
            .ok_or_else(|| AppError::LLMParsing("No embedding data received".into()))?
            .embedding
            .clone();

        debug!(dimensions = embedding.len(), "embedding created");

        Ok(embedding)
    }

    /// Embed a batch of inputs. The response must contain exactly one
    /// vector per input, in input order; anything else fails the whole
    /// batch so the caller's replay can redo it.
    pub async fn embed_batch(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let expected = inputs.len();
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .dimensions(self.dimensions)
            .input(inputs)
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        if response.data.len() != expected {
            return Err(AppError::LLMParsing(format!(
                "embedding batch size mismatch: sent {expected}, received {}",
                response.data.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        for (position, item) in data.iter().enumerate() {
            if item.index as usize != position {
                return Err(AppError::LLMParsing(format!(
                    "embedding batch order mismatch at position {position} (index {})",
                    item.index
                )));
            }
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}
