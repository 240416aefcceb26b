use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            document::Document,
            document_chunk::DocumentChunk,
            graph_chunk::GraphChunk,
            graph_document::GraphDocument,
            job::{Job, JobType},
        },
    },
    utils::config::AppConfig,
};

use super::{document_payload, JobHandler};
use crate::services::PipelineServices;

/// Embed a document's chunks in bounded batches and MERGE them into the
/// graph. Already-embedded chunks are skipped, so a replay after a partial
/// batch failure only redoes the missing vectors.
pub struct EmbedChunksHandler {
    db: Arc<SurrealDbClient>,
    services: Arc<dyn PipelineServices>,
    config: AppConfig,
}

impl EmbedChunksHandler {
    pub fn new(
        db: Arc<SurrealDbClient>,
        services: Arc<dyn PipelineServices>,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            services,
            config,
        }
    }
}

#[async_trait]
impl JobHandler for EmbedChunksHandler {
    fn job_type(&self) -> JobType {
        JobType::EmbedChunks
    }

    async fn handle(&self, job: &Job) -> Result<(), AppError> {
        let payload = document_payload(job)?;

        let document: Option<Document> = self.db.get_item(&payload.document_id).await?;
        let Some(document) = document else {
            info!(document_id = %payload.document_id, "document missing, skipping embedding");
            return Ok(());
        };

        let chunks = DocumentChunk::list_for_document(&document.id, &self.db).await?;
        if chunks.is_empty() {
            info!(document_id = %document.id, "no chunks to embed");
            return Ok(());
        }

        let already_embedded = GraphChunk::embedded_chunk_ids(&document.id, &self.db).await?;
        let pending: Vec<&DocumentChunk> = chunks
            .iter()
            .filter(|chunk| !already_embedded.contains(&chunk.id))
            .collect();

        if pending.is_empty() {
            // Replay after a crash between embedding and completion; make
            // sure the document node exists and report success.
            GraphDocument::upsert(
                &document.workspace_id,
                &document.id,
                &document.connection_id,
                &self.db,
            )
            .await?;
            debug!(document_id = %document.id, "all chunks already embedded");
            return Ok(());
        }

        let batch_size = self.config.embed_batch.max(1);
        for batch in pending.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();

            // Transient embedding failures bubble to the runner for backoff
            let vectors = self.services.embed_batch(texts).await?;
            if vectors.len() != batch.len() {
                return Err(AppError::Processing(format!(
                    "embedding batch returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                GraphChunk::upsert_embedded(chunk, vector, &document.connection_id, &self.db)
                    .await?;
            }

            debug!(
                document_id = %document.id,
                batch_len = batch.len(),
                "embedded chunk batch"
            );
        }

        info!(
            document_id = %document.id,
            embedded = pending.len(),
            "chunk embedding complete"
        );

        Ok(())
    }
}
