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
            job::{Job, JobType},
        },
    },
    utils::config::AppConfig,
};

use super::{document_payload, JobHandler};
use crate::chunker::chunk_text;

/// Deterministically re-chunk a document: the old chunk rows and graph
/// chunk nodes are dropped and rebuilt, then embedding and extraction are
/// chained.
pub struct ChunkDocumentHandler {
    db: Arc<SurrealDbClient>,
    config: AppConfig,
}

impl ChunkDocumentHandler {
    pub fn new(db: Arc<SurrealDbClient>, config: AppConfig) -> Self {
        Self { db, config }
    }
}

#[async_trait]
impl JobHandler for ChunkDocumentHandler {
    fn job_type(&self) -> JobType {
        JobType::ChunkDocument
    }

    async fn handle(&self, job: &Job) -> Result<(), AppError> {
        let payload = document_payload(job)?;

        let document: Option<Document> = self.db.get_item(&payload.document_id).await?;
        let Some(document) = document else {
            // The document can legitimately disappear between enqueue and
            // claim; nothing to do.
            info!(document_id = %payload.document_id, "document missing, skipping chunking");
            return Ok(());
        };

        let pieces = chunk_text(
            &document.content_text,
            self.config.chunk_size,
            self.config.chunk_overlap,
        );
        if pieces.is_empty() {
            info!(document_id = %document.id, "document is empty, skipping chunking");
            return Ok(());
        }

        DocumentChunk::delete_by_document(&document.id, &self.db).await?;
        GraphChunk::delete_by_document(&document.id, &self.db).await?;

        let rows: Vec<DocumentChunk> = pieces
            .into_iter()
            .map(|piece| {
                DocumentChunk::new(
                    document.workspace_id.clone(),
                    document.id.clone(),
                    piece.idx as i64,
                    piece.text,
                    piece.start_offset as i64,
                    piece.end_offset as i64,
                )
            })
            .collect();
        let chunk_count = rows.len();

        DocumentChunk::store_many(rows, &self.db).await?;

        debug!(
            document_id = %document.id,
            chunk_count,
            "chunk rows rewritten"
        );

        Job::enqueue_for_document(
            &job.workspace_id,
            JobType::EmbedChunks,
            &document.id,
            &self.db,
        )
        .await?;
        Job::enqueue_for_document(
            &job.workspace_id,
            JobType::ExtractEntitiesRelations,
            &document.id,
            &self.db,
        )
        .await?;

        Ok(())
    }
}
