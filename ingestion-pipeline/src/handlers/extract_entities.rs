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
            entity_mention::EntityMention,
            job::{Job, JobType},
        },
    },
};

use super::{document_payload, JobHandler};
use crate::{
    extraction::postprocess::{augment_with_author, resolve_extraction, UpsertGraphPayload},
    services::PipelineServices,
};

/// Run LLM extraction over a document, post-process deterministically and
/// rewrite the document's mention set, then hand the resolved payload to
/// the graph upsert stage.
pub struct ExtractEntitiesHandler {
    db: Arc<SurrealDbClient>,
    services: Arc<dyn PipelineServices>,
}

impl ExtractEntitiesHandler {
    pub fn new(db: Arc<SurrealDbClient>, services: Arc<dyn PipelineServices>) -> Self {
        Self { db, services }
    }
}

#[async_trait]
impl JobHandler for ExtractEntitiesHandler {
    fn job_type(&self) -> JobType {
        JobType::ExtractEntitiesRelations
    }

    async fn handle(&self, job: &Job) -> Result<(), AppError> {
        let payload = document_payload(job)?;

        let document: Option<Document> = self.db.get_item(&payload.document_id).await?;
        let Some(document) = document else {
            info!(document_id = %payload.document_id, "document missing, skipping extraction");
            return Ok(());
        };
        if document.content_text.trim().is_empty() {
            info!(document_id = %document.id, "document is empty, skipping extraction");
            return Ok(());
        }

        let mut result = self.services.extract(&document).await?;
        augment_with_author(
            &mut result,
            document.author_name.as_deref(),
            document.author_email.as_deref(),
        );

        let chunks = DocumentChunk::list_for_document(&document.id, &self.db).await?;
        let chunk_pairs: Vec<(String, String)> = chunks
            .into_iter()
            .map(|chunk| (chunk.id, chunk.text))
            .collect();

        let (entities, relations, entity_keys) = resolve_extraction(&result, &chunk_pairs);

        debug!(
            document_id = %document.id,
            entity_count = entities.len(),
            relation_count = relations.len(),
            "extraction resolved"
        );

        let mentions: Vec<EntityMention> = entities
            .iter()
            .map(|entity| {
                EntityMention::new(
                    document.workspace_id.clone(),
                    document.id.clone(),
                    entity.evidence_chunk_ids.first().cloned(),
                    entity.key.clone(),
                    entity.entity_type.clone(),
                    entity.name.clone(),
                    entity.confidence,
                )
            })
            .collect();

        EntityMention::replace_for_document(&document.workspace_id, &document.id, mentions, &self.db)
            .await?;

        if Job::has_pending(
            &job.workspace_id,
            JobType::UpsertGraph,
            &document.id,
            &self.db,
        )
        .await?
        {
            debug!(document_id = %document.id, "graph upsert already pending");
            return Ok(());
        }

        let graph_payload = UpsertGraphPayload {
            document_id: document.id.clone(),
            connection_id: document.connection_id.clone(),
            entities,
            relations,
            entity_keys,
        };
        Job::enqueue(
            &job.workspace_id,
            JobType::UpsertGraph,
            serde_json::to_value(graph_payload)
                .map_err(|err| AppError::Processing(format!("serializing graph payload: {err}")))?,
            &self.db,
        )
        .await?;

        Ok(())
    }
}
