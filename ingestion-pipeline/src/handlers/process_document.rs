use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::job::{Job, JobType},
    },
};

use super::{document_payload, JobHandler};

/// Fan-out stage: a freshly ingested or updated document gets chunked.
/// EMBED and EXTRACT are chained by the chunk stage so chunks exist first.
pub struct ProcessDocumentHandler {
    db: Arc<SurrealDbClient>,
}

impl ProcessDocumentHandler {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl JobHandler for ProcessDocumentHandler {
    fn job_type(&self) -> JobType {
        JobType::ProcessDocument
    }

    async fn handle(&self, job: &Job) -> Result<(), AppError> {
        let payload = document_payload(job)?;
        info!(document_id = %payload.document_id, "PROCESS_DOCUMENT fan-out");

        Job::enqueue_for_document(
            &job.workspace_id,
            JobType::ChunkDocument,
            &payload.document_id,
            &self.db,
        )
        .await?;

        Ok(())
    }
}
