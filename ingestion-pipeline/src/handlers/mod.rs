mod chunk_document;
mod embed_chunks;
mod extract_entities;
mod process_document;
mod upsert_graph;

pub use chunk_document::ChunkDocumentHandler;
pub use embed_chunks::EmbedChunksHandler;
pub use extract_entities::ExtractEntitiesHandler;
pub use process_document::ProcessDocumentHandler;
pub use upsert_graph::UpsertGraphHandler;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::job::{Job, JobType},
    },
    utils::config::AppConfig,
};

use crate::services::PipelineServices;

/// One pipeline stage. Handlers are idempotent: the queue is at-least-once,
/// so a handler must produce the same observable outcome when replayed with
/// the same payload.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> JobType;

    async fn handle(&self, job: &Job) -> Result<(), AppError>;
}

/// Write-once job-type dispatch table, built at startup.
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.job_type(), handler);
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    /// Registry wired with the five stage handlers.
    pub fn with_default_handlers(
        db: Arc<SurrealDbClient>,
        services: Arc<dyn PipelineServices>,
        config: AppConfig,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ProcessDocumentHandler::new(Arc::clone(&db))));
        registry.register(Arc::new(ChunkDocumentHandler::new(
            Arc::clone(&db),
            config.clone(),
        )));
        registry.register(Arc::new(EmbedChunksHandler::new(
            Arc::clone(&db),
            Arc::clone(&services),
            config,
        )));
        registry.register(Arc::new(ExtractEntitiesHandler::new(
            Arc::clone(&db),
            services,
        )));
        registry.register(Arc::new(UpsertGraphHandler::new(db)));
        registry
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload shared by the four per-document stages.
#[derive(Debug, Deserialize)]
pub struct DocumentPayload {
    pub document_id: String,
}

pub(crate) fn document_payload(job: &Job) -> Result<DocumentPayload, AppError> {
    serde_json::from_value(job.payload.clone())
        .map_err(|err| AppError::Processing(format!("malformed job payload: {err}")))
}
