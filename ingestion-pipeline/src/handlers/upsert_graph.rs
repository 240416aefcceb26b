use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            graph_document::GraphDocument,
            graph_entity::{GraphEntity, GraphEntityType},
            graph_relation::{MentionsEdge, RelationEdge},
            job::{Job, JobType},
        },
    },
};

use super::JobHandler;
use crate::extraction::postprocess::UpsertGraphPayload;

/// Project the resolved extraction into the workspace graph: entity nodes,
/// MENTIONS edges and typed inter-entity edges. Every write merges on a
/// deterministic key, so replaying the payload is a no-op.
pub struct UpsertGraphHandler {
    db: Arc<SurrealDbClient>,
}

impl UpsertGraphHandler {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl JobHandler for UpsertGraphHandler {
    fn job_type(&self) -> JobType {
        JobType::UpsertGraph
    }

    async fn handle(&self, job: &Job) -> Result<(), AppError> {
        let payload: UpsertGraphPayload = serde_json::from_value(job.payload.clone())
            .map_err(|err| AppError::Processing(format!("malformed graph payload: {err}")))?;

        let workspace_id = &job.workspace_id;

        GraphDocument::upsert(
            workspace_id,
            &payload.document_id,
            &payload.connection_id,
            &self.db,
        )
        .await?;

        for entity in &payload.entities {
            GraphEntity::upsert(
                workspace_id,
                &entity.key,
                GraphEntityType::from(entity.entity_type.as_str()),
                &entity.name,
                entity.email.clone(),
                entity.domain.clone(),
                &self.db,
            )
            .await?;

            MentionsEdge::store(workspace_id, &payload.document_id, &entity.key, 1.0, &self.db)
                .await?;
        }

        for relation in &payload.relations {
            RelationEdge::store(
                workspace_id,
                &relation.from_key,
                &relation.to_key,
                &relation.relation_type,
                &payload.document_id,
                &relation.evidence,
                &self.db,
            )
            .await?;
        }

        info!(
            document_id = %payload.document_id,
            entity_count = payload.entities.len(),
            relation_count = payload.relations.len(),
            "graph upsert done"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::postprocess::{ResolvedEntity, ResolvedRelation};
    use std::collections::HashMap;
    use uuid::Uuid;

    async fn setup() -> Arc<SurrealDbClient> {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        Arc::new(
            SurrealDbClient::memory(namespace, database)
                .await
                .expect("Failed to start in-memory surrealdb"),
        )
    }

    fn payload() -> UpsertGraphPayload {
        UpsertGraphPayload {
            document_id: "d1".to_string(),
            connection_id: "c1".to_string(),
            entities: vec![
                ResolvedEntity {
                    key: "person:email:alice@acme.com".to_string(),
                    entity_type: "Person".to_string(),
                    name: "Alice".to_string(),
                    email: Some("alice@acme.com".to_string()),
                    domain: None,
                    confidence: 1.0,
                    evidence: String::new(),
                    evidence_chunk_ids: Vec::new(),
                },
                ResolvedEntity {
                    key: "company:domain:acme.com".to_string(),
                    entity_type: "Company".to_string(),
                    name: "Acme".to_string(),
                    email: None,
                    domain: Some("acme.com".to_string()),
                    confidence: 1.0,
                    evidence: String::new(),
                    evidence_chunk_ids: Vec::new(),
                },
            ],
            relations: vec![ResolvedRelation {
                from_key: "person:email:alice@acme.com".to_string(),
                to_key: "company:domain:acme.com".to_string(),
                relation_type: "works at".to_string(),
                evidence: "Alice works at Acme.".to_string(),
                evidence_chunk_ids: Vec::new(),
            }],
            entity_keys: HashMap::new(),
        }
    }

    fn upsert_job(payload: &UpsertGraphPayload) -> Job {
        Job::new(
            "ws1".to_string(),
            JobType::UpsertGraph,
            serde_json::to_value(payload).expect("payload json"),
        )
    }

    async fn count(db: &SurrealDbClient, table: &str) -> i64 {
        #[derive(serde::Deserialize)]
        struct CountRow {
            count: i64,
        }
        let mut response = db
            .query(format!("SELECT count() AS count FROM {table} GROUP ALL"))
            .await
            .expect("count query");
        let rows: Vec<CountRow> = response.take(0).expect("take");
        rows.first().map_or(0, |r| r.count)
    }

    #[tokio::test]
    async fn test_graph_projection_creates_nodes_and_edges() {
        let db = setup().await;
        let handler = UpsertGraphHandler::new(Arc::clone(&db));

        handler.handle(&upsert_job(&payload())).await.expect("handle");

        assert_eq!(count(&db, "graph_document").await, 1);
        assert_eq!(count(&db, "graph_entity").await, 2);
        assert_eq!(count(&db, "mentions").await, 2);
        assert_eq!(count(&db, "relates_to").await, 1);

        let node_id = GraphEntity::node_id("ws1", "person:email:alice@acme.com");
        let rows = RelationEdge::touching("ws1", &[node_id], &db)
            .await
            .expect("touching");
        assert_eq!(rows[0].relation_type, "WORKS_AT");
        assert_eq!(rows[0].document_id, "d1");
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let db = setup().await;
        let handler = UpsertGraphHandler::new(Arc::clone(&db));
        let job = upsert_job(&payload());

        handler.handle(&job).await.expect("first run");
        let baseline = (
            count(&db, "graph_document").await,
            count(&db, "graph_entity").await,
            count(&db, "mentions").await,
            count(&db, "relates_to").await,
        );

        handler.handle(&job).await.expect("second run");
        let replayed = (
            count(&db, "graph_document").await,
            count(&db, "graph_entity").await,
            count(&db, "mentions").await,
            count(&db, "relates_to").await,
        );

        assert_eq!(baseline, replayed);
    }

    #[tokio::test]
    async fn test_unknown_entity_type_lands_on_topic() {
        let db = setup().await;
        let handler = UpsertGraphHandler::new(Arc::clone(&db));

        let mut graph_payload = payload();
        graph_payload.entities = vec![ResolvedEntity {
            key: "gadget:name:flux capacitor".to_string(),
            entity_type: "Gadget".to_string(),
            name: "Flux Capacitor".to_string(),
            email: None,
            domain: None,
            confidence: 1.0,
            evidence: String::new(),
            evidence_chunk_ids: Vec::new(),
        }];
        graph_payload.relations.clear();

        handler
            .handle(&upsert_job(&graph_payload))
            .await
            .expect("handle");

        let entity = GraphEntity::find_by_key("ws1", "gadget:name:flux capacitor", &db)
            .await
            .expect("find")
            .expect("entity node");
        assert_eq!(entity.entity_type, GraphEntityType::Topic);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_a_processing_error() {
        let db = setup().await;
        let handler = UpsertGraphHandler::new(db);

        let job = Job::new(
            "ws1".to_string(),
            JobType::UpsertGraph,
            serde_json::json!({ "document_id": "d1" }),
        );

        let result = handler.handle(&job).await;
        assert!(matches!(result, Err(AppError::Processing(_))));
    }
}
