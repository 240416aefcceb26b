use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::{
    document_chunk::DocumentChunk,
    entity_mention::EntityMention,
    graph_chunk::GraphChunk,
    graph_relation::MentionsEdge,
    job::{Job, JobType},
    source_connection::SourceType,
};

stored_object!(Document, "document", {
    workspace_id: String,
    connection_id: String,
    source_type: SourceType,
    external_id: String,
    url: Option<String>,
    title: Option<String>,
    author_name: Option<String>,
    author_email: Option<String>,
    content_text: String,
    content_hash: String
});

/// Canonical document shape handed over by the ingestion boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestDocument {
    pub workspace_id: String,
    pub connection_id: String,
    pub source_type: SourceType,
    pub external_id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
    pub content_text: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub document_id: String,
    pub status: IngestStatus,
}

pub fn content_hash(content_text: &str) -> String {
    hex::encode(Sha256::digest(content_text.as_bytes()))
}

impl Document {
    /// Dedup entry point for all ingestion paths.
    ///
    /// Looks the document up by its (workspace, source_type, external_id)
    /// identity. A new identity inserts; an identical content hash is a
    /// no-op; a differing hash updates the row in place. Created and updated
    /// documents get a PROCESS_DOCUMENT job enqueued.
    pub async fn ingest(
        request: IngestDocument,
        db: &SurrealDbClient,
    ) -> Result<IngestOutcome, AppError> {
        let hash = content_hash(&request.content_text);

        let existing = Self::find_by_external(
            &request.workspace_id,
            request.source_type,
            &request.external_id,
            db,
        )
        .await?;

        let outcome = match existing {
            Some(row) if row.content_hash == hash => {
                return Ok(IngestOutcome {
                    document_id: row.id,
                    status: IngestStatus::Unchanged,
                });
            }
            Some(row) => {
                let updated = Self {
                    url: request.url,
                    title: request.title,
                    author_name: request.author_name,
                    author_email: request.author_email,
                    content_text: request.content_text,
                    content_hash: hash,
                    connection_id: request.connection_id,
                    updated_at: Utc::now(),
                    ..row
                };
                let document_id = updated.id.clone();
                let _: Option<Self> = db
                    .update((Self::table_name(), document_id.clone()))
                    .content(updated)
                    .await?;
                IngestOutcome {
                    document_id,
                    status: IngestStatus::Updated,
                }
            }
            None => {
                let now = Utc::now();
                let document = Self {
                    id: Uuid::new_v4().to_string(),
                    created_at: now,
                    updated_at: now,
                    workspace_id: request.workspace_id.clone(),
                    connection_id: request.connection_id,
                    source_type: request.source_type,
                    external_id: request.external_id,
                    url: request.url,
                    title: request.title,
                    author_name: request.author_name,
                    author_email: request.author_email,
                    content_text: request.content_text,
                    content_hash: hash,
                };
                let document_id = document.id.clone();
                db.store_item(document).await?;
                IngestOutcome {
                    document_id,
                    status: IngestStatus::Created,
                }
            }
        };

        Job::enqueue(
            &request.workspace_id,
            JobType::ProcessDocument,
            serde_json::json!({ "document_id": outcome.document_id }),
            db,
        )
        .await?;

        Ok(outcome)
    }

    pub async fn find_by_external(
        workspace_id: &str,
        source_type: SourceType,
        external_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * FROM type::table($table) \
                 WHERE workspace_id = $workspace_id \
                   AND source_type = $source_type \
                   AND external_id = $external_id \
                 LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.to_owned()))
            .bind(("source_type", source_type))
            .bind(("external_id", external_id.to_owned()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Fetch several documents of one workspace, keyed by id. Used to attach
    /// title/url/source provenance to retrieved chunks.
    pub async fn fetch_map(
        workspace_id: &str,
        ids: &[String],
        db: &SurrealDbClient,
    ) -> Result<std::collections::HashMap<String, Self>, AppError> {
        if ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }

        let things: Vec<Thing> = ids
            .iter()
            .map(|id| Thing::from((Self::table_name(), id.as_str())))
            .collect();

        let mut response = db
            .query(
                "SELECT * FROM type::table($table) WHERE id IN $things AND workspace_id = $workspace_id",
            )
            .bind(("table", Self::table_name()))
            .bind(("things", things))
            .bind(("workspace_id", workspace_id.to_owned()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;

        Ok(rows.into_iter().map(|d| (d.id.clone(), d)).collect())
    }

    /// Delete a document and everything derived from it: chunk rows, mention
    /// rows, graph chunk nodes and mention edges. Graph entity nodes stay,
    /// other documents may reference them.
    pub async fn delete_with_derived(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        let existing: Option<Self> = db.get_item(id).await?;
        let Some(document) = existing else {
            return Ok(());
        };

        DocumentChunk::delete_by_document(id, db).await?;
        EntityMention::delete_by_document(&document.workspace_id, id, db).await?;
        GraphChunk::delete_by_document(id, db).await?;
        MentionsEdge::delete_by_document(&document.workspace_id, id, db).await?;

        db.delete_item::<Self>(id).await?;
        Ok(())
    }
}
