use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(DocumentChunk, "document_chunk", {
    workspace_id: String,
    document_id: String,
    idx: i64,
    text: String,
    start_offset: i64,
    end_offset: i64
});

impl DocumentChunk {
    pub fn new(
        workspace_id: String,
        document_id: String,
        idx: i64,
        text: String,
        start_offset: i64,
        end_offset: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            workspace_id,
            document_id,
            idx,
            text,
            start_offset,
            end_offset,
        }
    }

    pub async fn delete_by_document(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.query("DELETE FROM type::table($table) WHERE document_id = $document_id")
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_owned()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn list_for_document(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * FROM type::table($table) WHERE document_id = $document_id ORDER BY idx ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    /// Store a document's chunk rows in one transaction so a crash cannot
    /// leave a half-written chunk set behind.
    pub async fn store_many(chunks: Vec<Self>, db: &SurrealDbClient) -> Result<(), AppError> {
        if chunks.is_empty() {
            return Ok(());
        }

        db.client
            .query("BEGIN TRANSACTION;")
            .query(format!(
                "FOR $chunk IN $chunks {{ CREATE type::thing('{table}', $chunk.id) CONTENT $chunk; }};",
                table = Self::table_name(),
            ))
            .query("COMMIT TRANSACTION;")
            .bind(("chunks", chunks))
            .await?
            .check()?;

        Ok(())
    }
}
