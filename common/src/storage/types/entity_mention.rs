use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(EntityMention, "entity_mention", {
    workspace_id: String,
    document_id: String,
    chunk_id: Option<String>,
    entity_key: String,
    entity_type: String,
    entity_name: String,
    confidence: f32
});

impl EntityMention {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workspace_id: String,
        document_id: String,
        chunk_id: Option<String>,
        entity_key: String,
        entity_type: String,
        entity_name: String,
        confidence: f32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            workspace_id,
            document_id,
            chunk_id,
            entity_key,
            entity_type,
            entity_name,
            confidence,
        }
    }

    /// Replace all mentions of one document in a single transaction.
    /// Extraction always rewrites the full mention set, so replay after a
    /// crash converges on the same rows.
    pub async fn replace_for_document(
        workspace_id: &str,
        document_id: &str,
        mentions: Vec<Self>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query("BEGIN TRANSACTION;")
            .query(format!(
                "DELETE FROM {table} WHERE workspace_id = $workspace_id AND document_id = $document_id;",
                table = Self::table_name(),
            ))
            .query(format!(
                "FOR $mention IN $mentions {{ CREATE type::thing('{table}', $mention.id) CONTENT $mention; }};",
                table = Self::table_name(),
            ))
            .query("COMMIT TRANSACTION;")
            .bind(("workspace_id", workspace_id.to_owned()))
            .bind(("document_id", document_id.to_owned()))
            .bind(("mentions", mentions))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn list_for_document(
        workspace_id: &str,
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * FROM type::table($table) \
                 WHERE workspace_id = $workspace_id AND document_id = $document_id",
            )
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.to_owned()))
            .bind(("document_id", document_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn delete_by_document(
        workspace_id: &str,
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.query(
            "DELETE FROM type::table($table) \
             WHERE workspace_id = $workspace_id AND document_id = $document_id",
        )
        .bind(("table", Self::table_name()))
        .bind(("workspace_id", workspace_id.to_owned()))
        .bind(("document_id", document_id.to_owned()))
        .await?
        .check()?;
        Ok(())
    }
}
