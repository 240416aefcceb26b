use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::graph_record_id;

stored_object!(VaultConnection, "vault_connection", {
    vault_id: String,
    connection_id: String
});

impl VaultConnection {
    /// The link id is the digest of the pair, so linking twice is a no-op
    /// and the (vault_id, connection_id) set stays unique.
    fn link_id(vault_id: &str, connection_id: &str) -> String {
        graph_record_id(&[vault_id, connection_id])
    }

    pub async fn link(
        vault_id: &str,
        connection_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let now = Utc::now();
        let link = Self {
            id: Self::link_id(vault_id, connection_id),
            created_at: now,
            updated_at: now,
            vault_id: vault_id.to_owned(),
            connection_id: connection_id.to_owned(),
        };

        let stored: Option<Self> = db
            .client
            .upsert((Self::table_name(), link.id.clone()))
            .content(link)
            .await?;
        stored.ok_or_else(|| AppError::InternalError("vault link upsert returned no row".into()))
    }

    pub async fn unlink(
        vault_id: &str,
        connection_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.delete_item::<Self>(&Self::link_id(vault_id, connection_id))
            .await?;
        Ok(())
    }

    pub async fn unlink_all_for_vault(vault_id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.query("DELETE FROM type::table($table) WHERE vault_id = $vault_id")
            .bind(("table", Self::table_name()))
            .bind(("vault_id", vault_id.to_owned()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn list_for_vault(
        vault_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM type::table($table) WHERE vault_id = $vault_id")
            .bind(("table", Self::table_name()))
            .bind(("vault_id", vault_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    /// Union of connection ids reachable from the given vaults. This is the
    /// connection scope used by vault-filtered retrieval.
    pub async fn connection_ids_for_vaults(
        vault_ids: &[String],
        db: &SurrealDbClient,
    ) -> Result<Vec<String>, AppError> {
        if vault_ids.is_empty() {
            return Ok(Vec::new());
        }

        #[derive(Deserialize)]
        struct Row {
            connection_id: String,
        }

        let mut response = db
            .query("SELECT connection_id FROM type::table($table) WHERE vault_id IN $vault_ids")
            .bind(("table", Self::table_name()))
            .bind(("vault_ids", vault_ids.to_vec()))
            .await?;
        let rows: Vec<Row> = response.take(0)?;

        let mut seen = std::collections::HashSet::new();
        let mut ids = Vec::new();
        for row in rows {
            if seen.insert(row.connection_id.clone()) {
                ids.push(row.connection_id);
            }
        }
        Ok(ids)
    }
}
