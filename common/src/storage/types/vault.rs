use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::vault_connection::VaultConnection;

stored_object!(Vault, "vault", {
    workspace_id: String,
    name: String,
    description: Option<String>,
    is_default: bool
});

impl Vault {
    pub fn new(
        workspace_id: String,
        name: String,
        description: Option<String>,
        is_default: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            workspace_id,
            name,
            description,
            is_default,
        }
    }

    /// Create a non-default vault. Names are unique per workspace.
    pub async fn create(
        workspace_id: String,
        name: String,
        description: Option<String>,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let mut existing = db
            .query("SELECT * FROM type::table($table) WHERE workspace_id = $workspace_id AND name = $name")
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.clone()))
            .bind(("name", name.clone()))
            .await?;
        let clashes: Vec<Self> = existing.take(0)?;
        if !clashes.is_empty() {
            return Err(AppError::Validation(format!(
                "vault '{name}' already exists in workspace"
            )));
        }

        let vault = Self::new(workspace_id, name, description, false);
        db.store_item(vault.clone()).await?;
        Ok(vault)
    }

    pub async fn list_for_workspace(
        workspace_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * FROM type::table($table) WHERE workspace_id = $workspace_id ORDER BY created_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn patch(
        id: &str,
        name: Option<String>,
        description: Option<String>,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let existing: Option<Self> = db.get_item(id).await?;
        let mut vault = existing.ok_or_else(|| AppError::NotFound(format!("Vault {id} not found")))?;

        if let Some(name) = name {
            vault.name = name;
        }
        if description.is_some() {
            vault.description = description;
        }
        vault.updated_at = Utc::now();

        let updated: Option<Self> = db
            .update((Self::table_name(), id))
            .content(vault)
            .await?;
        updated.ok_or_else(|| AppError::InternalError("vault update returned no row".into()))
    }

    /// Delete a vault. The default vault is never deletable, and neither is
    /// a vault whose linked connections still own documents.
    pub async fn delete(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        let existing: Option<Self> = db.get_item(id).await?;
        let vault = existing.ok_or_else(|| AppError::NotFound(format!("Vault {id} not found")))?;

        if vault.is_default {
            return Err(AppError::Validation(
                "Cannot delete the default vault".to_string(),
            ));
        }

        let connection_ids = VaultConnection::connection_ids_for_vaults(&[id.to_owned()], db).await?;
        if !connection_ids.is_empty() {
            #[derive(Deserialize)]
            struct CountRow {
                count: i64,
            }
            let mut response = db
                .query(
                    "SELECT count() AS count FROM document WHERE workspace_id = $workspace_id AND connection_id IN $connection_ids GROUP ALL",
                )
                .bind(("workspace_id", vault.workspace_id.clone()))
                .bind(("connection_ids", connection_ids))
                .await?;
            let rows: Vec<CountRow> = response.take(0)?;
            if rows.first().map_or(0, |r| r.count) > 0 {
                return Err(AppError::Validation(
                    "Cannot delete vault that contains documents".to_string(),
                ));
            }
        }

        VaultConnection::unlink_all_for_vault(id, db).await?;
        db.delete_item::<Self>(id).await?;
        Ok(())
    }
}
