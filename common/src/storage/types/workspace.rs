use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::vault::Vault;

stored_object!(Workspace, "workspace", {
    name: String
});

impl Workspace {
    pub fn new(name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            name,
        }
    }

    /// Create a workspace together with its default vault. Every workspace
    /// owns exactly one vault with `is_default = true`.
    pub async fn create_with_default_vault(
        name: String,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let workspace = Self::new(name);

        db.store_item(workspace.clone()).await?;

        let default_vault = Vault::new(
            workspace.id.clone(),
            "Default".to_string(),
            None,
            true,
        );
        db.store_item(default_vault).await?;

        Ok(workspace)
    }

    pub async fn list(db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM type::table($table) ORDER BY created_at ASC")
            .bind(("table", Self::table_name()))
            .await?;
        Ok(response.take(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::vault::Vault;

    #[tokio::test]
    async fn test_create_with_default_vault() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        let workspace = Workspace::create_with_default_vault("Acme".to_string(), &db)
            .await
            .expect("Failed to create workspace");

        assert_eq!(workspace.name, "Acme");

        let vaults = Vault::list_for_workspace(&workspace.id, &db)
            .await
            .expect("Failed to list vaults");
        assert_eq!(vaults.len(), 1);
        assert!(vaults[0].is_default);
        assert_eq!(vaults[0].name, "Default");
    }

    #[tokio::test]
    async fn test_list_workspaces() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        Workspace::create_with_default_vault("One".to_string(), &db)
            .await
            .expect("workspace one");
        Workspace::create_with_default_vault("Two".to_string(), &db)
            .await
            .expect("workspace two");

        let all = Workspace::list(&db).await.expect("list workspaces");
        assert_eq!(all.len(), 2);
    }
}
