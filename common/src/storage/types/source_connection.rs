use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// External source kinds the ingestion boundary understands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Mail,
    Note,
    Drive,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Mail => "mail",
            SourceType::Note => "note",
            SourceType::Drive => "drive",
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "mail" => Ok(SourceType::Mail),
            "note" => Ok(SourceType::Note),
            "drive" => Ok(SourceType::Drive),
            other => Err(format!("unknown source type '{other}'")),
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Active,
    Inactive,
    Error,
}

stored_object!(SourceConnection, "source_connection", {
    workspace_id: String,
    source_type: SourceType,
    external_auth_id: String,
    status: ConnectionStatus
});

impl SourceConnection {
    pub fn new(
        workspace_id: String,
        source_type: SourceType,
        external_auth_id: String,
        status: ConnectionStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            workspace_id,
            source_type,
            external_auth_id,
            status,
        }
    }

    pub async fn register(
        workspace_id: String,
        source_type: SourceType,
        external_auth_id: String,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let connection = Self::new(
            workspace_id,
            source_type,
            external_auth_id,
            ConnectionStatus::Active,
        );
        db.store_item(connection.clone()).await?;
        Ok(connection)
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

    /// Resolve a connection by the identity the external gateway uses for it.
    pub async fn find_by_external_auth_id(
        external_auth_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM type::table($table) WHERE external_auth_id = $external_auth_id LIMIT 1")
            .bind(("table", Self::table_name()))
            .bind(("external_auth_id", external_auth_id.to_owned()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;
        Ok(rows.into_iter().next())
    }
}
