use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::graph_record_id;

/// Graph node labels. Anything the extractor invents beyond the known set
/// lands on Topic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GraphEntityType {
    Person,
    Company,
    Topic,
}

impl GraphEntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            GraphEntityType::Person => "Person",
            GraphEntityType::Company => "Company",
            GraphEntityType::Topic => "Topic",
        }
    }
}

impl From<&str> for GraphEntityType {
    fn from(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "person" => GraphEntityType::Person,
            "company" => GraphEntityType::Company,
            _ => GraphEntityType::Topic,
        }
    }
}

impl std::fmt::Display for GraphEntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

stored_object!(GraphEntity, "graph_entity", {
    workspace_id: String,
    key: String,
    entity_type: GraphEntityType,
    name: String,
    email: Option<String>,
    domain: Option<String>
});

impl GraphEntity {
    pub fn node_id(workspace_id: &str, key: &str) -> String {
        graph_record_id(&[workspace_id, key])
    }

    /// MERGE the entity node by (workspace_id, key): independent documents
    /// that resolve the same key converge on one node.
    pub async fn upsert(
        workspace_id: &str,
        key: &str,
        entity_type: GraphEntityType,
        name: &str,
        email: Option<String>,
        domain: Option<String>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.query(
            "UPSERT type::thing($table, $id) SET \
                workspace_id = $workspace_id, \
                key = $key, \
                entity_type = $entity_type, \
                name = $name, \
                email = $email, \
                domain = $domain, \
                created_at = IF created_at != NONE THEN created_at ELSE time::now() END, \
                updated_at = time::now()",
        )
        .bind(("table", Self::table_name()))
        .bind(("id", Self::node_id(workspace_id, key)))
        .bind(("workspace_id", workspace_id.to_owned()))
        .bind(("key", key.to_owned()))
        .bind(("entity_type", entity_type))
        .bind(("name", name.to_owned()))
        .bind(("email", email))
        .bind(("domain", domain))
        .await?
        .check()?;
        Ok(())
    }

    pub async fn find_by_key(
        workspace_id: &str,
        key: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let found: Option<Self> = db.get_item(&Self::node_id(workspace_id, key)).await?;
        Ok(found)
    }
}
