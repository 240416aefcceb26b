use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::graph_record_id;

stored_object!(GraphDocument, "graph_document", {
    workspace_id: String,
    key: String,
    document_id: String,
    connection_id: String
});

impl GraphDocument {
    pub fn doc_key(document_id: &str) -> String {
        format!("doc:{document_id}")
    }

    pub fn node_id(workspace_id: &str, document_id: &str) -> String {
        graph_record_id(&[workspace_id, &Self::doc_key(document_id)])
    }

    /// MERGE the document node by (workspace_id, key). The record id is the
    /// digest of that pair, so repeated upserts converge.
    pub async fn upsert(
        workspace_id: &str,
        document_id: &str,
        connection_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.query(
            "UPSERT type::thing($table, $id) SET \
                workspace_id = $workspace_id, \
                key = $key, \
                document_id = $document_id, \
                connection_id = $connection_id, \
                created_at = IF created_at != NONE THEN created_at ELSE time::now() END, \
                updated_at = time::now()",
        )
        .bind(("table", Self::table_name()))
        .bind(("id", Self::node_id(workspace_id, document_id)))
        .bind(("workspace_id", workspace_id.to_owned()))
        .bind(("key", Self::doc_key(document_id)))
        .bind(("document_id", document_id.to_owned()))
        .bind(("connection_id", connection_id.to_owned()))
        .await?
        .check()?;
        Ok(())
    }
}
