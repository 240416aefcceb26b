use std::collections::HashSet;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::{document_chunk::DocumentChunk, graph_document::GraphDocument, graph_record_id};

stored_object!(GraphChunk, "graph_chunk", {
    workspace_id: String,
    document_id: String,
    chunk_id: String,
    idx: i64,
    text: String,
    start_offset: i64,
    end_offset: i64,
    embedding: Option<Vec<f32>>,
    connection_id: String
});

/// One pre-filtered vector search hit.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub idx: i64,
    pub text: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub connection_id: String,
    pub score: f32,
}

impl GraphChunk {
    fn part_of_edge_id(workspace_id: &str, chunk_id: &str) -> String {
        graph_record_id(&[workspace_id, "part_of", chunk_id])
    }

    /// MERGE the chunk node with its embedding and its PART_OF edge to the
    /// document node, all in one transaction. The chunk row id doubles as
    /// the node id, so replaying the embed stage rewrites the same records.
    pub async fn upsert_embedded(
        chunk: &DocumentChunk,
        embedding: Vec<f32>,
        connection_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let doc_node_id = GraphDocument::node_id(&chunk.workspace_id, &chunk.document_id);
        let edge_id = Self::part_of_edge_id(&chunk.workspace_id, &chunk.id);

        db.client
            .query("BEGIN TRANSACTION;")
            .query(
                "UPSERT type::thing('graph_document', $doc_node_id) SET \
                    workspace_id = $workspace_id, \
                    key = $doc_key, \
                    document_id = $document_id, \
                    connection_id = $connection_id, \
                    created_at = IF created_at != NONE THEN created_at ELSE time::now() END, \
                    updated_at = time::now();",
            )
            .query(
                "UPSERT type::thing('graph_chunk', $chunk_id) SET \
                    workspace_id = $workspace_id, \
                    document_id = $document_id, \
                    chunk_id = $chunk_id, \
                    idx = $idx, \
                    text = $text, \
                    start_offset = $start_offset, \
                    end_offset = $end_offset, \
                    embedding = $embedding, \
                    connection_id = $connection_id, \
                    created_at = IF created_at != NONE THEN created_at ELSE time::now() END, \
                    updated_at = time::now();",
            )
            .query("DELETE type::thing('part_of', $edge_id);")
            .query(
                "LET $chunk_node = type::thing('graph_chunk', $chunk_id); \
                 LET $doc_node = type::thing('graph_document', $doc_node_id); \
                 RELATE $chunk_node->part_of->$doc_node CONTENT { \
                    id: type::thing('part_of', $edge_id), \
                    workspace_id: $workspace_id, \
                    document_id: $document_id \
                 };",
            )
            .query("COMMIT TRANSACTION;")
            .bind(("doc_node_id", doc_node_id))
            .bind(("doc_key", GraphDocument::doc_key(&chunk.document_id)))
            .bind(("edge_id", edge_id))
            .bind(("workspace_id", chunk.workspace_id.clone()))
            .bind(("document_id", chunk.document_id.clone()))
            .bind(("chunk_id", chunk.id.clone()))
            .bind(("idx", chunk.idx))
            .bind(("text", chunk.text.clone()))
            .bind(("start_offset", chunk.start_offset))
            .bind(("end_offset", chunk.end_offset))
            .bind(("embedding", embedding))
            .bind(("connection_id", connection_id.to_owned()))
            .await?
            .check()?;

        Ok(())
    }

    /// Chunk ids of a document that already carry an embedding. The embed
    /// handler skips these on replay.
    pub async fn embedded_chunk_ids(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<HashSet<String>, AppError> {
        #[derive(Deserialize)]
        struct Row {
            chunk_id: String,
        }

        let mut response = db
            .query(
                "SELECT chunk_id FROM type::table($table) \
                 WHERE document_id = $document_id AND embedding != NONE",
            )
            .bind(("table", Self::table_name()))
            .bind(("document_id", document_id.to_owned()))
            .await?;
        let rows: Vec<Row> = response.take(0)?;
        Ok(rows.into_iter().map(|r| r.chunk_id).collect())
    }

    /// Remove a document's chunk nodes together with their PART_OF edges.
    pub async fn delete_by_document(
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query("BEGIN TRANSACTION;")
            .query("LET $chunks = (SELECT VALUE id FROM graph_chunk WHERE document_id = $document_id);")
            .query("DELETE FROM part_of WHERE in IN $chunks;")
            .query("DELETE FROM graph_chunk WHERE document_id = $document_id;")
            .query("COMMIT TRANSACTION;")
            .bind(("document_id", document_id.to_owned()))
            .await?
            .check()?;
        Ok(())
    }

    /// Tenant-prefiltered exact nearest neighbour search: only chunks that
    /// pass the workspace (and optional connection-scope) predicate are
    /// scored, so isolation never depends on an approximate index.
    pub async fn vector_search(
        workspace_id: &str,
        query_embedding: Vec<f32>,
        connection_ids: Option<Vec<String>>,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        let scope_clause = if connection_ids.is_some() {
            "AND connection_id IN $connection_ids "
        } else {
            ""
        };

        let sql = format!(
            "SELECT chunk_id, document_id, idx, text, start_offset, end_offset, connection_id, \
                    vector::similarity::cosine(embedding, $embedding) AS score \
             FROM {table} \
             WHERE workspace_id = $workspace_id \
               AND embedding != NONE \
               {scope_clause}\
             ORDER BY score DESC \
             LIMIT $limit",
            table = Self::table_name(),
        );

        let mut query = db
            .query(sql)
            .bind(("workspace_id", workspace_id.to_owned()))
            .bind(("embedding", query_embedding))
            .bind(("limit", i64::try_from(limit).unwrap_or(i64::MAX)));
        if let Some(connection_ids) = connection_ids {
            query = query.bind(("connection_ids", connection_ids));
        }

        let mut response = query.await?;
        Ok(response.take(0)?)
    }
}
