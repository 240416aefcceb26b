use serde::{Deserialize, Serialize};

use crate::{error::AppError, storage::db::SurrealDbClient};

use super::{
    graph_document::GraphDocument,
    graph_entity::{deserialize_flexible_id, GraphEntity, GraphEntityType},
    graph_record_id,
};

pub const EVIDENCE_MAX_CHARS: usize = 200;

/// Normalised edge label: upper-case, spaces to underscores, falling back to
/// RELATED_TO for an empty type.
pub fn normalize_relation_type(relation_type: &str) -> String {
    let normalized = relation_type.trim().to_uppercase().replace(' ', "_");
    if normalized.is_empty() {
        "RELATED_TO".to_string()
    } else {
        normalized
    }
}

/// `MENTIONS` edges from document nodes to entity nodes.
pub struct MentionsEdge;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeedEntity {
    pub key: String,
    pub entity_type: GraphEntityType,
    pub name: String,
}

impl MentionsEdge {
    fn edge_id(workspace_id: &str, document_id: &str, entity_key: &str) -> String {
        graph_record_id(&[workspace_id, document_id, entity_key])
    }

    /// MERGE (Document)-[MENTIONS]->(Entity). Delete-then-relate on a
    /// deterministic edge id keeps replays from duplicating the edge.
    pub async fn store(
        workspace_id: &str,
        document_id: &str,
        entity_key: &str,
        confidence: f32,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query("BEGIN TRANSACTION;")
            .query(
                "LET $doc = type::thing('graph_document', $doc_node_id); \
                 LET $entity = type::thing('graph_entity', $entity_node_id); \
                 DELETE type::thing('mentions', $edge_id); \
                 RELATE $doc->mentions->$entity CONTENT { \
                    id: type::thing('mentions', $edge_id), \
                    workspace_id: $workspace_id, \
                    document_id: $document_id, \
                    confidence: $confidence \
                 };",
            )
            .query("COMMIT TRANSACTION;")
            .bind(("doc_node_id", GraphDocument::node_id(workspace_id, document_id)))
            .bind(("entity_node_id", GraphEntity::node_id(workspace_id, entity_key)))
            .bind(("edge_id", Self::edge_id(workspace_id, document_id, entity_key)))
            .bind(("workspace_id", workspace_id.to_owned()))
            .bind(("document_id", document_id.to_owned()))
            .bind(("confidence", confidence))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn delete_by_document(
        workspace_id: &str,
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.query(
            "DELETE FROM mentions WHERE workspace_id = $workspace_id AND document_id = $document_id",
        )
        .bind(("workspace_id", workspace_id.to_owned()))
        .bind(("document_id", document_id.to_owned()))
        .await?
        .check()?;
        Ok(())
    }

    /// Distinct entities mentioned by the given documents, in first-seen
    /// order. These are the seeds for graph traversal.
    pub async fn seed_entities_for_documents(
        workspace_id: &str,
        document_ids: &[String],
        db: &SurrealDbClient,
    ) -> Result<Vec<SeedEntity>, AppError> {
        if document_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut response = db
            .query(
                "SELECT out.key AS key, out.entity_type AS entity_type, out.name AS name \
                 FROM mentions \
                 WHERE workspace_id = $workspace_id AND document_id IN $document_ids",
            )
            .bind(("workspace_id", workspace_id.to_owned()))
            .bind(("document_ids", document_ids.to_vec()))
            .await?;
        let rows: Vec<SeedEntity> = response.take(0)?;

        let mut seen = std::collections::HashSet::new();
        let mut seeds = Vec::new();
        for row in rows {
            if seen.insert(row.key.clone()) {
                seeds.push(row);
            }
        }
        Ok(seeds)
    }
}

/// Typed inter-entity edges (`WORKS_AT`, `HAS_CONTACT`, ...), stored in one
/// `relates_to` edge table with the label as a property.
pub struct RelationEdge;

/// One traversed edge with both endpoints resolved.
#[derive(Debug, Clone, Deserialize)]
pub struct RelationRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub from_id: String,
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub to_id: String,
    pub from_key: String,
    pub from_name: String,
    pub to_key: String,
    pub to_name: String,
    pub relation_type: String,
    pub document_id: String,
    #[serde(default)]
    pub evidence: Option<String>,
}

impl RelationEdge {
    fn edge_id(workspace_id: &str, from_key: &str, relation_type: &str, to_key: &str) -> String {
        graph_record_id(&[workspace_id, from_key, relation_type, to_key])
    }

    /// MERGE a directed typed edge between two entity nodes of the same
    /// workspace. Evidence is truncated to 200 chars of provenance.
    pub async fn store(
        workspace_id: &str,
        from_key: &str,
        to_key: &str,
        relation_type: &str,
        document_id: &str,
        evidence: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let relation_type = normalize_relation_type(relation_type);
        let evidence: String = evidence.chars().take(EVIDENCE_MAX_CHARS).collect();
        let edge_id = Self::edge_id(workspace_id, from_key, &relation_type, to_key);

        db.client
            .query("BEGIN TRANSACTION;")
            .query(
                "LET $from = type::thing('graph_entity', $from_node_id); \
                 LET $to = type::thing('graph_entity', $to_node_id); \
                 DELETE type::thing('relates_to', $edge_id); \
                 RELATE $from->relates_to->$to CONTENT { \
                    id: type::thing('relates_to', $edge_id), \
                    workspace_id: $workspace_id, \
                    relation_type: $relation_type, \
                    document_id: $document_id, \
                    evidence: $evidence \
                 };",
            )
            .query("COMMIT TRANSACTION;")
            .bind(("from_node_id", GraphEntity::node_id(workspace_id, from_key)))
            .bind(("to_node_id", GraphEntity::node_id(workspace_id, to_key)))
            .bind(("edge_id", edge_id))
            .bind(("workspace_id", workspace_id.to_owned()))
            .bind(("relation_type", relation_type))
            .bind(("document_id", document_id.to_owned()))
            .bind(("evidence", evidence))
            .await?
            .check()?;
        Ok(())
    }

    /// All edges touching any of the given entity node ids, with endpoint
    /// keys and names resolved through the edge. One BFS frontier expansion.
    pub async fn touching(
        workspace_id: &str,
        entity_node_ids: &[String],
        db: &SurrealDbClient,
    ) -> Result<Vec<RelationRow>, AppError> {
        if entity_node_ids.is_empty() {
            return Ok(Vec::new());
        }

        let things: Vec<surrealdb::sql::Thing> = entity_node_ids
            .iter()
            .map(|id| surrealdb::sql::Thing::from(("graph_entity", id.as_str())))
            .collect();

        let mut response = db
            .query(
                "SELECT id, \
                        in AS from_id, out AS to_id, \
                        in.key AS from_key, in.name AS from_name, \
                        out.key AS to_key, out.name AS to_name, \
                        relation_type, document_id, evidence \
                 FROM relates_to \
                 WHERE workspace_id = $workspace_id AND (in IN $things OR out IN $things)",
            )
            .bind(("workspace_id", workspace_id.to_owned()))
            .bind(("things", things))
            .await?;
        Ok(response.take(0)?)
    }
}
