use std::collections::HashSet;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{graph_entity::GraphEntity, graph_relation::RelationEdge},
    },
};

use crate::GraphFact;

/// Bounded breadth-first expansion over the relation edges, starting from
/// the seed entity keys. Each hop expands the frontier through every edge
/// touching it, in either direction; edges are reported once and the walk
/// stops at `max_facts`. Rows are ordered by edge id per hop so identical
/// input yields identical output.
pub async fn traverse_facts(
    workspace_id: &str,
    seed_keys: &[String],
    depth: u32,
    max_facts: usize,
    db: &SurrealDbClient,
) -> Result<Vec<GraphFact>, AppError> {
    if depth == 0 || seed_keys.is_empty() || max_facts == 0 {
        return Ok(Vec::new());
    }

    let mut frontier: Vec<String> = seed_keys
        .iter()
        .map(|key| GraphEntity::node_id(workspace_id, key))
        .collect();
    let mut visited_nodes: HashSet<String> = frontier.iter().cloned().collect();
    let mut seen_edges: HashSet<String> = HashSet::new();
    let mut facts = Vec::new();

    for _hop in 0..depth {
        if frontier.is_empty() || facts.len() >= max_facts {
            break;
        }

        let mut rows = RelationEdge::touching(workspace_id, &frontier, db).await?;
        rows.sort_by(|a, b| a.id.cmp(&b.id));

        let mut next_frontier = Vec::new();
        for row in rows {
            if facts.len() >= max_facts {
                break;
            }
            if !seen_edges.insert(row.id.clone()) {
                continue;
            }

            for endpoint in [&row.from_id, &row.to_id] {
                if visited_nodes.insert(endpoint.clone()) {
                    next_frontier.push(endpoint.clone());
                }
            }

            facts.push(GraphFact {
                from_key: row.from_key,
                from_name: row.from_name,
                relation: row.relation_type,
                to_key: row.to_key,
                to_name: row.to_name,
                document_id: row.document_id,
                evidence: row.evidence,
            });
        }

        frontier = next_frontier;
    }

    Ok(facts)
}
