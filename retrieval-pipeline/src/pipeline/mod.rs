mod config;

pub use config::{RetrievalOptions, TRAVERSAL_HOP_CAP};

use std::time::{Duration, Instant};

use tracing::{info, warn};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            document::Document, graph_chunk::GraphChunk, graph_relation::MentionsEdge,
            vault_connection::VaultConnection,
        },
    },
    utils::embedding::EmbeddingClient,
};

use crate::{graph::traverse_facts, reranking::RerankerLease, RetrievalOutput, RetrievedChunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Embed,
    Scope,
    VectorSearch,
    Rerank,
    SeedEntities,
    Traverse,
    Enrich,
}

/// Wall-clock per stage, recorded in execution order.
#[derive(Debug, Default, Clone)]
pub struct PipelineStageTimings {
    timings: Vec<(StageKind, Duration)>,
}

impl PipelineStageTimings {
    pub fn record(&mut self, kind: StageKind, duration: Duration) {
        self.timings.push((kind, duration));
    }

    pub fn get_ms(&self, kind: StageKind) -> u128 {
        self.timings
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, d)| d.as_millis())
            .unwrap_or(0)
    }

    pub fn into_vec(self) -> Vec<(StageKind, Duration)> {
        self.timings
    }
}

/// Full retrieval pipeline: embed the prompt, then search, rerank, seed and
/// traverse.
pub async fn run_pipeline(
    db: &SurrealDbClient,
    embedding_client: &EmbeddingClient,
    workspace_id: &str,
    prompt: &str,
    options: RetrievalOptions,
    reranker: Option<RerankerLease>,
) -> Result<RetrievalOutput, AppError> {
    let prompt_chars = prompt.chars().count();
    info!(
        %workspace_id,
        prompt_chars,
        depth = options.depth,
        top_k = options.top_k,
        vault_scoped = options.vault_ids.is_some(),
        "starting retrieval pipeline"
    );

    let stage_start = Instant::now();
    let query_embedding = embedding_client.embed(prompt).await?;
    let embed_elapsed = stage_start.elapsed();

    let mut output =
        run_pipeline_with_embedding(db, query_embedding, workspace_id, prompt, options, reranker)
            .await?;
    output.stage_timings.record(StageKind::Embed, embed_elapsed);
    Ok(output)
}

/// Pipeline with an injected query embedding. This is the seam tests (and
/// callers that already hold a vector) use to skip the embedding call.
pub async fn run_pipeline_with_embedding(
    db: &SurrealDbClient,
    query_embedding: Vec<f32>,
    workspace_id: &str,
    prompt: &str,
    options: RetrievalOptions,
    reranker: Option<RerankerLease>,
) -> Result<RetrievalOutput, AppError> {
    let mut timings = PipelineStageTimings::default();

    // Connection scope: vault ids resolve to the union of their linked
    // connections. An empty scope means there is nothing to search.
    let stage_start = Instant::now();
    let connection_scope = match &options.vault_ids {
        Some(vault_ids) => {
            let connection_ids =
                VaultConnection::connection_ids_for_vaults(vault_ids, db).await?;
            if connection_ids.is_empty() {
                info!(%workspace_id, "vault scope resolves to no connections");
                timings.record(StageKind::Scope, stage_start.elapsed());
                return Ok(RetrievalOutput {
                    stage_timings: timings,
                    ..RetrievalOutput::default()
                });
            }
            Some(connection_ids)
        }
        None => None,
    };
    timings.record(StageKind::Scope, stage_start.elapsed());

    // Pre-filtered exact nearest neighbour search, over-fetched for the
    // reranker.
    let stage_start = Instant::now();
    let candidates = GraphChunk::vector_search(
        workspace_id,
        query_embedding,
        connection_scope,
        options.candidate_count(),
        db,
    )
    .await?;
    timings.record(StageKind::VectorSearch, stage_start.elapsed());

    let stage_start = Instant::now();
    let top_chunks = match reranker {
        Some(lease) if !candidates.is_empty() => {
            let documents: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
            let results = lease.rerank(prompt, documents).await?;

            let mut reranked = Vec::with_capacity(options.top_k);
            for result in results.into_iter().take(options.top_k) {
                if let Some(candidate) = candidates.get(result.index) {
                    let mut candidate = candidate.clone();
                    candidate.score = result.score;
                    reranked.push(candidate);
                }
            }
            reranked
        }
        _ => candidates.into_iter().take(options.top_k).collect(),
    };
    timings.record(StageKind::Rerank, stage_start.elapsed());

    if top_chunks.is_empty() {
        return Ok(RetrievalOutput {
            stage_timings: timings,
            ..RetrievalOutput::default()
        });
    }

    // Seed entities from the MENTIONS edges of the hit documents.
    let stage_start = Instant::now();
    let mut document_ids: Vec<String> = Vec::new();
    for chunk in &top_chunks {
        if !document_ids.contains(&chunk.document_id) {
            document_ids.push(chunk.document_id.clone());
        }
    }
    let seed_entities =
        MentionsEdge::seed_entities_for_documents(workspace_id, &document_ids, db).await?;
    timings.record(StageKind::SeedEntities, stage_start.elapsed());

    // Graph traversal is best-effort: a failure degrades the answer to
    // chunks only instead of failing the query.
    let stage_start = Instant::now();
    let seed_keys: Vec<String> = seed_entities.iter().map(|s| s.key.clone()).collect();
    let traversal_depth = options.depth.min(TRAVERSAL_HOP_CAP);
    let facts = match traverse_facts(
        workspace_id,
        &seed_keys,
        traversal_depth,
        options.max_facts,
        db,
    )
    .await
    {
        Ok(facts) => facts,
        Err(err) => {
            warn!(%workspace_id, error = %err, "graph traversal failed, continuing with chunks only");
            Vec::new()
        }
    };
    timings.record(StageKind::Traverse, stage_start.elapsed());

    // Attach document provenance to each chunk.
    let stage_start = Instant::now();
    let documents = Document::fetch_map(workspace_id, &document_ids, db).await?;
    let chunks: Vec<RetrievedChunk> = top_chunks
        .into_iter()
        .map(|chunk| {
            let document = documents.get(&chunk.document_id);
            RetrievedChunk {
                chunk_id: chunk.chunk_id,
                document_id: chunk.document_id,
                text: chunk.text,
                start_offset: chunk.start_offset,
                end_offset: chunk.end_offset,
                score: chunk.score,
                doc_title: document.and_then(|d| d.title.clone()),
                doc_url: document.and_then(|d| d.url.clone()),
                doc_source_type: document.map(|d| d.source_type.as_str().to_string()),
            }
        })
        .collect();
    timings.record(StageKind::Enrich, stage_start.elapsed());

    info!(
        %workspace_id,
        chunks_found = chunks.len(),
        facts_found = facts.len(),
        seed_entity_count = seed_entities.len(),
        "retrieval pipeline finished"
    );

    Ok(RetrievalOutput {
        chunks,
        facts,
        seed_entities,
        stage_timings: timings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::{
        document::{Document, IngestDocument},
        document_chunk::DocumentChunk,
        graph_document::GraphDocument,
        graph_entity::{GraphEntity, GraphEntityType},
        graph_relation::RelationEdge,
        source_connection::SourceType,
    };
    use uuid::Uuid;

    async fn setup() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    /// Ingest a document and plant an embedded chunk for it.
    async fn seed_document(
        db: &SurrealDbClient,
        workspace_id: &str,
        connection_id: &str,
        external_id: &str,
        text: &str,
        embedding: Vec<f32>,
    ) -> String {
        let document_id = Document::ingest(
            IngestDocument {
                workspace_id: workspace_id.to_string(),
                connection_id: connection_id.to_string(),
                source_type: SourceType::Mail,
                external_id: external_id.to_string(),
                url: Some(format!("https://mail.example/{external_id}")),
                title: Some(format!("Message {external_id}")),
                author_name: None,
                author_email: None,
                content_text: text.to_string(),
            },
            db,
        )
        .await
        .expect("ingest")
        .document_id;

        let chunk = DocumentChunk::new(
            workspace_id.to_string(),
            document_id.clone(),
            0,
            text.to_string(),
            0,
            text.len() as i64,
        );
        db.store_item(chunk.clone()).await.expect("chunk row");
        GraphChunk::upsert_embedded(&chunk, embedding, connection_id, db)
            .await
            .expect("graph chunk");

        document_id
    }

    #[tokio::test]
    async fn test_pipeline_returns_scored_enriched_chunks() {
        let db = setup().await;
        let document_id = seed_document(
            &db,
            "ws1",
            "c1",
            "m1",
            "Tokio uses cooperative scheduling.",
            vec![0.9, 0.1, 0.0],
        )
        .await;

        let output = run_pipeline_with_embedding(
            &db,
            vec![1.0, 0.0, 0.0],
            "ws1",
            "how does tokio schedule",
            RetrievalOptions::default(),
            None,
        )
        .await
        .expect("pipeline");

        assert_eq!(output.chunks.len(), 1);
        let chunk = &output.chunks[0];
        assert_eq!(chunk.document_id, document_id);
        assert!(chunk.score > 0.0);
        assert_eq!(chunk.doc_title.as_deref(), Some("Message m1"));
        assert_eq!(chunk.doc_source_type.as_deref(), Some("mail"));
    }

    #[tokio::test]
    async fn test_tenant_isolation_survives_similarity() {
        let db = setup().await;
        seed_document(&db, "ws1", "c1", "m1", "own document", vec![1.0, 0.0, 0.0]).await;
        // Identical vector in another workspace
        seed_document(&db, "ws2", "c9", "m2", "foreign document", vec![1.0, 0.0, 0.0]).await;

        let output = run_pipeline_with_embedding(
            &db,
            vec![1.0, 0.0, 0.0],
            "ws1",
            "anything",
            RetrievalOptions::default(),
            None,
        )
        .await
        .expect("pipeline");

        assert_eq!(output.chunks.len(), 1);
        assert_eq!(output.chunks[0].text, "own document");
    }

    #[tokio::test]
    async fn test_vault_scoping_excludes_unlinked_connections() {
        let db = setup().await;
        seed_document(&db, "ws1", "c1", "m1", "vault one doc", vec![1.0, 0.0, 0.0]).await;
        seed_document(&db, "ws1", "c2", "m2", "vault two doc", vec![1.0, 0.0, 0.0]).await;

        VaultConnection::link("v1", "c1", &db).await.expect("link v1");
        VaultConnection::link("v2", "c2", &db).await.expect("link v2");

        let options = RetrievalOptions {
            vault_ids: Some(vec!["v1".to_string()]),
            ..RetrievalOptions::default()
        };
        let output = run_pipeline_with_embedding(
            &db,
            vec![1.0, 0.0, 0.0],
            "ws1",
            "anything",
            options,
            None,
        )
        .await
        .expect("pipeline");

        assert_eq!(output.chunks.len(), 1);
        assert_eq!(output.chunks[0].text, "vault one doc");
    }

    #[tokio::test]
    async fn test_empty_vault_scope_short_circuits() {
        let db = setup().await;
        seed_document(&db, "ws1", "c1", "m1", "some doc", vec![1.0, 0.0, 0.0]).await;

        let options = RetrievalOptions {
            vault_ids: Some(vec!["vault-without-links".to_string()]),
            ..RetrievalOptions::default()
        };
        let output = run_pipeline_with_embedding(
            &db,
            vec![1.0, 0.0, 0.0],
            "ws1",
            "anything",
            options,
            None,
        )
        .await
        .expect("pipeline");

        assert!(output.chunks.is_empty());
        assert!(output.facts.is_empty());
        assert!(output.seed_entities.is_empty());
    }

    #[tokio::test]
    async fn test_seeds_and_facts_come_from_hit_documents() {
        let db = setup().await;
        let document_id = seed_document(
            &db,
            "ws1",
            "c1",
            "m1",
            "Alice works at Acme.",
            vec![1.0, 0.0, 0.0],
        )
        .await;

        GraphDocument::upsert("ws1", &document_id, "c1", &db)
            .await
            .expect("doc node");
        for (key, name, entity_type) in [
            ("person:email:alice@acme.com", "Alice", GraphEntityType::Person),
            ("company:domain:acme.com", "Acme", GraphEntityType::Company),
        ] {
            GraphEntity::upsert("ws1", key, entity_type, name, None, None, &db)
                .await
                .expect("entity");
            MentionsEdge::store("ws1", &document_id, key, 1.0, &db)
                .await
                .expect("mention");
        }
        RelationEdge::store(
            "ws1",
            "person:email:alice@acme.com",
            "company:domain:acme.com",
            "WORKS_AT",
            &document_id,
            "Alice works at Acme.",
            &db,
        )
        .await
        .expect("relation");

        let output = run_pipeline_with_embedding(
            &db,
            vec![1.0, 0.0, 0.0],
            "ws1",
            "where does alice work",
            RetrievalOptions::default(),
            None,
        )
        .await
        .expect("pipeline");

        assert_eq!(output.seed_entities.len(), 2);
        assert_eq!(output.facts.len(), 1);
        assert_eq!(output.facts[0].relation, "WORKS_AT");
        assert_eq!(output.facts[0].from_name, "Alice");
    }

    #[tokio::test]
    async fn test_top_k_limits_results() {
        let db = setup().await;
        for i in 0..5 {
            seed_document(
                &db,
                "ws1",
                "c1",
                &format!("m{i}"),
                &format!("document number {i}"),
                vec![1.0 - (i as f32) * 0.1, 0.1, 0.0],
            )
            .await;
        }

        let options = RetrievalOptions {
            top_k: 2,
            ..RetrievalOptions::default()
        };
        let output = run_pipeline_with_embedding(
            &db,
            vec![1.0, 0.0, 0.0],
            "ws1",
            "anything",
            options,
            None,
        )
        .await
        .expect("pipeline");

        assert_eq!(output.chunks.len(), 2);
        assert!(output.chunks[0].score >= output.chunks[1].score);
    }
}
