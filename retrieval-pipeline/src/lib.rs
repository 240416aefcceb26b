#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod answer;
pub mod graph;
pub mod pipeline;
pub mod reranking;

use serde::Serialize;

pub use common::storage::types::graph_relation::SeedEntity;
pub use pipeline::{
    run_pipeline, run_pipeline_with_embedding, PipelineStageTimings, RetrievalOptions, StageKind,
};

/// One retrieved chunk with its score and document provenance.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub score: f32,
    pub doc_title: Option<String>,
    pub doc_url: Option<String>,
    pub doc_source_type: Option<String>,
}

/// A directed, typed relation between two entity keys with provenance.
#[derive(Debug, Clone, Serialize)]
pub struct GraphFact {
    pub from_key: String,
    pub from_name: String,
    pub relation: String,
    pub to_key: String,
    pub to_name: String,
    pub document_id: String,
    pub evidence: Option<String>,
}

/// Everything the answer composer needs: scored chunks, graph facts and the
/// seed entities the traversal started from.
#[derive(Debug, Default)]
pub struct RetrievalOutput {
    pub chunks: Vec<RetrievedChunk>,
    pub facts: Vec<GraphFact>,
    pub seed_entities: Vec<SeedEntity>,
    pub stage_timings: PipelineStageTimings,
}
