use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use retrieval_pipeline::{answer::Citation, run_pipeline, RetrievalOptions};
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub workspace_id: String,
    pub prompt: String,
    #[serde(default)]
    pub vault_ids: Option<Vec<String>>,
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QueryDebug {
    pub chunks_found: usize,
    pub facts_found: usize,
    pub seed_entities: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub debug: QueryDebug,
}

/// GraphRAG query: retrieval pipeline plus citation-constrained answer.
pub async fn query(
    State(state): State<ApiState>,
    Json(body): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.prompt.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "prompt must not be empty".to_string(),
        ));
    }

    let options = RetrievalOptions::from_request(
        &state.config,
        body.vault_ids.clone(),
        body.depth,
        body.top_k,
    );

    let reranker = match &state.reranker_pool {
        Some(pool) => Some(pool.checkout().await),
        None => None,
    };

    let retrieval = run_pipeline(
        &state.db,
        &state.embedding_client,
        &body.workspace_id,
        &body.prompt,
        options,
        reranker,
    )
    .await?;

    let composed = state.answer_client.compose(&body.prompt, &retrieval).await?;

    let response = QueryResponse {
        answer: composed.answer,
        citations: composed.citations,
        debug: QueryDebug {
            chunks_found: retrieval.chunks.len(),
            facts_found: retrieval.facts.len(),
            seed_entities: retrieval
                .seed_entities
                .iter()
                .map(|seed| seed.name.clone())
                .collect(),
        },
    };

    Ok((StatusCode::OK, Json(response)))
}
