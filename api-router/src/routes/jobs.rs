use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::storage::types::job::Job;
use serde::{Deserialize, Serialize};

use crate::{api_state::ApiState, error::ApiError};

const DEFAULT_FAILED_LIMIT: usize = 20;
const MAX_FAILED_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub workspace_id: String,
}

#[derive(Debug, Deserialize)]
pub struct FailedQuery {
    pub workspace_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct FailedJob {
    pub id: String,
    pub job_type: String,
    pub last_error: Option<String>,
    pub attempts: u32,
}

/// Aggregated counts by (type, status) plus totals per status.
pub async fn job_stats(
    State(state): State<ApiState>,
    Query(params): Query<StatsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = Job::stats(&params.workspace_id, &state.db).await?;
    Ok((StatusCode::OK, Json(summary)))
}

pub async fn failed_jobs(
    State(state): State<ApiState>,
    Query(params): Query<FailedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_FAILED_LIMIT)
        .min(MAX_FAILED_LIMIT);

    let failures = Job::recent_failures(&params.workspace_id, limit, &state.db).await?;
    let failures: Vec<FailedJob> = failures
        .into_iter()
        .map(|job| FailedJob {
            id: job.id,
            job_type: job.job_type.to_string(),
            last_error: job.last_error,
            attempts: job.attempts,
        })
        .collect();

    Ok((StatusCode::OK, Json(failures)))
}
