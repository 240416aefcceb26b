use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::storage::types::source_connection::{SourceConnection, SourceType};
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct RegisterConnectionBody {
    pub workspace_id: String,
    pub source_type: SourceType,
    pub external_auth_id: String,
}

#[derive(Debug, Deserialize)]
pub struct WorkspaceQuery {
    pub workspace_id: String,
}

pub async fn register_connection(
    State(state): State<ApiState>,
    Json(body): Json<RegisterConnectionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let connection = SourceConnection::register(
        body.workspace_id,
        body.source_type,
        body.external_auth_id,
        &state.db,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(connection)))
}

pub async fn list_connections(
    State(state): State<ApiState>,
    Query(params): Query<WorkspaceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let connections =
        SourceConnection::list_for_workspace(&params.workspace_id, &state.db).await?;
    Ok((StatusCode::OK, Json(connections)))
}
