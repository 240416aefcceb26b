use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::storage::types::workspace::Workspace;
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct WorkspaceCreate {
    pub name: String,
}

pub async fn create_workspace(
    State(state): State<ApiState>,
    Json(body): Json<WorkspaceCreate>,
) -> Result<impl IntoResponse, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "workspace name must not be empty".to_string(),
        ));
    }

    let workspace = Workspace::create_with_default_vault(body.name, &state.db).await?;
    Ok((StatusCode::CREATED, Json(workspace)))
}

pub async fn list_workspaces(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let workspaces = Workspace::list(&state.db).await?;
    Ok((StatusCode::OK, Json(workspaces)))
}
