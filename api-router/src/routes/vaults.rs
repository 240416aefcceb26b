use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::storage::types::{vault::Vault, vault_connection::VaultConnection};
use serde::Deserialize;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct VaultCreate {
    pub workspace_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VaultUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WorkspaceQuery {
    pub workspace_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LinkConnectionBody {
    pub connection_id: String,
}

pub async fn create_vault(
    State(state): State<ApiState>,
    Json(body): Json<VaultCreate>,
) -> Result<impl IntoResponse, ApiError> {
    if body.name.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "vault name must not be empty".to_string(),
        ));
    }

    let vault = Vault::create(body.workspace_id, body.name, body.description, &state.db).await?;
    Ok((StatusCode::CREATED, Json(vault)))
}

pub async fn list_vaults(
    State(state): State<ApiState>,
    Query(params): Query<WorkspaceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let vaults = Vault::list_for_workspace(&params.workspace_id, &state.db).await?;
    Ok((StatusCode::OK, Json(vaults)))
}

pub async fn update_vault(
    State(state): State<ApiState>,
    Path(vault_id): Path<String>,
    Json(body): Json<VaultUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let vault = Vault::patch(&vault_id, body.name, body.description, &state.db).await?;
    Ok((StatusCode::OK, Json(vault)))
}

/// Refused for the default vault and for vaults whose connections still own
/// documents.
pub async fn delete_vault(
    State(state): State<ApiState>,
    Path(vault_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Vault::delete(&vault_id, &state.db).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn link_connection(
    State(state): State<ApiState>,
    Path(vault_id): Path<String>,
    Json(body): Json<LinkConnectionBody>,
) -> Result<impl IntoResponse, ApiError> {
    let link = VaultConnection::link(&vault_id, &body.connection_id, &state.db).await?;
    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn list_vault_connections(
    State(state): State<ApiState>,
    Path(vault_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let links = VaultConnection::list_for_vault(&vault_id, &state.db).await?;
    Ok((StatusCode::OK, Json(links)))
}

pub async fn unlink_connection(
    State(state): State<ApiState>,
    Path((vault_id, connection_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    VaultConnection::unlink(&vault_id, &connection_id, &state.db).await?;
    Ok(StatusCode::NO_CONTENT)
}
