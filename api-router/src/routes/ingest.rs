use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::storage::types::{
    document::{Document, IngestDocument, IngestOutcome},
    workspace::Workspace,
};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

/// Dedup ingest entry point. Returns the document id together with whether
/// the call created, updated or left the document unchanged.
pub async fn ingest_document(
    State(state): State<ApiState>,
    Json(body): Json<IngestDocument>,
) -> Result<impl IntoResponse, ApiError> {
    if body.content_text.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "content_text must not be empty".to_string(),
        ));
    }

    let workspace: Option<Workspace> = state
        .db
        .get_item(&body.workspace_id)
        .await
        .map_err(common::error::AppError::from)?;
    if workspace.is_none() {
        return Err(ApiError::NotFound(format!(
            "Workspace {} not found",
            body.workspace_id
        )));
    }

    let outcome: IngestOutcome = Document::ingest(body, &state.db).await?;
    info!(
        document_id = %outcome.document_id,
        status = ?outcome.status,
        "document ingested"
    );

    Ok((StatusCode::OK, Json(outcome)))
}
