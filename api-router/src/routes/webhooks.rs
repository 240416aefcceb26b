use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::storage::types::{
    document::{Document, IngestDocument},
    source_connection::{SourceConnection, SourceType},
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{info, warn};

use crate::{api_state::ApiState, error::ApiError, normalizers::normalize_records};

pub const SIGNATURE_HEADER: &str = "X-Signature-HMAC-SHA256";

type HmacSha256 = Hmac<Sha256>;

/// Verify the hex HMAC-SHA256 signature over the raw body. `Mac::verify`
/// compares in constant time, so a mismatch leaks no timing information.
/// With no secret configured, verification is skipped.
pub fn verify_signature(secret: Option<&str>, body: &[u8], signature: Option<&str>) -> bool {
    let Some(secret) = secret else {
        return true;
    };
    let Some(signature) = signature else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(signature.trim()) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature_bytes).is_ok()
}

#[derive(Debug, Deserialize)]
struct AuthEvent {
    workspace_id: String,
    source_type: SourceType,
    external_auth_id: String,
}

#[derive(Debug, Deserialize)]
struct SyncEvent {
    external_auth_id: String,
    #[serde(default)]
    records: Vec<Value>,
    #[serde(default = "default_success")]
    success: bool,
}

fn default_success() -> bool {
    true
}

/// Single webhook endpoint for the external OAuth gateway. `auth` events
/// register a connection, `sync` events carry normalizable records; every
/// other event type is acknowledged and ignored.
pub async fn ingest_webhook(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    if !verify_signature(state.config.webhook_secret.as_deref(), &body, signature) {
        // 401 with no body; nothing for a prober to learn
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|err| ApiError::ValidationError(format!("invalid webhook payload: {err}")))?;
    let event_type = payload.get("type").and_then(Value::as_str).unwrap_or("");

    match event_type {
        "auth" => {
            let event: AuthEvent = serde_json::from_value(payload)
                .map_err(|err| ApiError::ValidationError(format!("invalid auth event: {err}")))?;

            let connection = SourceConnection::register(
                event.workspace_id,
                event.source_type,
                event.external_auth_id,
                &state.db,
            )
            .await?;

            info!(connection_id = %connection.id, "gateway connection registered");
            Ok(Json(json!({ "status": "ok", "connection_id": connection.id })).into_response())
        }
        "sync" => {
            let event: SyncEvent = serde_json::from_value(payload)
                .map_err(|err| ApiError::ValidationError(format!("invalid sync event: {err}")))?;

            if !event.success {
                warn!(external_auth_id = %event.external_auth_id, "gateway reported a failed sync");
                return Ok(Json(json!({ "status": "sync_failed" })).into_response());
            }

            let connection =
                SourceConnection::find_by_external_auth_id(&event.external_auth_id, &state.db)
                    .await?;
            let Some(connection) = connection else {
                warn!(external_auth_id = %event.external_auth_id, "no connection for sync webhook");
                return Ok(Json(json!({ "status": "no_connection" })).into_response());
            };

            let records = normalize_records(connection.source_type, &event.records);

            let mut ingested = 0usize;
            for record in records {
                if record.content_text.trim().is_empty() {
                    continue;
                }
                Document::ingest(
                    IngestDocument {
                        workspace_id: connection.workspace_id.clone(),
                        connection_id: connection.id.clone(),
                        source_type: connection.source_type,
                        external_id: record.external_id,
                        url: record.url,
                        title: record.title,
                        author_name: record.author_name,
                        author_email: record.author_email,
                        content_text: record.content_text,
                    },
                    &state.db,
                )
                .await?;
                ingested += 1;
            }

            info!(
                connection_id = %connection.id,
                ingested,
                "sync webhook processed"
            );
            Ok(Json(json!({ "status": "ok", "ingested": ingested })).into_response())
        }
        other => {
            info!(event_type = %other, "ignoring webhook event");
            Ok(Json(json!({ "status": "ignored" })).into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("mac");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn valid_signature_passes() {
        let body = br#"{"type":"sync"}"#;
        let signature = sign("shared-secret", body);
        assert!(verify_signature(Some("shared-secret"), body, Some(&signature)));
    }

    #[test]
    fn wrong_secret_or_body_fails() {
        let body = br#"{"type":"sync"}"#;
        let signature = sign("shared-secret", body);

        assert!(!verify_signature(Some("other-secret"), body, Some(&signature)));
        assert!(!verify_signature(
            Some("shared-secret"),
            br#"{"type":"tampered"}"#,
            Some(&signature)
        ));
    }

    #[test]
    fn missing_or_malformed_signature_fails() {
        let body = b"payload";
        assert!(!verify_signature(Some("secret"), body, None));
        assert!(!verify_signature(Some("secret"), body, Some("not-hex!")));
    }

    #[test]
    fn no_configured_secret_skips_verification() {
        assert!(verify_signature(None, b"anything", None));
    }
}
