use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::{
    storage::{db::SurrealDbClient, indexes::ensure_runtime_indexes},
    utils::config::get_config,
};
use ingestion_pipeline::{
    handlers::HandlerRegistry, run_worker_loop, services::DefaultPipelineServices,
};
use retrieval_pipeline::reranking::RerankerPool;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Combined process: API server plus a pipeline worker on one runtime.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    db.verify_connectivity().await?;
    ensure_runtime_indexes(&db, config.embed_dim as usize).await?;

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let reranker_pool = RerankerPool::maybe_from_config(&config)?;

    let api_state = ApiState::new(
        Arc::clone(&db),
        config.clone(),
        Arc::clone(&openai_client),
        reranker_pool,
    )?;

    let app = Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .with_state(api_state);

    // Worker shares the runtime with the server
    let services = Arc::new(DefaultPipelineServices::new(openai_client, &config));
    let registry = Arc::new(HandlerRegistry::with_default_handlers(
        Arc::clone(&db),
        services,
        config.clone(),
    ));
    let worker_db = Arc::clone(&db);
    let worker_config = config.clone();
    let worker = tokio::spawn(async move {
        info!("Starting worker process");
        if let Err(e) = run_worker_loop(worker_db, registry, worker_config).await {
            error!("Worker process error: {}", e);
        }
    });

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    worker.await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use common::utils::config::AppConfig;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use tower::ServiceExt;
    use uuid::Uuid;

    /// Collect a response body into JSON.
    async fn to_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("collect body");
        if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("body should be JSON")
        }
    }

    async fn build_test_app(webhook_secret: Option<&str>) -> (Router, Arc<SurrealDbClient>) {
        let namespace = "test_ns";
        let database = format!("test_db_{}", Uuid::new_v4());
        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("failed to start in-memory surrealdb"),
        );

        let config = AppConfig {
            webhook_secret: webhook_secret.map(str::to_string),
            ..AppConfig::default()
        };

        let openai_client = Arc::new(async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        ));

        let api_state = ApiState::new(Arc::clone(&db), config, openai_client, None)
            .expect("failed to build api state");

        let app = Router::new()
            .nest("/api/v1", api_routes_v1(&api_state))
            .with_state(api_state);

        (app, db)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.expect("response")
    }

    #[tokio::test]
    async fn smoke_probes_respond() {
        let (app, _db) = build_test_app(None).await;

        let response = send(&app, get("/api/v1/live")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, get("/api/v1/ready")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn workspace_creation_adds_default_vault() {
        let (app, _db) = build_test_app(None).await;

        let response = send(&app, post_json("/api/v1/workspaces", serde_json::json!({"name": "Acme"}))).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let workspace = to_json(response).await;
        let workspace_id = workspace["id"].as_str().expect("workspace id").to_string();

        let response = send(
            &app,
            get(&format!("/api/v1/vaults?workspace_id={workspace_id}")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let vaults = to_json(response).await;
        assert_eq!(vaults.as_array().map(Vec::len), Some(1));
        assert_eq!(vaults[0]["is_default"], true);
    }

    #[tokio::test]
    async fn ingest_endpoint_dedups_documents() {
        let (app, _db) = build_test_app(None).await;

        let response = send(&app, post_json("/api/v1/workspaces", serde_json::json!({"name": "ws"}))).await;
        let workspace_id = to_json(response).await["id"].as_str().expect("id").to_string();

        let body = serde_json::json!({
            "workspace_id": workspace_id,
            "connection_id": "c1",
            "source_type": "mail",
            "external_id": "m1",
            "content_text": "Alice works at Acme."
        });

        let response = send(&app, post_json("/api/v1/ingest/document", body.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let first = to_json(response).await;
        assert_eq!(first["status"], "created");

        let response = send(&app, post_json("/api/v1/ingest/document", body)).await;
        let second = to_json(response).await;
        assert_eq!(second["status"], "unchanged");
        assert_eq!(second["document_id"], first["document_id"]);
    }

    #[tokio::test]
    async fn ingest_rejects_unknown_workspace() {
        let (app, _db) = build_test_app(None).await;

        let body = serde_json::json!({
            "workspace_id": "missing-workspace",
            "connection_id": "c1",
            "source_type": "mail",
            "external_id": "m1",
            "content_text": "text"
        });
        let response = send(&app, post_json("/api/v1/ingest/document", body)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error = to_json(response).await;
        assert!(error["detail"].as_str().unwrap_or("").contains("Workspace"));
    }

    #[tokio::test]
    async fn default_vault_delete_is_refused() {
        let (app, _db) = build_test_app(None).await;

        let response = send(&app, post_json("/api/v1/workspaces", serde_json::json!({"name": "ws"}))).await;
        let workspace_id = to_json(response).await["id"].as_str().expect("id").to_string();

        let response = send(
            &app,
            get(&format!("/api/v1/vaults?workspace_id={workspace_id}")),
        )
        .await;
        let vaults = to_json(response).await;
        let default_vault_id = vaults[0]["id"].as_str().expect("vault id").to_string();

        let response = send(
            &app,
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/vaults/{default_vault_id}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_rejects_bad_signature() {
        let (app, _db) = build_test_app(Some("shared-secret")).await;

        let response = send(
            &app,
            Request::builder()
                .method("POST")
                .uri("/api/v1/webhooks/ingest")
                .header(header::CONTENT_TYPE, "application/json")
                .header("X-Signature-HMAC-SHA256", "deadbeef")
                .body(Body::from(r#"{"type":"sync"}"#))
                .expect("request"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert!(body.is_empty(), "401 must carry no body");
    }

    #[tokio::test]
    async fn webhook_sync_ingests_records() {
        let secret = "shared-secret";
        let (app, db) = build_test_app(Some(secret)).await;

        // Register a connection the sync event can resolve
        let response = send(
            &app,
            post_json(
                "/api/v1/connections",
                serde_json::json!({
                    "workspace_id": "ws1",
                    "source_type": "mail",
                    "external_auth_id": "ext-1"
                }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let payload = serde_json::json!({
            "type": "sync",
            "external_auth_id": "ext-1",
            "records": [
                {
                    "id": "m1",
                    "sender": "Alice <alice@acme.com>",
                    "subject": "hello",
                    "body": "Alice works at Acme.",
                    "threadId": "t1"
                },
                { "id": "m2", "sender": "", "body": "" }
            ]
        });
        let raw = payload.to_string();
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("mac");
        mac.update(raw.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let response = send(
            &app,
            Request::builder()
                .method("POST")
                .uri("/api/v1/webhooks/ingest")
                .header(header::CONTENT_TYPE, "application/json")
                .header("X-Signature-HMAC-SHA256", signature)
                .body(Body::from(raw))
                .expect("request"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_json(response).await;
        assert_eq!(body["status"], "ok");
        // The empty-body record was skipped
        assert_eq!(body["ingested"], 1);

        let documents: Vec<common::storage::types::document::Document> = db
            .query("SELECT * FROM document WHERE workspace_id = 'ws1'")
            .await
            .expect("query")
            .take(0)
            .expect("take");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].external_id, "m1");
        assert_eq!(documents[0].author_email.as_deref(), Some("alice@acme.com"));
    }

    #[tokio::test]
    async fn webhook_ignores_unknown_event_types() {
        let (app, _db) = build_test_app(None).await;

        let response = send(
            &app,
            post_json(
                "/api/v1/webhooks/ingest",
                serde_json::json!({"type": "billing.updated"}),
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_json(response).await;
        assert_eq!(body["status"], "ignored");
    }

    #[tokio::test]
    async fn job_stats_reports_queue_counts() {
        let (app, _db) = build_test_app(None).await;

        let response = send(&app, post_json("/api/v1/workspaces", serde_json::json!({"name": "ws"}))).await;
        let workspace_id = to_json(response).await["id"].as_str().expect("id").to_string();

        let body = serde_json::json!({
            "workspace_id": workspace_id,
            "connection_id": "c1",
            "source_type": "mail",
            "external_id": "m1",
            "content_text": "Some document."
        });
        send(&app, post_json("/api/v1/ingest/document", body)).await;

        let response = send(
            &app,
            get(&format!("/api/v1/jobs/stats?workspace_id={workspace_id}")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let stats = to_json(response).await;
        assert_eq!(stats["total"], 1);
        assert_eq!(stats["queued"], 1);

        // Nothing has failed yet
        let response = send(
            &app,
            get(&format!("/api/v1/jobs/failed?workspace_id={workspace_id}")),
        )
        .await;
        let failures = to_json(response).await;
        assert_eq!(failures.as_array().map(Vec::len), Some(0));
    }
}
