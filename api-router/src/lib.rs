use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{delete, get, patch, post},
    Router,
};
use routes::{
    connections::{list_connections, register_connection},
    ingest::ingest_document,
    jobs::{failed_jobs, job_stats},
    liveness::live,
    query::query,
    readiness::ready,
    vaults::{
        create_vault, delete_vault, link_connection, list_vault_connections, list_vaults,
        unlink_connection, update_vault,
    },
    webhooks::ingest_webhook,
    workspaces::{create_workspace, list_workspaces},
};

pub mod api_state;
pub mod error;
pub mod normalizers;
mod routes;

/// Router for API functionality, version 1
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new()
        // Probes for k8s/systemd
        .route("/ready", get(ready))
        .route("/live", get(live))
        // Core ingest + query
        .route(
            "/ingest/document",
            post(ingest_document).layer(DefaultBodyLimit::max(
                app_state.config.ingest_max_body_bytes,
            )),
        )
        .route("/query", post(query))
        // Tenant CRUD
        .route("/workspaces", post(create_workspace).get(list_workspaces))
        .route("/vaults", post(create_vault).get(list_vaults))
        .route("/vaults/{vault_id}", patch(update_vault).delete(delete_vault))
        .route(
            "/vaults/{vault_id}/connections",
            post(link_connection).get(list_vault_connections),
        )
        .route(
            "/vaults/{vault_id}/connections/{connection_id}",
            delete(unlink_connection),
        )
        .route(
            "/connections",
            post(register_connection).get(list_connections),
        )
        // Job observability
        .route("/jobs/stats", get(job_stats))
        .route("/jobs/failed", get(failed_jobs))
        // External gateway callback
        .route("/webhooks/ingest", post(ingest_webhook))
}
