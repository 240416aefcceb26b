pub mod connections;
pub mod ingest;
pub mod jobs;
pub mod liveness;
pub mod query;
pub mod readiness;
pub mod vaults;
pub mod webhooks;
pub mod workspaces;
