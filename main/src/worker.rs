use std::sync::Arc;

use common::{
    storage::{db::SurrealDbClient, indexes::ensure_runtime_indexes},
    utils::config::get_config,
};
use ingestion_pipeline::{
    handlers::HandlerRegistry, run_worker_loop, services::DefaultPipelineServices,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
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

    let services = Arc::new(DefaultPipelineServices::new(openai_client, &config));
    let registry = Arc::new(HandlerRegistry::with_default_handlers(
        Arc::clone(&db),
        services,
        config.clone(),
    ));

    run_worker_loop(db, registry, config).await?;

    Ok(())
}
