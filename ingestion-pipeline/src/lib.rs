#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod chunker;
pub mod extraction;
pub mod handlers;
pub mod resolver;
pub mod services;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use common::{
    error::AppError,
    storage::{db::SurrealDbClient, types::job::Job},
    utils::config::AppConfig,
};
use handlers::HandlerRegistry;
use tokio::time::{sleep, Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Claim and run at most one ready job. Returns whether a job was
/// processed. Success marks the job done; failure records the error and
/// either requeues with backoff or, at the attempt cap (and always for an
/// unknown job type), fails terminally.
pub async fn claim_and_process_one(
    db: &SurrealDbClient,
    registry: &HandlerRegistry,
    config: &AppConfig,
    worker_id: &str,
) -> Result<bool, AppError> {
    let claim_lease = chrono::Duration::seconds(config.claim_lease_secs);
    let Some(job) = Job::claim_next_ready(config.max_attempts, claim_lease, db).await? else {
        return Ok(false);
    };

    info!(
        %worker_id,
        job_id = %job.id,
        job_type = %job.job_type,
        attempt = job.attempts,
        "claimed job"
    );

    let started = Instant::now();
    let backoff_base = chrono::Duration::seconds(config.backoff_base_secs);

    let (outcome, effective_attempts) = match registry.get(job.job_type) {
        Some(handler) => (handler.handle(&job).await, job.attempts),
        None => (
            // Programmer error: fail terminally instead of burning retries
            Err(AppError::Processing(format!(
                "no handler registered for job type {}",
                job.job_type
            ))),
            config.max_attempts,
        ),
    };

    match outcome {
        Ok(()) => {
            Job::complete(&job.id, db).await?;
            info!(
                %worker_id,
                job_id = %job.id,
                job_type = %job.job_type,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "job done"
            );
        }
        Err(err) => {
            error!(
                %worker_id,
                job_id = %job.id,
                job_type = %job.job_type,
                attempt = job.attempts,
                error = %err,
                "job failed"
            );
            Job::fail(
                &job.id,
                &err.to_string(),
                effective_attempts,
                config.max_attempts,
                backoff_base,
                db,
            )
            .await?;
        }
    }

    Ok(true)
}

/// Long-running worker loop: claim, dispatch, repeat. Polls when the queue
/// is idle and drains the in-flight handler before honoring shutdown.
pub async fn run_worker_loop(
    db: Arc<SurrealDbClient>,
    registry: Arc<HandlerRegistry>,
    config: AppConfig,
) -> Result<(), AppError> {
    let worker_id = format!("pipeline-worker-{}", Uuid::new_v4());
    let poll_interval = Duration::from_secs(config.poll_interval_secs);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    info!(%worker_id, poll_interval_secs = config.poll_interval_secs, "worker started");

    loop {
        if shutdown.load(Ordering::SeqCst) {
            info!(%worker_id, "worker stopping");
            return Ok(());
        }

        match claim_and_process_one(&db, &registry, &config, &worker_id).await {
            Ok(true) => {}
            Ok(false) => sleep(poll_interval).await,
            Err(err) => {
                error!(%worker_id, error = %err, "failed to claim job");
                warn!("backing off for 1s after claim error");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
