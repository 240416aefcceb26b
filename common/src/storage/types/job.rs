use serde_json::Value;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

pub const MAX_ATTEMPTS: u32 = 3;
pub const LAST_ERROR_MAX_CHARS: usize = 4000;
/// A `running` job older than this is presumed orphaned by a dead worker
/// and becomes reclaimable.
pub const DEFAULT_CLAIM_LEASE_SECS: i64 = 300;

/// The five pipeline stages, dispatched by the worker through the handler
/// registry. Serialized in wire form (`PROCESS_DOCUMENT`, ...) so the rows
/// stay greppable in the database.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    ProcessDocument,
    ChunkDocument,
    EmbedChunks,
    ExtractEntitiesRelations,
    UpsertGraph,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::ProcessDocument => "PROCESS_DOCUMENT",
            JobType::ChunkDocument => "CHUNK_DOCUMENT",
            JobType::EmbedChunks => "EMBED_CHUNKS",
            JobType::ExtractEntitiesRelations => "EXTRACT_ENTITIES_RELATIONS",
            JobType::UpsertGraph => "UPSERT_GRAPH",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }
}

stored_object!(Job, "job", {
    workspace_id: String,
    job_type: JobType,
    payload: Value,
    status: JobStatus,
    attempts: u32,
    last_error: Option<String>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    run_after: Option<DateTime<Utc>>
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTypeStatusCount {
    pub job_type: JobType,
    pub status: JobStatus,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatsSummary {
    pub stats: Vec<JobTypeStatusCount>,
    pub total: i64,
    pub queued: i64,
    pub running: i64,
    pub done: i64,
    pub failed: i64,
}

impl Job {
    pub fn new(workspace_id: String, job_type: JobType, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            workspace_id,
            job_type,
            payload,
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
            run_after: None,
        }
    }

    pub async fn enqueue(
        workspace_id: &str,
        job_type: JobType,
        payload: Value,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let job = Self::new(workspace_id.to_owned(), job_type, payload);
        db.store_item(job.clone()).await?;
        Ok(job)
    }

    /// Enqueue a per-document successor unless one of the same type is
    /// already queued or running. This keeps replayed handlers from
    /// fanning out duplicate work.
    pub async fn enqueue_for_document(
        workspace_id: &str,
        job_type: JobType,
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        if Self::has_pending(workspace_id, job_type, document_id, db).await? {
            tracing::debug!(
                %workspace_id,
                job_type = %job_type,
                %document_id,
                "skipping enqueue, job already pending"
            );
            return Ok(None);
        }

        let job = Self::enqueue(
            workspace_id,
            job_type,
            serde_json::json!({ "document_id": document_id }),
            db,
        )
        .await?;
        Ok(Some(job))
    }

    pub async fn has_pending(
        workspace_id: &str,
        job_type: JobType,
        document_id: &str,
        db: &SurrealDbClient,
    ) -> Result<bool, AppError> {
        #[derive(Deserialize)]
        struct CountRow {
            count: i64,
        }

        let mut response = db
            .query(
                "SELECT count() AS count FROM type::table($table) \
                 WHERE workspace_id = $workspace_id \
                   AND job_type = $job_type \
                   AND payload.document_id = $document_id \
                   AND status IN ['queued', 'running'] \
                 GROUP ALL",
            )
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.to_owned()))
            .bind(("job_type", job_type))
            .bind(("document_id", document_id.to_owned()))
            .await?;
        let rows: Vec<CountRow> = response.take(0)?;
        Ok(rows.first().map_or(0, |r| r.count) > 0)
    }

    /// Claim one ready job: the oldest queued row whose backoff window has
    /// passed, or a `running` row whose claim lease expired (its worker is
    /// presumed dead), attempts below the cap either way.
    ///
    /// The flip to `running` is guarded on the `updated_at` the candidate
    /// was observed with, so when two workers race for the same row exactly
    /// one UPDATE matches; the loser sees an empty result and polls again.
    pub async fn claim_next_ready(
        max_attempts: u32,
        claim_lease: chrono::Duration,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        #[derive(Deserialize)]
        struct Candidate {
            #[serde(deserialize_with = "deserialize_flexible_id")]
            id: String,
            #[serde(deserialize_with = "deserialize_datetime")]
            updated_at: DateTime<Utc>,
        }

        let stale_before = Utc::now() - claim_lease;

        let mut response = db
            .query(
                "SELECT id, updated_at, created_at FROM type::table($table) \
                 WHERE attempts < $max_attempts \
                   AND ( \
                     (status = 'queued' AND (run_after = NONE OR run_after <= time::now())) \
                     OR (status = 'running' AND updated_at <= $stale_before) \
                   ) \
                 ORDER BY created_at ASC \
                 LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("max_attempts", max_attempts))
            .bind(("stale_before", surrealdb::sql::Datetime::from(stale_before)))
            .await?;
        let candidates: Vec<Candidate> = response.take(0)?;
        let Some(candidate) = candidates.into_iter().next() else {
            return Ok(None);
        };

        let mut claimed = db
            .query(
                "UPDATE type::thing($table, $id) \
                 SET status = 'running', attempts += 1, updated_at = time::now() \
                 WHERE updated_at = $observed_updated_at \
                 RETURN AFTER",
            )
            .bind(("table", Self::table_name()))
            .bind(("id", candidate.id))
            .bind((
                "observed_updated_at",
                surrealdb::sql::Datetime::from(candidate.updated_at),
            ))
            .await?;
        let rows: Vec<Self> = claimed.take(0)?;
        Ok(rows.into_iter().next())
    }

    pub async fn complete(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing($table, $id) \
             SET status = 'done', run_after = NONE, updated_at = time::now()",
        )
        .bind(("table", Self::table_name()))
        .bind(("id", id.to_owned()))
        .await?
        .check()?;
        Ok(())
    }

    /// Record a failed execution. Below the attempt cap the job goes back to
    /// `queued` with a linear backoff window; at the cap it is terminally
    /// `failed`.
    pub async fn fail(
        id: &str,
        error: &str,
        attempts: u32,
        max_attempts: u32,
        backoff_base: chrono::Duration,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let truncated: String = error.chars().take(LAST_ERROR_MAX_CHARS).collect();

        if attempts < max_attempts {
            let run_after = Utc::now() + backoff_base * i32::try_from(attempts).unwrap_or(i32::MAX);
            db.query(
                "UPDATE type::thing($table, $id) \
                 SET status = 'queued', last_error = $last_error, run_after = $run_after, updated_at = time::now()",
            )
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_owned()))
            .bind(("last_error", truncated))
            .bind(("run_after", surrealdb::sql::Datetime::from(run_after)))
            .await?
            .check()?;
        } else {
            db.query(
                "UPDATE type::thing($table, $id) \
                 SET status = 'failed', last_error = $last_error, run_after = NONE, updated_at = time::now()",
            )
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_owned()))
            .bind(("last_error", truncated))
            .await?
            .check()?;
        }

        Ok(())
    }

    pub async fn stats(
        workspace_id: &str,
        db: &SurrealDbClient,
    ) -> Result<JobStatsSummary, AppError> {
        let mut response = db
            .query(
                "SELECT job_type, status, count() AS count FROM type::table($table) \
                 WHERE workspace_id = $workspace_id \
                 GROUP BY job_type, status",
            )
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.to_owned()))
            .await?;
        let stats: Vec<JobTypeStatusCount> = response.take(0)?;

        let mut summary = JobStatsSummary {
            total: 0,
            queued: 0,
            running: 0,
            done: 0,
            failed: 0,
            stats,
        };
        for row in &summary.stats {
            summary.total += row.count;
            match row.status {
                JobStatus::Queued => summary.queued += row.count,
                JobStatus::Running => summary.running += row.count,
                JobStatus::Done => summary.done += row.count,
                JobStatus::Failed => summary.failed += row.count,
            }
        }
        Ok(summary)
    }

    pub async fn recent_failures(
        workspace_id: &str,
        limit: usize,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * FROM type::table($table) \
                 WHERE workspace_id = $workspace_id AND status = 'failed' \
                 ORDER BY updated_at DESC \
                 LIMIT $limit",
            )
            .bind(("table", Self::table_name()))
            .bind(("workspace_id", workspace_id.to_owned()))
            .bind(("limit", i64::try_from(limit).unwrap_or(i64::MAX)))
            .await?;
        Ok(response.take(0)?)
    }
}
