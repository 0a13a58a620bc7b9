//! PostgreSQL job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use landit_core::store::JobStore;
use landit_core::{Error, Job, JobId, JobPatch, JobStatus, Result, Stage};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::DbError;

/// A job row in the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRecord {
    pub id: uuid::Uuid,
    pub trace_id: String,
    pub owner: String,
    pub repo: String,
    pub task: String,
    pub template: String,
    pub private: bool,
    pub create_repo: bool,
    pub stage: String,
    pub status: String,
    pub model: serde_json::Value,
    pub pr_url: Option<String>,
    pub ci_status: Option<String>,
    pub error: Option<String>,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<JobRecord> for Job {
    type Error = DbError;

    fn try_from(record: JobRecord) -> std::result::Result<Self, DbError> {
        let status: JobStatus = record
            .status
            .parse()
            .map_err(|_| DbError::Corrupt(format!("job {}: status {}", record.id, record.status)))?;
        let stage: Stage = record
            .stage
            .parse()
            .map_err(|_| DbError::Corrupt(format!("job {}: stage {}", record.id, record.stage)))?;
        let result: BTreeMap<String, serde_json::Value> = match record.result {
            serde_json::Value::Null => BTreeMap::new(),
            value => serde_json::from_value(value)
                .map_err(|e| DbError::Corrupt(format!("job {}: result: {e}", record.id)))?,
        };

        Ok(Job {
            id: JobId::from_uuid(record.id),
            trace_id: record.trace_id,
            owner: record.owner,
            repo: record.repo,
            task: record.task,
            template: record.template,
            private: record.private,
            create_repo: record.create_repo,
            stage,
            status,
            model: record.model,
            pr_url: record.pr_url,
            ci_status: record.ci_status,
            error: record.error,
            created_at: record.created_at,
            updated_at: record.updated_at,
            result,
        })
    }
}

fn db(err: sqlx::Error) -> Error {
    DbError::from(err).into()
}

fn to_job(record: JobRecord) -> Result<Job> {
    Job::try_from(record).map_err(Error::from)
}

/// PostgreSQL implementation of [`JobStore`].
///
/// Claims use `FOR UPDATE SKIP LOCKED`, so any number of workers can share
/// one database.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, job: Job) -> Result<Job> {
        let result = serde_json::to_value(&job.result)?;
        let record = sqlx::query_as::<_, JobRecord>(
            r#"
            INSERT INTO jobs (id, trace_id, owner, repo, task, template, private, create_repo,
                              stage, status, model, pr_url, ci_status, error, result,
                              created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(&job.trace_id)
        .bind(&job.owner)
        .bind(&job.repo)
        .bind(&job.task)
        .bind(&job.template)
        .bind(job.private)
        .bind(job.create_repo)
        .bind(job.stage.as_str())
        .bind(job.status.as_str())
        .bind(&job.model)
        .bind(&job.pr_url)
        .bind(&job.ci_status)
        .bind(&job.error)
        .bind(result)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref dbe) if dbe.is_unique_violation() => {
                Error::from(DbError::Duplicate(format!("job {}", job.id)))
            }
            other => db(other),
        })?;
        info!(job_id = %job.id, repo = %job.full_name(), "Job created");
        to_job(record)
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let record = sqlx::query_as::<_, JobRecord>(
            r#"
            UPDATE jobs
            SET stage = 'preflight',
                status = CASE WHEN status = 'queued' THEN 'running' ELSE status END,
                updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond')
            WHERE id = (
                SELECT id FROM jobs
                WHERE stage = 'queued' AND status IN ('queued', 'cancel_requested')
                ORDER BY created_at, id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        match record {
            Some(record) => {
                let job = to_job(record)?;
                debug!(job_id = %job.id, status = %job.status, "Job claimed");
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, id: JobId, patch: JobPatch) -> Result<Job> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let current = sqlx::query_as::<_, JobRecord>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db)?
            .ok_or_else(|| Error::NotFound(format!("job {id}")))?;
        let mut job = to_job(current)?;
        job.apply(&patch)?;

        let result = serde_json::to_value(&job.result)?;
        let record = sqlx::query_as::<_, JobRecord>(
            r#"
            UPDATE jobs
            SET status = $2, stage = $3, model = $4, pr_url = $5, ci_status = $6,
                error = $7, result = $8,
                updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond')
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(job.status.as_str())
        .bind(job.stage.as_str())
        .bind(&job.model)
        .bind(&job.pr_url)
        .bind(&job.ci_status)
        .bind(&job.error)
        .bind(result)
        .fetch_one(&mut *tx)
        .await
        .map_err(db)?;

        tx.commit().await.map_err(db)?;
        to_job(record)
    }

    async fn get(&self, id: JobId) -> Result<Job> {
        let record = sqlx::query_as::<_, JobRecord>("SELECT * FROM jobs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?
            .ok_or_else(|| Error::NotFound(format!("job {id}")))?;
        to_job(record)
    }

    async fn request_cancel(&self, id: JobId) -> Result<Job> {
        let record = sqlx::query_as::<_, JobRecord>(
            r#"
            UPDATE jobs
            SET status = 'cancel_requested',
                updated_at = GREATEST(NOW(), updated_at + INTERVAL '1 microsecond')
            WHERE id = $1 AND status IN ('queued', 'running')
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        match record {
            Some(record) => {
                info!(job_id = %id, "Cancellation requested");
                to_job(record)
            }
            // Already cancel_requested, terminal, or missing.
            None => self.get(id).await,
        }
    }

    async fn list(&self, limit: usize) -> Result<Vec<Job>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = sqlx::query_as::<_, JobRecord>(
            "SELECT * FROM jobs ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;
        records.into_iter().map(to_job).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_for(job: &Job) -> JobRecord {
        JobRecord {
            id: *job.id.as_uuid(),
            trace_id: job.trace_id.clone(),
            owner: job.owner.clone(),
            repo: job.repo.clone(),
            task: job.task.clone(),
            template: job.template.clone(),
            private: job.private,
            create_repo: job.create_repo,
            stage: "pr_ci_gate".to_string(),
            status: "running".to_string(),
            model: json!({"model": "coder"}),
            pr_url: Some("https://github.com/acme/widgets/pull/1".to_string()),
            ci_status: None,
            error: None,
            result: json!({"implement_loop": {"changed": true}}),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }

    #[test]
    fn test_record_converts_to_job() {
        let job = Job::new("acme", "widgets", "add health endpoint", "python-fastapi");
        let converted = Job::try_from(record_for(&job)).unwrap();

        assert_eq!(converted.id, job.id);
        assert_eq!(converted.stage, Stage::PrCiGate);
        assert_eq!(converted.status, JobStatus::Running);
        assert_eq!(converted.result["implement_loop"], json!({"changed": true}));
    }

    #[test]
    fn test_null_result_is_empty_map() {
        let job = Job::new("acme", "widgets", "task", "python-fastapi");
        let mut record = record_for(&job);
        record.result = serde_json::Value::Null;
        assert!(Job::try_from(record).unwrap().result.is_empty());
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let job = Job::new("acme", "widgets", "task", "python-fastapi");
        let mut record = record_for(&job);
        record.status = "paused".to_string();
        assert!(matches!(Job::try_from(record), Err(DbError::Corrupt(_))));
    }
}
