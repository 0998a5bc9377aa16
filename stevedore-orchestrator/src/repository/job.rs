//! Job repository
//!
//! The store contract consumed by the job manager: fetch by id, all,
//! by owner, active; insert; full-row update; and the bulk stop used at
//! startup recovery. Inputs, parameters, and history persist as JSON
//! text columns.

use sqlx::SqlitePool;
use stevedore_core::domain::job::{ExecutionProfile, Job, JobStatus};

const ACTIVE_FILTER: &str = "status NOT IN ('STOPPED', 'FINISHED', 'FAILED')";

/// Inserts a newly submitted job.
pub async fn insert(pool: &SqlitePool, job: &Job) -> Result<(), sqlx::Error> {
    let profile = job.profile.clone().unwrap_or_default();

    sqlx::query(
        r#"
        INSERT INTO jobs (id, owner, token, app_id, name, status, inputs, parameters,
                          batch_queue, max_run_time, node_count, processors_per_node,
                          memory_per_node, start_time, end_time, history)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&job.id)
    .bind(&job.owner)
    .bind(&job.token)
    .bind(&job.app_id)
    .bind(&job.name)
    .bind(job.status.as_str())
    .bind(serde_json::to_string(&job.inputs).unwrap_or_else(|_| "{}".to_string()))
    .bind(serde_json::to_string(&job.parameters).unwrap_or_else(|_| "{}".to_string()))
    .bind(&profile.batch_queue)
    .bind(&profile.max_run_time)
    .bind(profile.node_count.map(|n| n as i64))
    .bind(profile.processors_per_node.map(|n| n as i64))
    .bind(&profile.memory_per_node)
    .bind(job.start_time)
    .bind(job.end_time)
    .bind(serde_json::to_string(&job.history).unwrap_or_else(|_| "[]".to_string()))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Into::into))
}

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs ORDER BY start_time DESC")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn find_by_owner(pool: &SqlitePool, owner: &str) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(
        "SELECT * FROM jobs WHERE owner = ? ORDER BY start_time DESC",
    )
    .bind(owner)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Jobs not yet in a terminal state, oldest first.
pub async fn find_active(pool: &SqlitePool) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT * FROM jobs WHERE {} ORDER BY start_time ASC",
        ACTIVE_FILTER
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Persists a transition: status, the execution profile actually used,
/// the history log, and the end timestamp.
pub async fn update(pool: &SqlitePool, job: &Job) -> Result<(), sqlx::Error> {
    let profile = job.profile.clone().unwrap_or_default();

    sqlx::query(
        r#"
        UPDATE jobs
        SET status = ?, batch_queue = ?, max_run_time = ?, node_count = ?,
            processors_per_node = ?, memory_per_node = ?, history = ?, end_time = ?
        WHERE id = ?
        "#,
    )
    .bind(job.status.as_str())
    .bind(&profile.batch_queue)
    .bind(&profile.max_run_time)
    .bind(profile.node_count.map(|n| n as i64))
    .bind(profile.processors_per_node.map(|n| n as i64))
    .bind(&profile.memory_per_node)
    .bind(serde_json::to_string(&job.history).unwrap_or_else(|_| "[]".to_string()))
    .bind(job.end_time)
    .bind(&job.id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Marks every active job STOPPED, clearing its credential token and
/// stamping an end time where none is set. Used only at startup recovery.
pub async fn stop_active(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(&format!(
        "UPDATE jobs SET status = 'STOPPED', token = '', end_time = COALESCE(end_time, ?) WHERE {}",
        ACTIVE_FILTER
    ))
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    owner: String,
    token: String,
    app_id: String,
    name: String,
    status: String,
    inputs: String,
    parameters: String,
    batch_queue: Option<String>,
    max_run_time: Option<String>,
    node_count: Option<i64>,
    processors_per_node: Option<i64>,
    memory_per_node: Option<String>,
    start_time: chrono::DateTime<chrono::Utc>,
    end_time: Option<chrono::DateTime<chrono::Utc>>,
    history: String,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        let profile = ExecutionProfile {
            batch_queue: row.batch_queue,
            max_run_time: row.max_run_time,
            node_count: row.node_count.map(|n| n as u32),
            processors_per_node: row.processors_per_node.map(|n| n as u32),
            memory_per_node: row.memory_per_node,
        };

        Job {
            id: row.id,
            owner: row.owner,
            token: row.token,
            app_id: row.app_id,
            name: row.name,
            // An unrecognized stored status must never re-enter the
            // scheduler's dispatch path.
            status: JobStatus::parse(&row.status).unwrap_or(JobStatus::Stopped),
            inputs: serde_json::from_str(&row.inputs).unwrap_or_default(),
            parameters: serde_json::from_str(&row.parameters).unwrap_or_default(),
            profile: if profile.is_empty() { None } else { Some(profile) },
            start_time: row.start_time,
            end_time: row.end_time,
            history: serde_json::from_str(&row.history).unwrap_or_default(),
        }
    }
}
