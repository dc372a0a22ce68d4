use chrono::{DateTime, Duration, Utc};
use tokio_postgres::types::Json;
use tokio_postgres::{Error as PgError, GenericClient};
use tracing::instrument;

use crate::db::{PgPool, StoreError};
use crate::workflow::WorkflowStatus;

pub(crate) const UPSERT_WORKFLOW_SQL: &str = "INSERT INTO cm.workflow_statuses (
    id,
    job_description_id,
    progress,
    started_at,
    completed_at,
    steps
) VALUES (
    $1, $2, $3, $4, $5, $6
)
ON CONFLICT (id) DO UPDATE SET
    progress = EXCLUDED.progress,
    completed_at = EXCLUDED.completed_at,
    steps = EXCLUDED.steps;";

/// Shared by the pool-level upsert and the end-of-run transaction.
pub(crate) async fn upsert_workflow_in(
    client: &impl GenericClient,
    workflow: &WorkflowStatus,
) -> Result<u64, PgError> {
    let stmt = client.prepare(UPSERT_WORKFLOW_SQL).await?;

    client
        .execute(
            &stmt,
            &[
                &workflow.id,
                &workflow.job_description_id,
                &workflow.progress.as_str(),
                &workflow.started_at,
                &workflow.completed_at,
                &Json(&workflow.steps),
            ],
        )
        .await
}

/// Insert or update a workflow row keyed by its run id.
#[instrument(skip(pool, workflow), fields(workflow_id = %workflow.id))]
pub async fn upsert_workflow_status(
    pool: &PgPool,
    workflow: &WorkflowStatus,
) -> Result<u64, StoreError> {
    let client = pool.get().await?;
    Ok(upsert_workflow_in(&**client, workflow).await?)
}

/// Reset long-running PROCESSING workflows back to PENDING so the worker
/// picks the job description up again. There is no failed state; this sweep
/// is the recovery path for runs that died between PROCESSING and COMPLETED.
#[instrument(skip(pool))]
pub async fn recover_stuck_workflows(
    pool: &PgPool,
    now: DateTime<Utc>,
    max_processing: Duration,
) -> Result<u64, StoreError> {
    let client = pool.get().await?;
    let cutoff = now - max_processing;

    let rows = client
        .execute(
            "UPDATE cm.workflow_statuses
             SET progress = 'PENDING'
             WHERE progress = 'PROCESSING' AND started_at < $1",
            &[&cutoff],
        )
        .await?;

    Ok(rows)
}
