use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::instrument;

use crate::db::match_results::INSERT_MATCH_RESULT_SQL;
use crate::db::notifications::INSERT_NOTIFICATION_SQL;
use crate::db::workflow_statuses::upsert_workflow_in;
use crate::db::PgPool;
use crate::notify::NotificationStatus;
use crate::workflow::WorkflowStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to map row: {0}")]
    Mapping(String),
}

/// Insert payload for one match result row.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResultInsert {
    pub job_description_id: i64,
    pub consultant_id: i64,
    pub similarity_score: f64,
    pub rank: i32,
    pub matched_at: DateTime<Utc>,
}

/// Insert payload for the end-of-run notification row.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationInsert {
    pub job_description_id: i64,
    pub workflow_status_id: String,
    pub recipient_email: String,
    pub content: String,
}

/// Everything one ranking run persists at its end, written atomically.
#[derive(Debug, Clone)]
pub struct RunOutcomeRecord {
    /// Final workflow state (COMPLETED, with completed_at and final steps).
    pub workflow: WorkflowStatus,
    /// The new ranked set; replaces any prior set for the job description.
    pub matches: Vec<MatchResultInsert>,
    pub notification: NotificationInsert,
}

/// Storage collaborator of the ranking pipeline. Passed explicitly into
/// `run_ranking` and every persistence step — never held as ambient state.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Insert or update the workflow row for a run (PENDING, PROCESSING).
    async fn upsert_workflow(&self, workflow: &WorkflowStatus) -> Result<(), StoreError>;

    /// Atomically replace the match result set, complete the workflow, and
    /// insert the notification row. Returns the notification id. Readers
    /// never observe a mix of the old and new ranked sets.
    async fn persist_run(&self, record: &RunOutcomeRecord) -> Result<i64, StoreError>;

    /// Record the delivery outcome on the notification row.
    async fn mark_notification(
        &self,
        notification_id: i64,
        status: NotificationStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgMatchStore {
    pool: PgPool,
}

impl PgMatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchStore for PgMatchStore {
    #[instrument(skip(self, workflow), fields(workflow_id = %workflow.id))]
    async fn upsert_workflow(&self, workflow: &WorkflowStatus) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        upsert_workflow_in(&**client, workflow).await?;
        Ok(())
    }

    #[instrument(
        skip(self, record),
        fields(
            job_description_id = record.workflow.job_description_id,
            matches = record.matches.len()
        )
    )]
    async fn persist_run(&self, record: &RunOutcomeRecord) -> Result<i64, StoreError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        tx.execute(
            "DELETE FROM cm.match_results WHERE job_description_id = $1",
            &[&record.workflow.job_description_id],
        )
        .await?;

        let insert = tx.prepare(INSERT_MATCH_RESULT_SQL).await?;
        for row in &record.matches {
            tx.execute(
                &insert,
                &[
                    &row.job_description_id,
                    &row.consultant_id,
                    &row.similarity_score,
                    &row.rank,
                    &row.matched_at,
                ],
            )
            .await?;
        }

        upsert_workflow_in(&*tx, &record.workflow).await?;

        let inserted = tx
            .query_one(
                INSERT_NOTIFICATION_SQL,
                &[
                    &record.notification.job_description_id,
                    &record.notification.workflow_status_id,
                    &record.notification.recipient_email,
                    &record.notification.content,
                    &NotificationStatus::Pending.as_str(),
                ],
            )
            .await?;

        tx.commit().await?;

        Ok(inserted.get(0))
    }

    #[instrument(skip(self))]
    async fn mark_notification(
        &self,
        notification_id: i64,
        status: NotificationStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        crate::db::notifications::mark_notification(&self.pool, notification_id, status, sent_at)
            .await?;
        Ok(())
    }
}
