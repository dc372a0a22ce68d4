use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::db::{PgPool, StoreError};
use crate::notify::NotificationStatus;

pub(crate) const INSERT_NOTIFICATION_SQL: &str = "INSERT INTO cm.notifications (
    job_description_id,
    workflow_status_id,
    recipient_email,
    content,
    status
) VALUES ($1, $2, $3, $4, $5)
RETURNING id;";

/// Record the delivery outcome on an already-persisted notification row.
/// The row itself is authoritative; this update is best-effort bookkeeping.
#[instrument(skip(pool))]
pub async fn mark_notification(
    pool: &PgPool,
    notification_id: i64,
    status: NotificationStatus,
    sent_at: Option<DateTime<Utc>>,
) -> Result<u64, StoreError> {
    let client = pool.get().await?;

    let rows = client
        .execute(
            "UPDATE cm.notifications SET status = $2, sent_at = $3 WHERE id = $1",
            &[&notification_id, &status.as_str(), &sent_at],
        )
        .await?;

    Ok(rows)
}
