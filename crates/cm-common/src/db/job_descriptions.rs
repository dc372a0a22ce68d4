use tracing::instrument;

use crate::db::util::parse_string_array;
use crate::db::{PgPool, StoreError};
use crate::JobDescription;

/// Load one job description. The table is owned by the surrounding
/// application; only the fields the pipeline consumes are selected.
#[instrument(skip(pool))]
pub async fn fetch_job_description(
    pool: &PgPool,
    job_description_id: i64,
) -> Result<Option<JobDescription>, StoreError> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT id, title, department, location, experience, description, skills,
                    requestor_email
             FROM cm.job_descriptions
             WHERE id = $1",
            &[&job_description_id],
        )
        .await?;

    Ok(row.map(|row| JobDescription {
        id: row.get("id"),
        title: row.get("title"),
        department: row.get("department"),
        location: row.get("location"),
        experience: row.get("experience"),
        description: row.get("description"),
        skills: parse_string_array(row.get("skills")),
        requestor_email: row.get("requestor_email"),
    }))
}

/// Job descriptions whose latest workflow row is missing or PENDING — the
/// ones the worker should rank next. Rows reset by the recovery sweep show
/// up here again.
#[instrument(skip(pool))]
pub async fn fetch_job_ids_awaiting_run(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<i64>, StoreError> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT jd.id
             FROM cm.job_descriptions jd
             LEFT JOIN LATERAL (
                 SELECT ws.progress
                 FROM cm.workflow_statuses ws
                 WHERE ws.job_description_id = jd.id
                 ORDER BY ws.started_at DESC
                 LIMIT 1
             ) latest ON TRUE
             WHERE latest.progress IS NULL OR latest.progress = 'PENDING'
             ORDER BY jd.id
             LIMIT $1",
            &[&limit],
        )
        .await?;

    Ok(rows.iter().map(|row| row.get("id")).collect())
}
