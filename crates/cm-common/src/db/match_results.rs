use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::instrument;

use crate::db::{PgPool, StoreError};

pub(crate) const INSERT_MATCH_RESULT_SQL: &str = "INSERT INTO cm.match_results (
    job_description_id,
    consultant_id,
    similarity_score,
    rank,
    matched_at
) VALUES ($1, $2, $3, $4, $5);";

/// One row of the persisted ranking for a job description.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResultRow {
    pub id: i64,
    pub job_description_id: i64,
    pub consultant_id: i64,
    pub similarity_score: f64,
    pub rank: i32,
    pub matched_at: DateTime<Utc>,
}

fn row_to_match(row: &Row) -> MatchResultRow {
    MatchResultRow {
        id: row.get("id"),
        job_description_id: row.get("job_description_id"),
        consultant_id: row.get("consultant_id"),
        similarity_score: row.get("similarity_score"),
        rank: row.get("rank"),
        matched_at: row.get("matched_at"),
    }
}

/// Fetch the full persisted ranking for a job description, rank ascending.
#[instrument(skip(pool))]
pub async fn fetch_match_results(
    pool: &PgPool,
    job_description_id: i64,
) -> Result<Vec<MatchResultRow>, StoreError> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT id, job_description_id, consultant_id, similarity_score, rank, matched_at
             FROM cm.match_results
             WHERE job_description_id = $1
             ORDER BY rank ASC",
            &[&job_description_id],
        )
        .await?;

    Ok(rows.iter().map(row_to_match).collect())
}

/// Fetch the best `limit` rows of the persisted ranking.
#[instrument(skip(pool))]
pub async fn fetch_top_matches(
    pool: &PgPool,
    job_description_id: i64,
    limit: i64,
) -> Result<Vec<MatchResultRow>, StoreError> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT id, job_description_id, consultant_id, similarity_score, rank, matched_at
             FROM cm.match_results
             WHERE job_description_id = $1
             ORDER BY rank ASC
             LIMIT $2",
            &[&job_description_id, &limit],
        )
        .await?;

    Ok(rows.iter().map(row_to_match).collect())
}
