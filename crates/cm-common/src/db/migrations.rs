use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use crate::db::{DbPoolError, PgPool};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to build pool: {0}")]
    PoolBuild(#[from] DbPoolError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    id: 1,
    description: "ranking pipeline tables: match_results, workflow_statuses, notifications",
    sql: r#"
CREATE SCHEMA IF NOT EXISTS cm;

CREATE TABLE IF NOT EXISTS cm.match_results (
    id BIGSERIAL PRIMARY KEY,
    job_description_id BIGINT NOT NULL,
    consultant_id BIGINT NOT NULL,
    similarity_score DOUBLE PRECISION NOT NULL,
    rank INTEGER NOT NULL CHECK (rank >= 1),
    matched_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (job_description_id, rank),
    UNIQUE (job_description_id, consultant_id)
);

CREATE INDEX IF NOT EXISTS idx_match_results_jd_rank
    ON cm.match_results(job_description_id, rank);

CREATE TABLE IF NOT EXISTS cm.workflow_statuses (
    id VARCHAR(26) PRIMARY KEY,
    job_description_id BIGINT NOT NULL,
    progress TEXT NOT NULL DEFAULT 'PENDING'
        CHECK (progress IN ('PENDING', 'PROCESSING', 'COMPLETED')),
    started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    completed_at TIMESTAMPTZ,
    steps JSONB NOT NULL DEFAULT '{}'::jsonb
);

CREATE INDEX IF NOT EXISTS idx_workflow_statuses_jd_started
    ON cm.workflow_statuses(job_description_id, started_at DESC);

CREATE TABLE IF NOT EXISTS cm.notifications (
    id BIGSERIAL PRIMARY KEY,
    job_description_id BIGINT NOT NULL,
    workflow_status_id VARCHAR(26) NOT NULL,
    recipient_email VARCHAR(255) NOT NULL,
    content TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'sent', 'failed')),
    sent_at TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS idx_notifications_jd
    ON cm.notifications(job_description_id);
"#,
}];

/// Apply pending migrations. `cm.job_descriptions` and
/// `cm.consultant_profiles` are owned by the surrounding application and are
/// deliberately not created here.
#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let mut client = pool.get().await?;
    client
        .batch_execute(
            "CREATE SCHEMA IF NOT EXISTS cm;
             CREATE TABLE IF NOT EXISTS cm.schema_migrations (
                id INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );",
        )
        .await?;

    for migration in MIGRATIONS {
        let already_applied: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM cm.schema_migrations WHERE id = $1)",
                &[&migration.id],
            )
            .await?
            .get(0);

        if already_applied {
            continue;
        }

        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO cm.schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(
            id = migration.id,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_ids_are_unique_and_ordered() {
        let mut last = 0;
        for migration in MIGRATIONS {
            assert!(migration.id > last, "ids must increase");
            last = migration.id;
        }
    }
}
