pub mod consultant_profiles;
pub mod job_descriptions;
pub mod match_results;
pub mod migrations;
pub mod notifications;
pub mod pool;
pub mod store;
pub mod util;
pub mod workflow_statuses;

// Keep re-exports unique so downstream crates see a single symbol per helper.
pub use consultant_profiles::fetch_eligible_profiles;
pub use job_descriptions::{fetch_job_description, fetch_job_ids_awaiting_run};
pub use match_results::{fetch_match_results, fetch_top_matches, MatchResultRow};
pub use migrations::{run_migrations, MigrationError};
pub use notifications::mark_notification;
pub use pool::{create_pool_from_url, create_pool_from_url_checked, DbPoolError, PgPool};
pub use store::{
    MatchResultInsert, MatchStore, NotificationInsert, PgMatchStore, RunOutcomeRecord, StoreError,
};
pub use workflow_statuses::{recover_stuck_workflows, upsert_workflow_status};
