use tracing::instrument;

use crate::db::util::parse_string_array;
use crate::db::{PgPool, StoreError};
use crate::{Availability, ConsultantProfile};

/// Load every profile eligible for ranking. Unavailable consultants are
/// filtered in SQL so they never reach the pipeline at all.
#[instrument(skip(pool))]
pub async fn fetch_eligible_profiles(pool: &PgPool) -> Result<Vec<ConsultantProfile>, StoreError> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT id, name, skills, experience, location, past_projects, availability
             FROM cm.consultant_profiles
             WHERE availability <> 'unavailable'
             ORDER BY id",
            &[],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| ConsultantProfile {
            id: row.get("id"),
            name: row.get("name"),
            skills: parse_string_array(row.get("skills")),
            experience: row.get("experience"),
            location: row.get("location"),
            past_projects: row.get("past_projects"),
            availability: Availability::parse(row.get::<_, &str>("availability")),
        })
        .collect())
}
