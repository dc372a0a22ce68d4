//! Builds the comparison strings handed to the embedding provider and the
//! semantic judge. Field positions stay fixed and missing optionals become
//! empty strings, so structurally similar records produce comparable text.

use crate::{ConsultantProfile, JobDescription};

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn years(value: Option<i32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Single comparison string for a job description: title, department,
/// location, experience, description, then skills joined by commas.
pub fn job_description_text(jd: &JobDescription) -> String {
    format!(
        "{} {} {} {} {} {}",
        jd.title,
        opt(&jd.department),
        opt(&jd.location),
        opt(&jd.experience),
        opt(&jd.description),
        jd.skills.join(", "),
    )
}

/// Single comparison string for a consultant profile.
pub fn profile_text(profile: &ConsultantProfile) -> String {
    format!(
        "{} {} {} {} {} {}",
        profile.name,
        profile.skills.join(", "),
        years(profile.experience),
        opt(&profile.location),
        opt(&profile.past_projects),
        profile.availability.as_str(),
    )
}

/// Condensed view sent to the semantic judge. Only name, skills, experience
/// and location go into the prompt to keep it bounded.
pub fn judge_snippet(profile: &ConsultantProfile) -> String {
    format!(
        "{}, Skills: {}, Experience: {} years, Location: {}",
        profile.name,
        profile.skills.join(", "),
        years(profile.experience),
        opt(&profile.location),
    )
}
