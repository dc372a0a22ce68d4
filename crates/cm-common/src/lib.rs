pub mod db;
pub mod embedding;
pub mod judge;
pub mod logging;
pub mod matching;
pub mod normalize;
pub mod notify;
pub mod run_id;
pub mod workflow;

// Commonly used data models for the ranking pipeline. Both records are loaded
// and validated by the surrounding application; the pipeline never mutates them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobDescription {
    pub id: i64,
    pub title: String,
    pub department: Option<String>,
    pub location: Option<String>,
    pub experience: Option<String>,
    pub description: Option<String>,
    pub skills: Vec<String>,
    pub requestor_email: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Availability {
    #[default]
    Available,
    Busy,
    Unavailable,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Available => "available",
            Availability::Busy => "busy",
            Availability::Unavailable => "unavailable",
        }
    }

    /// Parse a stored availability value. Unknown values map to `Available`
    /// so a consultant is never silently dropped by a bad row.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "busy" => Availability::Busy,
            "unavailable" => Availability::Unavailable,
            _ => Availability::Available,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsultantProfile {
    pub id: i64,
    pub name: String,
    pub skills: Vec<String>,
    pub experience: Option<i32>,
    pub location: Option<String>,
    pub past_projects: Option<String>,
    pub availability: Availability,
}

impl ConsultantProfile {
    /// Only consultants who are not marked unavailable enter a ranking run.
    pub fn is_eligible(&self) -> bool {
        self.availability != Availability::Unavailable
    }
}
