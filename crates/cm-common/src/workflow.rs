use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::run_id;

pub const STEP_JD_PARSED: &str = "jd_parsed";
pub const STEP_PROFILES_COMPARED: &str = "profiles_compared";
pub const STEP_PROFILES_RANKED: &str = "profiles_ranked";
pub const STEP_RESULTS_PERSISTED: &str = "results_persisted";

/// Progress of one ranking run. There is no failed state: a run that dies
/// mid-pipeline stays queryable at its last persisted progress and is picked
/// up again by the recovery sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WorkflowProgress {
    Pending,
    Processing,
    Completed,
}

impl WorkflowProgress {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowProgress::Pending => "PENDING",
            WorkflowProgress::Processing => "PROCESSING",
            WorkflowProgress::Completed => "COMPLETED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(WorkflowProgress::Pending),
            "PROCESSING" => Some(WorkflowProgress::Processing),
            "COMPLETED" => Some(WorkflowProgress::Completed),
            _ => None,
        }
    }
}

/// Step-completion flags recorded alongside the progress, e.g.
/// `{"jd_parsed": true, "profiles_compared": false}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowSteps(BTreeMap<String, bool>);

impl WorkflowSteps {
    pub fn set(&mut self, step: &str, done: bool) {
        self.0.insert(step.to_string(), done);
    }

    pub fn mark(&mut self, step: &str) {
        self.set(step, true);
    }

    pub fn is_done(&self, step: &str) -> bool {
        self.0.get(step).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowStatus {
    /// ULID; doubles as the run id of the execution that owns this row.
    pub id: String,
    pub job_description_id: i64,
    pub progress: WorkflowProgress,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: WorkflowSteps,
}

impl WorkflowStatus {
    pub fn new(job_description_id: i64) -> Self {
        Self {
            id: run_id::generate(),
            job_description_id,
            progress: WorkflowProgress::Pending,
            started_at: Utc::now(),
            completed_at: None,
            steps: WorkflowSteps::default(),
        }
    }

    /// Move the workflow forward. Transitions are monotonic: a regression or
    /// a repeat is a no-op returning `false`. `completed_at` is stamped
    /// exactly once, on the transition into `Completed`.
    pub fn advance(&mut self, next: WorkflowProgress) -> bool {
        if next <= self.progress {
            return false;
        }

        self.progress = next;
        if next == WorkflowProgress::Completed && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        true
    }
}
