//! Job state bookkeeping.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use cw_core::{ClipRef, ErrorCategory, JobId};
use serde::{Deserialize, Serialize};

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub category: ErrorCategory,
    /// Free-form diagnostic text (engine stderr tail, validation message).
    pub diagnostic: String,
}

/// Lifecycle of a merge job.
///
/// `Pending -> Running -> Succeeded | Failed`. A job can also fail straight
/// from `Pending` when its inputs are rejected before the engine starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed(JobFailure),
}

/// One merge request and everything known about its progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub inputs: Vec<ClipRef>,
    pub output_path: PathBuf,
    pub state: JobState,
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Size of the produced file once the job succeeded.
    pub output_bytes: Option<u64>,
}

impl Job {
    pub fn new(inputs: Vec<ClipRef>, output_path: PathBuf) -> Self {
        Self {
            id: JobId::new(),
            inputs,
            output_path,
            state: JobState::Pending,
            warnings: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            output_bytes: None,
        }
    }

    /// The engine process has been spawned.
    pub fn start(&mut self) {
        self.state = JobState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn succeed(&mut self, bytes: u64) {
        self.state = JobState::Succeeded;
        self.output_bytes = Some(bytes);
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, category: ErrorCategory, diagnostic: impl Into<String>) {
        self.state = JobState::Failed(JobFailure {
            category,
            diagnostic: diagnostic.into(),
        });
        self.finished_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Succeeded | JobState::Failed(_))
    }

    /// The failure category, if the job failed.
    pub fn failure(&self) -> Option<&JobFailure> {
        match &self.state {
            JobState::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(
            ClipRef::sequence(["/c/a.mp4", "/c/b.mp4"]),
            PathBuf::from("/out/m.mp4"),
        )
    }

    #[test]
    fn new_job_is_pending() {
        let job = job();
        assert_eq!(job.state, JobState::Pending);
        assert!(!job.is_terminal());
        assert!(job.started_at.is_none());
        assert_eq!(job.inputs.len(), 2);
    }

    #[test]
    fn success_path() {
        let mut job = job();
        job.start();
        assert_eq!(job.state, JobState::Running);
        assert!(job.started_at.is_some());

        job.succeed(1024);
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.output_bytes, Some(1024));
        assert!(job.is_terminal());
        assert!(job.failure().is_none());
    }

    #[test]
    fn failure_records_category() {
        let mut job = job();
        job.start();
        job.fail(ErrorCategory::Timeout, "engine timed out after 1s");
        let failure = job.failure().unwrap();
        assert_eq!(failure.category, ErrorCategory::Timeout);
        assert!(job.finished_at.is_some());
        assert!(job.output_bytes.is_none());
    }

    #[test]
    fn state_serializes_with_tag() {
        let mut job = job();
        job.fail(ErrorCategory::ClipUnreadable, "clip 1 is unreadable");
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["state"]["state"], "failed");
        assert_eq!(json["state"]["category"], "ClipUnreadable");
    }
}
