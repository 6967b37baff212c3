//! Scrape-run vocabulary shared by the storage layer and the CLI.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a scrape run.
///
/// `Pending → Running → Completed | Failed`. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status \"{other}\"")),
        }
    }
}

/// Who started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Cli,
    Scheduler,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerSource::Cli => "cli",
            TriggerSource::Scheduler => "scheduler",
        }
    }
}

/// What to do when a run discovers zero activities.
///
/// Neither policy ever deactivates or purges existing rows; they differ only
/// in how the run is recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ZeroResultPolicy {
    /// Treat an empty result as a probable scrape failure and fail the run.
    #[default]
    Fail,
    /// Complete the run with zero counts and leave storage untouched.
    Skip,
}

impl std::str::FromStr for ZeroResultPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fail" => Ok(ZeroResultPolicy::Fail),
            "skip" => Ok(ZeroResultPolicy::Skip),
            other => Err(format!(
                "unknown zero-result policy \"{other}\"; expected fail or skip"
            )),
        }
    }
}

/// Counts recorded on a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub found: i32,
    pub created: i32,
    pub updated: i32,
    /// Previously active activities that were not seen this run.
    pub removed: i32,
    /// Inactive activities hard-deleted after the retention window.
    pub purged: i32,
    pub sections_succeeded: i32,
    pub sections_failed: i32,
    /// Dropped rows, field parse failures, and detail-page fallbacks.
    pub warnings: i32,
}
