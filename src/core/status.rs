//! core::status
//!
//! Per-run status report.
//!
//! The report accumulates one flag per reconciliation outcome plus
//! human-readable messages. It is logged at the end of a run and rendered
//! into the PR body.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::config::Config;

/// Outcome of one reconciliation run.
///
/// Field order is the rendering order: scalars, then messages, then the
/// resolved configuration table.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusReport {
    /// When the run started
    pub last_update_start_time_utc: DateTime<Utc>,
    /// A recoverable step failed (e.g. the rebase was aborted)
    pub error: bool,
    /// The integration branch was created during this run
    pub created_branch: bool,
    /// Upstream had commits the integration branch lacked
    pub has_upstream_updates: bool,
    /// The integration branch carries commits that are not from upstream
    pub has_foreign_commits: bool,
    /// Some step changed the integration branch
    pub changed: bool,
    /// The integration branch was pushed
    pub pushed: bool,
    /// A pull request was created during this run
    pub created_pr: bool,
    /// The pull request body was refreshed
    pub updated_pr_successfully: bool,
    /// Publication was skipped because the branch is not ahead of the target
    pub no_new_commits_on_base_branch: bool,
    /// A non-fatal PR metadata operation failed
    pub uncritical_errors: bool,
    /// Human-readable notes, in the order they were recorded
    pub messages: Vec<String>,
    /// Effective configuration, without secrets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_config: Option<Config>,
}

impl StatusReport {
    /// Start a report for a run beginning at `started`.
    pub fn new(started: DateTime<Utc>) -> Self {
        Self {
            last_update_start_time_utc: started,
            error: false,
            created_branch: false,
            has_upstream_updates: false,
            has_foreign_commits: false,
            changed: false,
            pushed: false,
            created_pr: false,
            updated_pr_successfully: false,
            no_new_commits_on_base_branch: false,
            uncritical_errors: false,
            messages: Vec::new(),
            resolved_config: None,
        }
    }

    /// Record a message.
    pub fn add_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Merge a sub-task outcome into this report.
    pub fn absorb(&mut self, outcome: StepOutcome) {
        self.uncritical_errors |= outcome.failed;
        self.messages.extend(outcome.messages);
    }

    /// Render as TOML text for logs and the PR body.
    ///
    /// Falls back to `Debug` output if serialization fails.
    pub fn render(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_else(|_| format!("{:#?}", self))
    }

    /// Render as pretty JSON for machine consumers.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Messages and failure flag produced by one independent sub-task.
///
/// Sub-tasks run concurrently and cannot share the report, so each returns
/// one of these to be [`absorb`](StatusReport::absorb)ed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Whether the sub-task hit a non-fatal error
    pub failed: bool,
    /// Messages to surface
    pub messages: Vec<String>,
}

impl StepOutcome {
    /// Record a warning without marking failure.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    /// Record a failure.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.failed = true;
        self.messages.push(message.into());
    }
}
