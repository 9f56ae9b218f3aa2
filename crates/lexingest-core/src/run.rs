//! Per-record outcomes and the persisted summary of one ingestion run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of delivering (or refusing to deliver) one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Created,
    /// The destination already holds this record.
    SkippedDuplicate,
    /// The record failed normalization and never reached a sink.
    SkippedInvalid,
    Error(String),
}

impl FetchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::SkippedDuplicate => "skipped-duplicate",
            Self::SkippedInvalid => "skipped-invalid",
            Self::Error(_) => "error",
        }
    }
}

/// Which ingestion command a run executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Command {
    Laws,
    Cases,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Laws => "laws",
            Self::Cases => "cases",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate health of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Completed without record errors.
    Ok,
    /// Completed, but some records failed.
    Partial,
    /// Terminated by an unrecovered failure.
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Partial => "partial",
            Self::Error => "error",
        }
    }

    /// Process exit code: ok → 0, partial → 1, error → 2.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Partial => 1,
            Self::Error => 2,
        }
    }
}

/// Running counts of per-record outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub created: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl Tally {
    pub fn record(&mut self, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Created => self.created += 1,
            FetchOutcome::SkippedDuplicate | FetchOutcome::SkippedInvalid => self.skipped += 1,
            FetchOutcome::Error(_) => self.errors += 1,
        }
    }

    /// Status of a run that completed with these counts.
    pub fn completed_status(&self) -> RunStatus {
        if self.errors == 0 {
            RunStatus::Ok
        } else {
            RunStatus::Partial
        }
    }
}

/// Persisted summary of one (provider, command) run.
///
/// Written once at the end of a run; later runs replace the file with a new
/// result rather than updating this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub provider: String,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub status: RunStatus,
    pub created: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl RunResult {
    pub fn new(
        provider: impl Into<String>,
        command: Command,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        tally: Tally,
        status: RunStatus,
    ) -> Self {
        Self {
            provider: provider.into(),
            command: command.as_str().to_string(),
            started_at,
            finished_at,
            duration_seconds: (finished_at - started_at).num_seconds(),
            status,
            created: tally.created,
            skipped: tally.skipped,
            errors: tally.errors,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.status.exit_code()
    }
}
