//! Wraps one adapter invocation end-to-end and turns it into a [`RunResult`].

use chrono::{DateTime, Utc};
use lexingest_core::{Command, FetchOutcome, RunResult, RunStatus, Tally};
use tracing::{debug, error, info};

use crate::results::ResultStore;

/// Accumulates per-record outcomes for one (provider, command) run.
#[derive(Debug)]
pub struct RunRecorder {
    provider: String,
    command: Command,
    started_at: DateTime<Utc>,
    tally: Tally,
}

impl RunRecorder {
    pub fn start(provider: impl Into<String>, command: Command) -> Self {
        Self::started_at(provider, command, Utc::now())
    }

    pub fn started_at(provider: impl Into<String>, command: Command, at: DateTime<Utc>) -> Self {
        Self {
            provider: provider.into(),
            command,
            started_at: at,
            tally: Tally::default(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    pub fn record(&mut self, label: &str, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Error(detail) => error!(record = label, %detail, "record failed"),
            other => debug!(record = label, outcome = other.as_str()),
        }
        self.tally.record(outcome);
    }

    /// Close the run with `status`, stamping the finish time now.
    pub fn finish(self, status: RunStatus) -> RunResult {
        self.finish_at(status, Utc::now())
    }

    pub fn finish_at(self, status: RunStatus, finished_at: DateTime<Utc>) -> RunResult {
        RunResult::new(
            self.provider,
            self.command,
            self.started_at,
            finished_at,
            self.tally,
            status,
        )
    }
}

/// Run `body` under a fresh recorder and persist the outcome.
///
/// A body that returns `Ok` completes as `ok` or `partial` depending on the
/// record errors it tallied. A body that returns `Err` is fatal: the run is
/// marked `error` and the failure itself counts as one more error, on top of
/// whatever was recorded before it. The result is written to `store` either
/// way; a failure to persist is logged and does not change the result.
pub fn execute<F>(
    provider: &str,
    command: Command,
    store: Option<&ResultStore>,
    body: F,
) -> RunResult
where
    F: FnOnce(&mut RunRecorder) -> anyhow::Result<()>,
{
    let mut recorder = RunRecorder::start(provider, command);
    let status = match body(&mut recorder) {
        Ok(()) => recorder.tally.completed_status(),
        Err(e) => {
            error!(provider, %command, error = format!("{e:#}"), "fatal error");
            recorder.tally.errors += 1;
            RunStatus::Error
        }
    };
    let result = recorder.finish(status);
    info!(
        provider,
        %command,
        status = result.status.as_str(),
        created = result.created,
        skipped = result.skipped,
        errors = result.errors,
        duration_seconds = result.duration_seconds,
        "run finished"
    );

    if let Some(store) = store {
        match store.write(&result) {
            Ok(path) => debug!(path = %path.display(), "wrote run result"),
            Err(e) => error!(error = %e, "failed to persist run result"),
        }
    }
    result
}
