//! Source health derived from persisted run results.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use lexingest_core::{Command, RunResult, RunStatus};
use serde::Serialize;

/// Default age after which a source's last run counts as stale.
pub const DEFAULT_STALE_HOURS: u32 = 72;

/// Health of one (command, provider) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceHealth {
    pub command: String,
    pub provider: String,
    /// `None` when the pair never reported.
    pub last_run: Option<RunResult>,
    pub stale: bool,
    /// Part of the expected set; only these decide the aggregate health.
    pub monitored: bool,
}

impl SourceHealth {
    pub fn is_healthy(&self) -> bool {
        match &self.last_run {
            Some(run) => !self.stale && run.status != RunStatus::Error,
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub stale_hours: u32,
    pub sources: Vec<SourceHealth>,
}

impl StatusReport {
    /// Rows for the expected sources.
    pub fn monitored(&self) -> impl Iterator<Item = &SourceHealth> {
        self.sources.iter().filter(|s| s.monitored)
    }

    pub fn healthy(&self) -> bool {
        self.monitored().all(SourceHealth::is_healthy)
    }

    /// 0 when every expected source is present, fresh and not in error;
    /// else 1. Other reporting sources are listed but never fail the check.
    pub fn exit_code(&self) -> u8 {
        if self.healthy() { 0 } else { 1 }
    }
}

/// Computes staleness against a fixed set of expected sources.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    stale_hours: u32,
    expected: BTreeSet<(String, String)>,
}

impl StatusReporter {
    pub fn new<'a>(expected: impl IntoIterator<Item = (Command, &'a str)>) -> Self {
        Self {
            stale_hours: DEFAULT_STALE_HOURS,
            expected: expected
                .into_iter()
                .map(|(command, provider)| (command.as_str().to_string(), provider.to_string()))
                .collect(),
        }
    }

    pub fn with_stale_hours(mut self, hours: u32) -> Self {
        self.stale_hours = hours;
        self
    }

    pub fn threshold(&self) -> Duration {
        Duration::hours(i64::from(self.stale_hours))
    }

    pub fn is_stale(&self, finished_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(finished_at) > self.threshold()
    }

    /// One row per expected pair plus any other pair that reported, sorted
    /// by (command, provider). The latest result wins when a pair has several.
    pub fn report(&self, results: &[RunResult], now: DateTime<Utc>) -> StatusReport {
        let mut latest: BTreeMap<(String, String), &RunResult> = BTreeMap::new();
        for result in results {
            let key = (result.command.clone(), result.provider.clone());
            latest
                .entry(key)
                .and_modify(|current| {
                    if result.finished_at > current.finished_at {
                        *current = result;
                    }
                })
                .or_insert(result);
        }

        let keys: BTreeSet<(String, String)> = self
            .expected
            .iter()
            .cloned()
            .chain(latest.keys().cloned())
            .collect();
        let sources = keys
            .into_iter()
            .map(|key| {
                let last_run = latest.get(&key).map(|r| (*r).clone());
                let stale = last_run
                    .as_ref()
                    .is_none_or(|r| self.is_stale(r.finished_at, now));
                let monitored = self.expected.contains(&key);
                SourceHealth {
                    command: key.0,
                    provider: key.1,
                    last_run,
                    stale,
                    monitored,
                }
            })
            .collect();

        StatusReport {
            stale_hours: self.stale_hours,
            sources,
        }
    }
}

/// `"4m 05s"`, or `"42s"` under a minute.
pub fn format_duration(seconds: i64) -> String {
    let (minutes, secs) = (seconds / 60, seconds % 60);
    if minutes > 0 {
        format!("{minutes}m {secs:02}s")
    } else {
        format!("{secs}s")
    }
}
