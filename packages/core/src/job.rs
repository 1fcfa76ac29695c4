//! Job domain types: the definition a job instance is activated with and
//! the persisted run status it carries between activations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Correlation id for a single run of a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Create a new unique run ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a run ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job instance.
///
/// `Completed` and `Failed` are never resting states of `current_status`;
/// they only appear in `last_status` once a run has been archived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No schedule armed yet.
    #[default]
    InActive,
    /// Armed and idle between runs.
    Active,
    /// A run is executing.
    Running,
    Completed,
    Failed,
}

impl RunState {
    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::InActive => "inactive",
            RunState::Active => "active",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted status record of one job instance.
///
/// Durations are whole milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_name: String,
    pub current_status: RunState,
    #[serde(default)]
    pub current_run_id: Option<RunId>,
    #[serde(default)]
    pub current_run_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_run_duration_ms: Option<i64>,
    #[serde(default)]
    pub last_status: Option<RunState>,
    #[serde(default)]
    pub last_run_id: Option<RunId>,
    #[serde(default)]
    pub last_run_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_duration_ms: Option<i64>,
    /// Advisory only; the timer facility is authoritative.
    #[serde(default)]
    pub next_run: Option<DateTime<Utc>>,
}

impl JobStatus {
    /// Create an inactive status record for the given job name.
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            current_status: RunState::InActive,
            current_run_id: None,
            current_run_started_at: None,
            current_run_duration_ms: None,
            last_status: None,
            last_run_id: None,
            last_run_started_at: None,
            last_run_duration_ms: None,
            next_run: None,
        }
    }

    /// Check if a run is currently executing.
    pub fn is_running(&self) -> bool {
        self.current_status == RunState::Running
    }

    /// Recompute the current run duration against `now`.
    pub fn refresh_duration(&mut self, now: DateTime<Utc>) {
        self.current_run_duration_ms = self
            .current_run_started_at
            .map(|started| (now - started).num_milliseconds());
    }

    /// Mark a new run as started and return its id.
    pub fn begin_run(&mut self, now: DateTime<Utc>) -> RunId {
        let run_id = RunId::new();
        self.current_status = RunState::Running;
        self.current_run_id = Some(run_id);
        self.current_run_started_at = Some(now);
        self.current_run_duration_ms = Some(0);
        run_id
    }

    /// Archive the current run into the `last_*` fields and return to `Active`.
    ///
    /// `outcome` must be `Completed` or `Failed`.
    pub fn finish_run(&mut self, outcome: RunState, now: DateTime<Utc>) {
        debug_assert!(matches!(outcome, RunState::Completed | RunState::Failed));

        self.last_status = Some(outcome);
        self.last_run_id = self.current_run_id;
        self.last_run_started_at = self.current_run_started_at;
        self.last_run_duration_ms = self
            .current_run_started_at
            .map(|started| (now - started).num_milliseconds());

        self.current_status = RunState::Active;
        self.current_run_id = None;
        self.current_run_started_at = None;
        self.current_run_duration_ms = None;
    }
}

/// Immutable description of a job instance, set once on activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Identifier used to resolve the job body.
    pub job_type: String,
    /// Job name, also the entity key of the job actor.
    pub job_name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl JobDefinition {
    pub fn new(job_type: impl Into<String>, job_name: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            job_name: job_name.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add a string parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// The single persisted record of a job actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    #[serde(default)]
    pub definition: Option<JobDefinition>,
    pub status: JobStatus,
}

impl JobState {
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            definition: None,
            status: JobStatus::new(job_name),
        }
    }

    /// Store key for the job with the given entity key.
    pub fn store_key(job_key: &str) -> String {
        format!("job:{}", job_key)
    }
}

/// Name of the recurring trigger timer for a job key.
pub fn trigger_timer_name(job_key: &str) -> String {
    format!("{}_trigger", job_key)
}

/// Name of the heartbeat timer that keeps the run duration fresh.
pub fn status_timer_name(job_key: &str) -> String {
    format!("{}_status_reminder", job_key)
}
