use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use pilot_core::{AgentId, RunId, DEFAULT_SCHEDULE_SECONDS};

/// Run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, no trigger yet
    Pending,
    /// Requested by an external trigger, waiting for the executor
    Queued,
    Running,
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }

    /// Position along pending/queued → running → success/error
    pub fn rank(&self) -> u8 {
        match self {
            RunStatus::Pending | RunStatus::Queued => 0,
            RunStatus::Running => 1,
            RunStatus::Success | RunStatus::Error => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    /// Whether a record in `self` may be rewritten with status `next`.
    ///
    /// Status only moves forward; a running record cannot be started again.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        !self.is_terminal() && (self.rank() < next.rank() || (next.rank() == 0 && self.rank() == 0))
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "error" => Ok(RunStatus::Error),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// Stored definition of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: AgentId,
    pub name: String,
    pub kind: String,
    /// Passed verbatim to the agent behavior
    pub config: serde_json::Value,
    pub schedule_seconds: u64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default = "default_schedule_seconds")]
    pub schedule_seconds: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_schedule_seconds() -> u64 {
    DEFAULT_SCHEDULE_SECONDS
}

fn default_enabled() -> bool {
    true
}

impl NewAgent {
    /// Enabled agent with the default schedule
    pub fn new(name: impl Into<String>, kind: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            config,
            schedule_seconds: DEFAULT_SCHEDULE_SECONDS,
            enabled: true,
        }
    }

    pub fn with_schedule(mut self, seconds: u64) -> Self {
        self.schedule_seconds = seconds;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Partial agent update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub config: Option<serde_json::Value>,
    pub schedule_seconds: Option<u64>,
    pub enabled: Option<bool>,
}

/// One execution attempt of an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub agent_id: AgentId,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Serialized result on success, `"<kind>: <message>"` on error
    pub logs: String,
}

/// Payload for creating a run record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRun {
    pub agent_id: AgentId,
    pub status: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
}

impl NewRun {
    /// Run requested by an external trigger, picked up later by the executor
    pub fn queued(agent_id: AgentId) -> Self {
        Self {
            agent_id,
            status: RunStatus::Queued,
            started_at: None,
        }
    }

    /// Run the executor is starting right now
    pub fn running(agent_id: AgentId, started_at: DateTime<Utc>) -> Self {
        Self {
            agent_id,
            status: RunStatus::Running,
            started_at: Some(started_at),
        }
    }
}

/// Partial run update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub logs: Option<String>,
}

impl RunUpdate {
    pub fn start(started_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(RunStatus::Running),
            started_at: Some(started_at),
            ..Default::default()
        }
    }

    pub fn finish(status: RunStatus, finished_at: DateTime<Utc>, logs: String) -> Self {
        Self {
            status: Some(status),
            finished_at: Some(finished_at),
            logs: Some(logs),
            ..Default::default()
        }
    }
}

/// Run counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub total: u64,
    pub pending: u64,
    pub queued: u64,
    pub running: u64,
    pub success: u64,
    pub error: u64,
}
