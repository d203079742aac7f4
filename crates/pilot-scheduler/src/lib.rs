//! Agentpilot Scheduler - Periodic Agent Execution
//!
//! Keeps one interval timer per enabled agent. Each firing hands the agent
//! id to an `AgentJobRunner` (the executor in production) on its own task,
//! so slow or failing runs never hold up the timers.

pub mod runner;
pub mod scheduler;

pub use pilot_core::config::OverlapPolicy;
pub use runner::AgentJobRunner;
pub use scheduler::{AgentScheduler, ReconcileReport, SchedulerState};
