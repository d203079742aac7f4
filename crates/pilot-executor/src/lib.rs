//! Agentpilot Executor - Run Lifecycle
//!
//! Turns one agent execution into a persisted run record:
//! - creates or claims the run before any work starts
//! - dispatches the agent behavior, catching panics
//! - writes the final status, logs and `finished_at` in a single update
//!
//! Every run is also reported through a `RunEvent` broadcast and
//! Prometheus counters kept on the executor's own registry.

pub mod events;
pub mod executor;
pub mod metrics;

pub use events::RunEvent;
pub use executor::Executor;
pub use metrics::{ExecutionMetrics, MetricsSnapshot};
