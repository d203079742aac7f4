//! Agentpilot State Store - Agent Definitions and Run Ledger
//!
//! Provides persistent storage for agent definitions and their run records,
//! with run status transitions:
//! PENDING/QUEUED → RUNNING → SUCCESS/ERROR
//!
//! Features:
//! - SQLite persistent storage (sqlx)
//! - Atomic, monotonic run record updates
//! - Cascade delete of runs with their agent

pub mod agent_store;
pub mod error;
pub mod records;
pub mod sqlite_store;

pub use agent_store::AgentStore;
pub use error::StateStoreError;
pub use records::{
    AgentDefinition, AgentUpdate, NewAgent, NewRun, RunCounts, RunRecord, RunStatus, RunUpdate,
};
pub use sqlite_store::SqliteStore;
