//! Core types and utilities for the agentpilot runtime
//!
//! # Modules
//!
//! - `config`: Environment file loading and layered `Settings`
//! - `error`: Error taxonomy and Result alias
//! - `traits`: Plugin contract (`Connector`, `Action`, `AgentBehavior`)
//! - `types`: Identifier aliases shared across crates

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

// Re-exports
pub use config::Settings;
pub use error::{Error, Result};
pub use traits::{Action, AgentBehavior, Connector};
pub use types::*;
