//! Plugin contract for connectors, actions and agent behaviors
//!
//! Every result is a `serde_json::Value` because run results are persisted
//! as JSON text in the run record's logs.

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// Pluggable data source
#[async_trait]
pub trait Connector: Send + Sync {
    /// Fetch all available records
    async fn fetch(&self, params: Value) -> Result<Vec<Value>>;
}

/// Pluggable side-effecting operation
#[async_trait]
pub trait Action: Send + Sync {
    /// Perform the action and return its result document
    async fn run(&self, params: Value) -> Result<Value>;
}

/// Behavior of one agent kind, constructed per run from the agent config
#[async_trait]
pub trait AgentBehavior: Send + Sync {
    async fn run(&self) -> Result<Value>;
}

/// Boxed connector type
pub type BoxedConnector = Box<dyn Connector>;

/// Boxed action type
pub type BoxedAction = Box<dyn Action>;

/// Boxed agent behavior type
pub type BoxedBehavior = Box<dyn AgentBehavior>;
