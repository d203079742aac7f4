use async_trait::async_trait;
use serde_json::Value;

use pilot_core::{AgentId, Result};
use pilot_executor::Executor;

/// What a timer invokes when it fires for `agent_id`
#[async_trait]
pub trait AgentJobRunner: Send + Sync {
    async fn run_agent_job(&self, agent_id: AgentId) -> Result<Value>;
}

#[async_trait]
impl AgentJobRunner for Executor {
    async fn run_agent_job(&self, agent_id: AgentId) -> Result<Value> {
        self.execute_agent_by_id(agent_id).await
    }
}
