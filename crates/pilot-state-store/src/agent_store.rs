use async_trait::async_trait;
use chrono::{DateTime, Utc};

use pilot_core::{AgentId, RunId};

use crate::error::Result;
use crate::records::{
    AgentDefinition, AgentUpdate, NewAgent, NewRun, RunCounts, RunRecord, RunUpdate,
};

/// Durable storage for agent definitions and their runs
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn create_agent(&self, agent: NewAgent) -> Result<AgentDefinition>;
    async fn get_agent_definition(&self, id: AgentId) -> Result<Option<AgentDefinition>>;
    async fn list_agent_definitions(&self) -> Result<Vec<AgentDefinition>>;
    /// Enabled agents ordered by id
    async fn list_enabled_agent_definitions(&self) -> Result<Vec<AgentDefinition>>;
    async fn update_agent(&self, id: AgentId, update: AgentUpdate) -> Result<AgentDefinition>;
    /// Delete an agent and its runs; `false` if it did not exist
    async fn delete_agent(&self, id: AgentId) -> Result<bool>;

    async fn create_run_record(&self, run: NewRun) -> Result<RunRecord>;
    async fn get_run_record(&self, id: RunId) -> Result<Option<RunRecord>>;
    /// Apply `update` atomically; status may only move forward
    async fn update_run_record(&self, id: RunId, update: RunUpdate) -> Result<RunRecord>;
    /// Newest first
    async fn list_runs_for_agent(&self, agent_id: AgentId, limit: u32) -> Result<Vec<RunRecord>>;
    async fn count_runs_by_status(&self) -> Result<RunCounts>;
    /// Delete terminal runs that finished before `before`
    async fn delete_finished_runs_before(&self, before: DateTime<Utc>) -> Result<u64>;
}
