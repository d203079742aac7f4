//! Executor - drives one agent run from creation to its final record

use chrono::Utc;
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn, Span};

use pilot_agents::AgentDispatcher;
use pilot_core::{AgentId, Error, Result, RunId};
use pilot_state_store::{
    AgentDefinition, AgentStore, NewRun, RunRecord, RunStatus, RunUpdate, StateStoreError,
};

use crate::events::RunEvent;
use crate::metrics::ExecutionMetrics;

const EVENT_BUFFER: usize = 1000;

/// Runs agents and records every attempt in the store.
///
/// Cheap to clone; clones share the store, dispatcher, metrics and event
/// channel.
#[derive(Clone)]
pub struct Executor {
    store: Arc<dyn AgentStore>,
    dispatcher: Arc<AgentDispatcher>,
    metrics: Arc<ExecutionMetrics>,
    event_sender: broadcast::Sender<RunEvent>,
}

impl Executor {
    pub fn new(store: Arc<dyn AgentStore>, dispatcher: Arc<AgentDispatcher>) -> Result<Self> {
        let metrics = ExecutionMetrics::new()
            .map_err(|e| Error::internal(format!("execution metrics: {}", e)))?;
        Ok(Self::with_metrics(store, dispatcher, Arc::new(metrics)))
    }

    pub fn with_metrics(
        store: Arc<dyn AgentStore>,
        dispatcher: Arc<AgentDispatcher>,
        metrics: Arc<ExecutionMetrics>,
    ) -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            store,
            dispatcher,
            metrics,
            event_sender,
        }
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.event_sender.subscribe()
    }

    pub fn metrics(&self) -> &ExecutionMetrics {
        &self.metrics
    }

    pub fn store(&self) -> Arc<dyn AgentStore> {
        Arc::clone(&self.store)
    }

    /// Start a fresh run for `agent_id` and execute it.
    ///
    /// A missing agent yields `{"error": "Agent <id> not found"}` without
    /// creating a run.
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn execute_agent_by_id(&self, agent_id: AgentId) -> Result<Value> {
        let Some(agent) = self.store.get_agent_definition(agent_id).await? else {
            warn!("Agent not found, no run created");
            return Ok(agent_not_found(agent_id));
        };

        let run = match self
            .store
            .create_run_record(NewRun::running(agent.id, Utc::now()))
            .await
        {
            Ok(run) => run,
            // Deleted between the lookup and the insert
            Err(StateStoreError::NotFound(_)) => {
                warn!("Agent deleted before its run was created");
                return Ok(agent_not_found(agent_id));
            }
            Err(e) => return Err(e.into()),
        };

        self.drive(agent, run).await
    }

    /// Claim an existing queued or pending run and execute it.
    ///
    /// A missing run or agent yields a structured error result and nothing
    /// is modified. A run that already started fails with a store error.
    #[instrument(skip(self), fields(agent_id = tracing::field::Empty))]
    pub async fn execute_run(&self, run_id: RunId) -> Result<Value> {
        let Some(run) = self.store.get_run_record(run_id).await? else {
            warn!("Run not found");
            return Ok(json!({ "error": format!("Run {} not found", run_id) }));
        };
        Span::current().record("agent_id", run.agent_id);

        let Some(agent) = self.store.get_agent_definition(run.agent_id).await? else {
            warn!("Agent for run not found");
            return Ok(agent_not_found(run.agent_id));
        };

        let run = self
            .store
            .update_run_record(run.id, RunUpdate::start(Utc::now()))
            .await?;

        self.drive(agent, run).await
    }

    /// Dispatch the behavior for a persisted `running` record, then write the
    /// final state exactly once whatever the outcome.
    async fn drive(&self, agent: AgentDefinition, run: RunRecord) -> Result<Value> {
        Span::current().record("run_id", run.id);
        info!(kind = %agent.kind, "Run started");

        self.metrics.run_started();
        let _ = self.event_sender.send(RunEvent::Started(run.clone()));
        let clock = Instant::now();

        let outcome = AssertUnwindSafe(self.dispatcher.run_agent(&agent.kind, agent.config))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Error::plugin("panic", panic_message(panic.as_ref()))))
            .and_then(|value| {
                let logs = serde_json::to_string(&value)?;
                Ok((value, logs))
            });

        let now = Utc::now();
        let finished_at = run.started_at.map_or(now, |started| now.max(started));
        let update = match &outcome {
            Ok((_, logs)) => RunUpdate::finish(RunStatus::Success, finished_at, logs.clone()),
            Err(err) => RunUpdate::finish(RunStatus::Error, finished_at, err.log_line()),
        };

        let elapsed = clock.elapsed();
        let persisted = self.store.update_run_record(run.id, update).await;

        match (&outcome, &persisted) {
            (Ok(_), Ok(_)) => self.metrics.run_succeeded(elapsed),
            _ => self.metrics.run_failed(elapsed),
        }

        match persisted {
            Ok(record) => {
                let _ = self.event_sender.send(RunEvent::Finished(record));
            }
            Err(store_err) => {
                error!(error = %store_err, "Failed to persist final run state");
                if outcome.is_ok() {
                    return Err(store_err.into());
                }
            }
        }

        match outcome {
            Ok((value, _)) => {
                info!(elapsed_ms = elapsed.as_millis() as u64, "Run succeeded");
                Ok(value)
            }
            Err(err) => {
                error!(error = %err, kind = err.kind(), "Run failed");
                Err(err)
            }
        }
    }
}

fn agent_not_found(agent_id: AgentId) -> Value {
    json!({ "error": format!("Agent {} not found", agent_id) })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "behavior panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pilot_core::traits::AgentBehavior;
    use pilot_core::INVOICE_EMAIL_KIND;
    use pilot_plugins::{CapabilityRegistry, EmailAction, MockEmailConnector};
    use pilot_state_store::error::Result as StoreResult;
    use pilot_state_store::{AgentUpdate, NewAgent, RunCounts, SqliteStore};

    struct Scripted {
        outcome: std::result::Result<Value, String>,
    }

    #[async_trait]
    impl AgentBehavior for Scripted {
        async fn run(&self) -> Result<Value> {
            self.outcome
                .clone()
                .map_err(|message| Error::plugin("action 'email'", message))
        }
    }

    struct Panicking;

    #[async_trait]
    impl AgentBehavior for Panicking {
        async fn run(&self) -> Result<Value> {
            panic!("connector exploded")
        }
    }

    async fn setup() -> (Executor, Arc<SqliteStore>) {
        let registry = Arc::new(CapabilityRegistry::new());
        registry
            .register_connector("mock_email", || {
                Box::new(MockEmailConnector::new(vec![
                    serde_json::json!({"subject": "Invoice 12", "body": "due"}),
                    serde_json::json!({"subject": "hello", "body": "hi"}),
                ]))
            })
            .await;
        registry
            .register_action("email", || Box::new(EmailAction::new()))
            .await;

        let mut dispatcher = AgentDispatcher::with_builtin_agents(registry);
        dispatcher.register_kind("ok", |_, _| {
            Ok(Box::new(Scripted {
                outcome: Ok(json!({"done": true})),
            }))
        });
        dispatcher.register_kind("fails", |_, _| {
            Ok(Box::new(Scripted {
                outcome: Err("mailbox full".into()),
            }))
        });
        dispatcher.register_kind("panics", |_, _| Ok(Box::new(Panicking)));

        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let executor = Executor::new(store.clone(), Arc::new(dispatcher)).unwrap();
        (executor, store)
    }

    async fn agent(store: &SqliteStore, name: &str, kind: &str) -> AgentId {
        store
            .create_agent(NewAgent::new(name, kind, json!({"accounting_email": "ap@example.com"})))
            .await
            .unwrap()
            .id
    }

    async fn only_run(store: &SqliteStore, agent_id: AgentId) -> RunRecord {
        let runs = store.list_runs_for_agent(agent_id, 10).await.unwrap();
        assert_eq!(runs.len(), 1);
        runs.into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn test_success_records_result() {
        let (executor, store) = setup().await;
        let id = agent(&store, "invoices", INVOICE_EMAIL_KIND).await;
        let mut events = executor.subscribe();

        let result = executor.execute_agent_by_id(id).await.unwrap();
        assert_eq!(result, json!({"inputs": 2, "invoices": 1, "sent": 1}));

        let run = only_run(&store, id).await;
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(serde_json::from_str::<Value>(&run.logs).unwrap(), result);
        assert!(run.finished_at.unwrap() >= run.started_at.unwrap());

        assert!(matches!(events.recv().await.unwrap(), RunEvent::Started(r) if r.status == RunStatus::Running));
        assert!(matches!(events.recv().await.unwrap(), RunEvent::Finished(r) if r == run));

        let metrics = executor.metrics().snapshot();
        assert_eq!((metrics.started, metrics.succeeded, metrics.active), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_missing_agent_creates_no_run() {
        let (executor, store) = setup().await;
        let result = executor.execute_agent_by_id(77).await.unwrap();
        assert_eq!(result, json!({"error": "Agent 77 not found"}));
        assert_eq!(store.count_runs_by_status().await.unwrap().total, 0);
        assert_eq!(executor.metrics().snapshot().started, 0);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_then_propagated() {
        let (executor, store) = setup().await;
        let id = agent(&store, "broken", "fails").await;

        let err = executor.execute_agent_by_id(id).await.unwrap_err();
        assert!(matches!(err, Error::PluginFailure { .. }));

        let run = only_run(&store, id).await;
        assert_eq!(run.status, RunStatus::Error);
        assert_eq!(run.logs, "PluginFailure: action 'email' failed: mailbox full");
        assert!(run.finished_at.unwrap() >= run.started_at.unwrap());
        assert_eq!(executor.metrics().snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_recorded() {
        let (executor, store) = setup().await;
        let id = agent(&store, "weather", "weather_report").await;

        let err = executor.execute_agent_by_id(id).await.unwrap_err();
        assert!(matches!(err, Error::UnknownAgentKind(_)));
        let run = only_run(&store, id).await;
        assert_eq!(run.status, RunStatus::Error);
        assert!(run.logs.starts_with("UnknownAgentKind: "));
    }

    #[tokio::test]
    async fn test_panic_still_finalizes_run() {
        let (executor, store) = setup().await;
        let id = agent(&store, "fragile", "panics").await;

        let err = executor.execute_agent_by_id(id).await.unwrap_err();
        assert!(matches!(err, Error::PluginFailure { ref component, .. } if component == "panic"));

        let run = only_run(&store, id).await;
        assert_eq!(run.status, RunStatus::Error);
        assert!(run.logs.contains("connector exploded"));
        assert!(run.finished_at.is_some());
        assert_eq!(executor.metrics().snapshot().active, 0);
    }

    #[tokio::test]
    async fn test_execute_queued_run_once() {
        let (executor, store) = setup().await;
        let id = agent(&store, "steady", "ok").await;
        let queued = store.create_run_record(NewRun::queued(id)).await.unwrap();

        let result = executor.execute_run(queued.id).await.unwrap();
        assert_eq!(result, json!({"done": true}));
        let run = store.get_run_record(queued.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert!(run.started_at.is_some());

        let err = executor.execute_run(queued.id).await.unwrap_err();
        assert_eq!(err.kind(), "Store");
        assert_eq!(store.get_run_record(queued.id).await.unwrap().unwrap(), run);
    }

    #[tokio::test]
    async fn test_execute_missing_run() {
        let (executor, store) = setup().await;
        let result = executor.execute_run(9).await.unwrap();
        assert_eq!(result, json!({"error": "Run 9 not found"}));
        assert_eq!(store.count_runs_by_status().await.unwrap().total, 0);
    }

    /// Store holding one queued run whose agent no longer exists
    struct OrphanedRun {
        run: RunRecord,
        writes: std::sync::atomic::AtomicUsize,
    }

    impl OrphanedRun {
        fn write(&self) -> pilot_state_store::StateStoreError {
            self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            pilot_state_store::StateStoreError::InvalidArgument("read-only".to_string())
        }
    }

    #[async_trait]
    impl AgentStore for OrphanedRun {
        async fn create_agent(&self, _: NewAgent) -> StoreResult<AgentDefinition> {
            Err(self.write())
        }
        async fn get_agent_definition(&self, _: AgentId) -> StoreResult<Option<AgentDefinition>> {
            Ok(None)
        }
        async fn list_agent_definitions(&self) -> StoreResult<Vec<AgentDefinition>> {
            Ok(vec![])
        }
        async fn list_enabled_agent_definitions(&self) -> StoreResult<Vec<AgentDefinition>> {
            Ok(vec![])
        }
        async fn update_agent(&self, _: AgentId, _: AgentUpdate) -> StoreResult<AgentDefinition> {
            Err(self.write())
        }
        async fn delete_agent(&self, _: AgentId) -> StoreResult<bool> {
            Err(self.write())
        }
        async fn create_run_record(&self, _: NewRun) -> StoreResult<RunRecord> {
            Err(self.write())
        }
        async fn get_run_record(&self, id: RunId) -> StoreResult<Option<RunRecord>> {
            Ok((id == self.run.id).then(|| self.run.clone()))
        }
        async fn update_run_record(&self, _: RunId, _: RunUpdate) -> StoreResult<RunRecord> {
            Err(self.write())
        }
        async fn list_runs_for_agent(&self, _: AgentId, _: u32) -> StoreResult<Vec<RunRecord>> {
            Ok(vec![self.run.clone()])
        }
        async fn count_runs_by_status(&self) -> StoreResult<RunCounts> {
            Ok(RunCounts::default())
        }
        async fn delete_finished_runs_before(&self, _: chrono::DateTime<Utc>) -> StoreResult<u64> {
            Err(self.write())
        }
    }

    #[tokio::test]
    async fn test_execute_run_of_deleted_agent_changes_nothing() {
        let store = Arc::new(OrphanedRun {
            run: RunRecord {
                id: 31,
                agent_id: 8,
                status: RunStatus::Queued,
                started_at: None,
                finished_at: None,
                logs: String::new(),
            },
            writes: Default::default(),
        });
        let dispatcher = AgentDispatcher::new(Arc::new(CapabilityRegistry::new()));
        let executor = Executor::new(store.clone(), Arc::new(dispatcher)).unwrap();

        let result = executor.execute_run(31).await.unwrap();
        assert_eq!(result, json!({"error": "Agent 8 not found"}));
        assert_eq!(store.writes.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(executor.metrics().snapshot().started, 0);
    }

    #[tokio::test]
    async fn test_concurrent_runs_of_one_agent() {
        let (executor, store) = setup().await;
        let id = agent(&store, "parallel", "ok").await;

        let (a, b) = tokio::join!(executor.execute_agent_by_id(id), executor.execute_agent_by_id(id));
        assert!(a.is_ok() && b.is_ok());
        let counts = store.count_runs_by_status().await.unwrap();
        assert_eq!((counts.total, counts.success), (2, 2));
    }
}
