//! Agent dispatcher - resolves an agent kind to a behavior and runs it

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use pilot_core::traits::BoxedBehavior;
use pilot_core::{Error, Result, INVOICE_EMAIL_KIND};
use pilot_plugins::CapabilityRegistry;

use crate::agents::invoice_email::InvoiceEmailAgent;

/// Builds a behavior from an agent config document
pub type AgentConstructor =
    Arc<dyn Fn(Value, Arc<CapabilityRegistry>) -> Result<BoxedBehavior> + Send + Sync>;

/// Kind-to-constructor mapping.
///
/// Populated at startup, then shared read-only as `Arc<AgentDispatcher>`.
/// Adding a kind never requires touching the executor or scheduler.
pub struct AgentDispatcher {
    registry: Arc<CapabilityRegistry>,
    kinds: HashMap<String, AgentConstructor>,
}

impl AgentDispatcher {
    /// Dispatcher with no kinds registered
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            kinds: HashMap::new(),
        }
    }

    /// Dispatcher with every built-in kind registered
    pub fn with_builtin_agents(registry: Arc<CapabilityRegistry>) -> Self {
        let mut dispatcher = Self::new(registry);
        dispatcher.register_kind(INVOICE_EMAIL_KIND, |config, registry| {
            Ok(Box::new(InvoiceEmailAgent::from_config(config, registry)?))
        });
        dispatcher
    }

    /// Register or replace the constructor for `kind`
    pub fn register_kind<F>(&mut self, kind: &str, constructor: F)
    where
        F: Fn(Value, Arc<CapabilityRegistry>) -> Result<BoxedBehavior> + Send + Sync + 'static,
    {
        self.kinds.insert(kind.to_string(), Arc::new(constructor));
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<_> = self.kinds.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn registry(&self) -> Arc<CapabilityRegistry> {
        Arc::clone(&self.registry)
    }

    /// Construct the behavior for `kind` with `config` and run it.
    ///
    /// The result is returned as the behavior produced it; its schema is a
    /// per-kind contract.
    #[instrument(skip(self, config), fields(kind = %kind))]
    pub async fn run_agent(&self, kind: &str, config: Value) -> Result<Value> {
        let constructor = self
            .kinds
            .get(kind)
            .ok_or_else(|| Error::UnknownAgentKind(kind.to_string()))?;

        let behavior = constructor(config, Arc::clone(&self.registry))?;
        debug!("Running agent behavior");
        behavior.run().await
    }
}
