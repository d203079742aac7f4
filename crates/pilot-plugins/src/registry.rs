//! Capability registry mapping names to connector and action factories

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use pilot_core::traits::{BoxedAction, BoxedConnector};
use pilot_core::{Error, Result};

/// Factory producing a fresh connector per lookup
pub type ConnectorFactory = Arc<dyn Fn() -> BoxedConnector + Send + Sync>;

/// Factory producing a fresh action per lookup
pub type ActionFactory = Arc<dyn Fn() -> BoxedAction + Send + Sync>;

/// Registered component entry
struct RegisteredComponent<F> {
    name: String,
    factory: F,
}

/// Process-wide registry of pluggable components.
///
/// Constructed once at startup and shared as `Arc<CapabilityRegistry>`.
/// Holds no execution state; every lookup builds a new instance.
#[derive(Default)]
pub struct CapabilityRegistry {
    connectors: RwLock<HashMap<String, RegisteredComponent<ConnectorFactory>>>,
    actions: RwLock<HashMap<String, RegisteredComponent<ActionFactory>>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector factory, replacing any previous entry for `name`
    pub async fn register_connector<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> BoxedConnector + Send + Sync + 'static,
    {
        let mut connectors = self.connectors.write().await;
        let replaced = connectors
            .insert(
                name.to_string(),
                RegisteredComponent {
                    name: name.to_string(),
                    factory: Arc::new(factory),
                },
            )
            .is_some();
        info!(connector = %name, replaced, "Registered connector");
    }

    /// Register an action factory, replacing any previous entry for `name`
    pub async fn register_action<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> BoxedAction + Send + Sync + 'static,
    {
        let mut actions = self.actions.write().await;
        let replaced = actions
            .insert(
                name.to_string(),
                RegisteredComponent {
                    name: name.to_string(),
                    factory: Arc::new(factory),
                },
            )
            .is_some();
        info!(action = %name, replaced, "Registered action");
    }

    /// Build the connector registered under `name`
    pub async fn connector(&self, name: &str) -> Result<BoxedConnector> {
        // Clone the factory so the lock is not held while it runs
        let factory = {
            let connectors = self.connectors.read().await;
            connectors
                .get(name)
                .map(|entry| Arc::clone(&entry.factory))
                .ok_or_else(|| Error::not_found(format!("connector '{}'", name)))?
        };
        debug!(connector = %name, "Constructing connector");
        Ok(factory())
    }

    /// Build the action registered under `name`
    pub async fn action(&self, name: &str) -> Result<BoxedAction> {
        let factory = {
            let actions = self.actions.read().await;
            actions
                .get(name)
                .map(|entry| Arc::clone(&entry.factory))
                .ok_or_else(|| Error::not_found(format!("action '{}'", name)))?
        };
        debug!(action = %name, "Constructing action");
        Ok(factory())
    }

    pub async fn has_connector(&self, name: &str) -> bool {
        self.connectors.read().await.contains_key(name)
    }

    pub async fn has_action(&self, name: &str) -> bool {
        self.actions.read().await.contains_key(name)
    }

    /// Registered connector names, sorted
    pub async fn connector_names(&self) -> Vec<String> {
        let connectors = self.connectors.read().await;
        let mut names: Vec<_> = connectors.values().map(|c| c.name.clone()).collect();
        names.sort();
        names
    }

    /// Registered action names, sorted
    pub async fn action_names(&self) -> Vec<String> {
        let actions = self.actions.read().await;
        let mut names: Vec<_> = actions.values().map(|a| a.name.clone()).collect();
        names.sort();
        names
    }
}
