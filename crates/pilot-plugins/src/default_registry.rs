//! Default plugin registration - loads built-in plugins at startup
//!
//! Which built-ins are registered is controlled by `PluginSettings.auto_load`.

use std::sync::Arc;

use pilot_core::config::PluginSettings;

use crate::builtin::{EmailAction, LogAction, MockEmailConnector};
use crate::registry::CapabilityRegistry;

/// Names of the built-in plugins that `register_default_plugins` understands
pub fn available_plugins() -> Vec<&'static str> {
    vec!["mock_email", "email", "log"]
}

/// Register every built-in named in `settings.auto_load`.
///
/// Unknown names are skipped with a warning. Returns the names registered.
pub async fn register_default_plugins(
    registry: &CapabilityRegistry,
    settings: &PluginSettings,
) -> Vec<String> {
    let mut registered = Vec::new();

    for name in &settings.auto_load {
        match name.as_str() {
            "mock_email" => {
                let messages = Arc::new(settings.mock_email_messages.clone());
                registry
                    .register_connector("mock_email", move || {
                        Box::new(MockEmailConnector::new(messages.as_ref().clone()))
                    })
                    .await;
            }
            "email" => {
                registry
                    .register_action("email", || Box::new(EmailAction::new()))
                    .await;
            }
            "log" => {
                registry
                    .register_action("log", || Box::new(LogAction::new()))
                    .await;
            }
            other => {
                tracing::warn!(plugin = %other, "Unknown built-in plugin, skipping");
                continue;
            }
        }
        registered.push(name.clone());
    }

    tracing::info!(count = registered.len(), "Registered built-in plugins");
    registered
}
