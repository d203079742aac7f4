//! Invoice-forwarding agent
//!
//! Fetches messages from a connector, keeps the ones whose subject mentions
//! an invoice and forwards each through an action to the accounting address.
//!
//! Forwarding is fail-fast: the first action error aborts the remaining
//! batch and propagates to the executor.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use pilot_core::traits::AgentBehavior;
use pilot_core::{Error, Result, DEFAULT_ACTION, DEFAULT_CONNECTOR};
use pilot_plugins::CapabilityRegistry;

const INVOICE_MARKER: &str = "invoice";

fn default_connector() -> String {
    DEFAULT_CONNECTOR.to_string()
}

fn default_action() -> String {
    DEFAULT_ACTION.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceEmailConfig {
    #[serde(default = "default_connector")]
    pub connector: String,
    #[serde(default = "default_action")]
    pub action: String,
    /// Forwarded to the action as `to`, whatever its JSON type
    #[serde(default, alias = "accountingEmail")]
    pub accounting_email: Option<Value>,
}

pub struct InvoiceEmailAgent {
    config: InvoiceEmailConfig,
    registry: Arc<CapabilityRegistry>,
}

impl InvoiceEmailAgent {
    pub fn new(config: InvoiceEmailConfig, registry: Arc<CapabilityRegistry>) -> Self {
        Self { config, registry }
    }

    /// Build from an agent config document; `null` is treated as `{}`
    pub fn from_config(config: Value, registry: Arc<CapabilityRegistry>) -> Result<Self> {
        let config = match config {
            Value::Null => json!({}),
            Value::Object(_) => config,
            other => {
                return Err(Error::invalid_argument(format!(
                    "invoice_email config must be an object, got {}",
                    other
                )))
            }
        };
        let config: InvoiceEmailConfig = serde_json::from_value(config)
            .map_err(|e| Error::invalid_argument(format!("invoice_email config: {}", e)))?;
        Ok(Self::new(config, registry))
    }
}

fn subject_of(message: &Value) -> &str {
    message.get("subject").and_then(Value::as_str).unwrap_or("")
}

fn is_invoice(message: &Value) -> bool {
    subject_of(message).to_lowercase().contains(INVOICE_MARKER)
}

#[async_trait]
impl AgentBehavior for InvoiceEmailAgent {
    async fn run(&self) -> Result<Value> {
        let connector = self.registry.connector(&self.config.connector).await?;
        let messages = connector.fetch(json!({})).await?;

        let action = self.registry.action(&self.config.action).await?;

        let invoices: Vec<&Value> = messages.iter().filter(|m| is_invoice(m)).collect();
        debug!(
            inputs = messages.len(),
            invoices = invoices.len(),
            "Filtered invoice messages"
        );

        let mut sent = 0usize;
        for invoice in &invoices {
            let body = invoice.get("body").cloned().unwrap_or_else(|| json!(""));
            action
                .run(json!({
                    "to": self.config.accounting_email,
                    "subject": format!("FWD: {}", subject_of(invoice)),
                    "body": body,
                }))
                .await?;
            sent += 1;
        }

        info!(
            inputs = messages.len(),
            invoices = invoices.len(),
            sent,
            "Invoice forwarding finished"
        );
        Ok(json!({
            "inputs": messages.len(),
            "invoices": invoices.len(),
            "sent": sent,
        }))
    }
}
