//! Simulated outbound email

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use pilot_core::traits::Action;
use pilot_core::Result;

/// Placeholder action that pretends to send a message
#[derive(Debug, Clone, Default)]
pub struct EmailAction;

impl EmailAction {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Action for EmailAction {
    async fn run(&self, params: Value) -> Result<Value> {
        let to = params.get("to").cloned().unwrap_or(Value::Null);
        let subject = params.get("subject").and_then(Value::as_str).unwrap_or("");
        let body = params.get("body").and_then(Value::as_str).unwrap_or("");

        debug!(to = %to, subject = %subject, "Simulated email send");
        Ok(json!({
            "sent": true,
            "to": to,
            "subject": subject,
            "body_len": body.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reports_send_summary() {
        let result = EmailAction::new()
            .run(json!({"to": "ap@example.com", "subject": "FWD: Invoice", "body": "12345"}))
            .await
            .unwrap();
        assert_eq!(result["sent"], true);
        assert_eq!(result["to"], "ap@example.com");
        assert_eq!(result["body_len"], 5);
    }

    #[tokio::test]
    async fn test_missing_fields_default() {
        let result = EmailAction::new().run(json!({})).await.unwrap();
        assert_eq!(result["to"], Value::Null);
        assert_eq!(result["subject"], "");
        assert_eq!(result["body_len"], 0);
    }
}
