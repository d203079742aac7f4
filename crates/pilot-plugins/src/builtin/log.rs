use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use pilot_core::traits::Action;
use pilot_core::Result;

/// Action that records its parameters through `tracing`
#[derive(Debug, Clone, Default)]
pub struct LogAction;

impl LogAction {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Action for LogAction {
    async fn run(&self, params: Value) -> Result<Value> {
        info!(params = %params, "Log action");
        Ok(json!({ "logged": params }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echoes_params() {
        let result = LogAction::new().run(json!({"k": 1})).await.unwrap();
        assert_eq!(result, json!({"logged": {"k": 1}}));
    }
}
