//! In-memory mail source used for demos and tests

use async_trait::async_trait;
use serde_json::Value;

use pilot_core::traits::Connector;
use pilot_core::Result;

/// Connector serving a fixed set of messages.
///
/// Each message is an object with `subject`, `body` and optionally `from`.
#[derive(Debug, Clone, Default)]
pub struct MockEmailConnector {
    messages: Vec<Value>,
}

impl MockEmailConnector {
    pub fn new(messages: Vec<Value>) -> Self {
        Self { messages }
    }
}

#[async_trait]
impl Connector for MockEmailConnector {
    async fn fetch(&self, _params: Value) -> Result<Vec<Value>> {
        Ok(self.messages.clone())
    }
}
