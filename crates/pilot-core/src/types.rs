//! Common identifiers used across agentpilot crates

/// Store-assigned agent identifier
pub type AgentId = i64;

/// Store-assigned run identifier
pub type RunId = i64;

/// Agent kind tag of the reference invoice-forwarding behavior
pub const INVOICE_EMAIL_KIND: &str = "invoice_email";

/// Connector used by agents whose config names none
pub const DEFAULT_CONNECTOR: &str = "mock_email";

/// Action used by agents whose config names none
pub const DEFAULT_ACTION: &str = "email";

/// Schedule applied to agents created without one
pub const DEFAULT_SCHEDULE_SECONDS: u64 = 300;
