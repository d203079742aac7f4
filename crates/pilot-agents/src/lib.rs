//! pilot-agents: Agent dispatcher and built-in behaviors
//!
//! Maps an agent kind string to a behavior constructor and runs it with the
//! agent's configuration document.

pub mod agent_catalog;
pub mod agents;
pub mod dispatcher;

// Re-export main types
pub use agent_catalog::{builtin_agent_descriptors, AgentDescriptor};
pub use agents::invoice_email::{InvoiceEmailAgent, InvoiceEmailConfig};
pub use dispatcher::{AgentConstructor, AgentDispatcher};

/// List built-in agent kinds
pub fn list_agent_kinds() -> Vec<String> {
    builtin_agent_descriptors()
        .into_iter()
        .map(|descriptor| descriptor.kind)
        .collect()
}
