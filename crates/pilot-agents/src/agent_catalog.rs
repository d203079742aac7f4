//! Descriptors for the built-in agent kinds

use serde::{Deserialize, Serialize};

use pilot_core::INVOICE_EMAIL_KIND;

/// Static description of an agent kind and the keys its config accepts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub kind: String,
    pub description: String,
    pub config_keys: Vec<String>,
    pub result_fields: Vec<String>,
}

pub fn builtin_agent_descriptors() -> Vec<AgentDescriptor> {
    vec![AgentDescriptor {
        kind: INVOICE_EMAIL_KIND.to_string(),
        description: "Forwards messages whose subject mentions an invoice to accounting"
            .to_string(),
        config_keys: vec![
            "connector".to_string(),
            "action".to_string(),
            "accounting_email".to_string(),
        ],
        result_fields: vec![
            "inputs".to_string(),
            "invoices".to_string(),
            "sent".to_string(),
        ],
    }]
}
