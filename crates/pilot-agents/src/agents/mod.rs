//! Built-in agent behaviors

pub mod invoice_email;
