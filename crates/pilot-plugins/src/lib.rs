//! pilot-plugins: Capability registry with built-in connectors and actions
//!
//! Features:
//! - Name-keyed factories for connectors and actions (last write wins)
//! - Fresh component instance per lookup
//! - Built-in `mock_email` connector, `email` and `log` actions
//! - Startup registration driven by `PluginSettings`

pub mod builtin;
pub mod default_registry;
pub mod registry;

pub use builtin::{EmailAction, LogAction, MockEmailConnector};
pub use default_registry::{available_plugins, register_default_plugins};
pub use registry::{ActionFactory, CapabilityRegistry, ConnectorFactory};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::builtin::{EmailAction, LogAction, MockEmailConnector};
    pub use super::registry::CapabilityRegistry;
    pub use pilot_core::traits::{Action, Connector};
}
