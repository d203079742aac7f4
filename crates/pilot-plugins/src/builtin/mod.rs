//! Built-in plugins

mod email;
mod log;
mod mock_email;

pub use email::EmailAction;
pub use log::LogAction;
pub use mock_email::MockEmailConnector;
