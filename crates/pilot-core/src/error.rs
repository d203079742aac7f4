//! Error types for the agentpilot runtime

use thiserror::Error;

/// Main error type shared by registry, dispatcher, executor and scheduler
#[derive(Error, Debug)]
pub enum Error {
    /// An agent id, run id or registered component name is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// The dispatcher has no constructor for this agent kind
    #[error("Unknown agent kind: {0}")]
    UnknownAgentKind(String),

    /// A behavior, connector or action raised during execution
    #[error("{component} failed: {message}")]
    PluginFailure { component: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a plugin failure attributed to `component`
    pub fn plugin(component: impl Into<String>, message: impl Into<String>) -> Self {
        Error::PluginFailure {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Stable name of the error variant, written into run logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NotFound",
            Error::UnknownAgentKind(_) => "UnknownAgentKind",
            Error::PluginFailure { .. } => "PluginFailure",
            Error::InvalidArgument(_) => "InvalidArgument",
            Error::Store(_) => "Store",
            Error::Serialization(_) => "Serialization",
            Error::Config(_) => "Config",
            Error::Internal(_) => "Internal",
        }
    }

    /// `"<kind>: <message>"`, the form persisted in a failed run's logs
    pub fn log_line(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_line_includes_kind_and_message() {
        let err = Error::plugin("action 'email'", "smtp unavailable");
        assert_eq!(err.kind(), "PluginFailure");
        assert_eq!(
            err.log_line(),
            "PluginFailure: action 'email' failed: smtp unavailable"
        );
    }

    #[test]
    fn test_not_found_helpers() {
        let err = Error::not_found("connector 'imap'");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: connector 'imap'");
        assert!(!Error::UnknownAgentKind("x".into()).is_not_found());
    }

    #[test]
    fn test_anyhow_converts_to_internal() {
        let err: Error = anyhow::anyhow!("boom").into();
        assert_eq!(err.kind(), "Internal");
    }
}
