//! Runtime configuration
//!
//! Two layers:
//!
//! - `load_environment()` copies `KEY=VALUE` lines from an environment file
//!   into the process environment without overriding variables already set.
//! - `Settings::load()` builds the typed settings from defaults, an optional
//!   TOML file and `AGENTPILOT__*` environment variables, in that order.
//!
//! ```no_run
//! use pilot_core::config::{load_environment, Settings};
//!
//! load_environment();
//! let settings = Settings::load(None).unwrap();
//! println!("database: {}", settings.database_url);
//! ```

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::Result;

/// Environment variable naming a custom environment file
pub const ENV_FILE_VAR: &str = "AGENTPILOT_ENV_FILE";

/// Environment files checked in order of priority
pub const ENV_FILE_PATHS: &[&str] = &["/etc/agentpilot/environment", ".env"];

/// Prefix of environment variables read by `Settings::load`
pub const ENV_PREFIX: &str = "AGENTPILOT";

/// Load environment variables from the first environment file found.
///
/// Returns the path that was loaded, or None if no file was found.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var(ENV_FILE_VAR) {
        if let Some(path) = load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded) = load_env_file(path) {
            return Some(loaded);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

fn load_env_file(path: &str) -> Option<String> {
    let file = Path::new(path);
    if !file.exists() {
        return None;
    }

    let content = match fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            return None;
        }
    };

    let mut loaded = 0;
    let mut skipped = 0;
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = parse_env_line(line) else {
            continue;
        };
        if std::env::var(&key).is_ok() {
            skipped += 1;
            continue;
        }
        std::env::set_var(&key, &value);
        loaded += 1;
    }

    info!(
        "Loaded {} environment variables from {} ({} already set)",
        loaded, path, skipped
    );
    Some(path.to_string())
}

/// Parse `KEY=VALUE`, `KEY="VALUE"` or `KEY='VALUE'`.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// What the scheduler does when a timer fires while the previous run of the
/// same agent is still in flight
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Start another execution regardless
    #[default]
    Allow,
    /// Drop the firing
    SkipIfRunning,
    /// Wait for the in-flight run, then execute
    Serial,
}

impl std::str::FromStr for OverlapPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "allow" => Ok(Self::Allow),
            "skip_if_running" => Ok(Self::SkipIfRunning),
            "serial" => Ok(Self::Serial),
            other => Err(crate::Error::Config(format!(
                "unknown overlap policy '{}'",
                other
            ))),
        }
    }
}

/// Scheduler section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub overlap_policy: OverlapPolicy,
    /// Period of the background reconciliation against the store; 0 disables it
    pub reconcile_interval_secs: u64,
}

/// Plugin bootstrap section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    /// Built-in plugins registered at startup
    pub auto_load: Vec<String>,
    /// Messages served by the `mock_email` connector
    pub mock_email_messages: Vec<serde_json::Value>,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            auto_load: vec![
                "mock_email".to_string(),
                "email".to_string(),
                "log".to_string(),
            ],
            mock_email_messages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub json: bool,
}

/// Typed runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub env: String,
    pub database_url: String,
    pub scheduler: SchedulerSettings,
    pub plugins: PluginSettings,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: "dev".to_string(),
            database_url: "sqlite://agentpilot.db".to_string(),
            scheduler: SchedulerSettings::default(),
            plugins: PluginSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Settings {
    /// Build settings from defaults, an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("plugins.auto_load"),
            )
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings)
    }
}
