use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Defaults for `checkup run`, layered from `checkup.yaml`,
/// `.checkup.yaml` and `CHECKUP__*` environment variables. Command-line
/// flags win over all of them.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default)]
    pub verbosity: u8,
    /// Seconds; 0 keeps each scenario's own timeout.
    #[serde(default)]
    pub timeout: u64,
    /// `<format>=<path>` report spec.
    #[serde(default)]
    pub report: Option<String>,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub show_time: bool,
    #[serde(default)]
    pub show_target: bool,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            show_time: false,
            show_target: false,
            json: false,
        }
    }
}

fn default_shell() -> String {
    "bash".to_string()
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Load settings relative to the current directory.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_from(Path::new("."))
}

pub fn load_settings_from(dir: &Path) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        // Project defaults
        .add_source(File::from(dir.join("checkup.yaml")).required(false))
        // Local, usually untracked, overrides
        .add_source(File::from(dir.join(".checkup.yaml")).required(false))
        // Map nested env vars like CHECKUP__LOGGING__LEVEL=debug
        .add_source(Environment::with_prefix("CHECKUP").separator("__"));

    builder.build()?.try_deserialize()
}
