use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaggerConfig {
    /// Master switch; when off the interceptors pass calls straight through
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub interceptor: InterceptorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Regex patterns matched against the short record kind; empty tracks everything
    #[serde(default)]
    pub tracked_kinds: Vec<String>,
    /// Extra line after a completed create or update
    #[serde(default = "default_confirmation_lines")]
    pub confirmation_lines: bool,
    #[serde(default)]
    pub event_level: EventLevel,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InterceptorConfig {
    #[serde(default = "default_log_errors")]
    pub log_errors: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Trace,
    Debug,
    #[default]
    Info,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

// Default value functions
fn default_enabled() -> bool {
    true
}

fn default_confirmation_lines() -> bool {
    true
}

fn default_log_errors() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            listener: ListenerConfig::default(),
            interceptor: InterceptorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            tracked_kinds: Vec::new(),
            confirmation_lines: default_confirmation_lines(),
            event_level: EventLevel::default(),
        }
    }
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            log_errors: default_log_errors(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl TaggerConfig {
    /// Whether lifecycle notifications should be turned into diagnostic lines
    pub fn listener_active(&self) -> bool {
        self.enabled && self.listener.enabled
    }
}
