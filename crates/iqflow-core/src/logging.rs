//! # Structured Logging
//!
//! Logging setup via the `tracing` ecosystem. Library code emits events
//! through `tracing` macros; applications call [`init_logging`] once at
//! startup. The `IQFLOW_LOG` environment variable overrides the configured
//! level with a full `EnvFilter` directive string.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, one line per event.
    #[default]
    Compact,
    /// Multi-line with fields broken out.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

/// Install the global subscriber. Safe to call more than once; subsequent
/// calls are no-ops (the first subscriber wins).
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_env("IQFLOW_LOG")
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };

    if result.is_err() {
        tracing::debug!("global subscriber already installed");
    }
}
