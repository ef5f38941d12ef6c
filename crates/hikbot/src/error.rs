//! Binary error types with miette diagnostics.
//!
//! Maps config and engine errors into user-facing errors with help text.

use hikbot_config::ConfigError;
use hikbot_core::CoreError;
use miette::Diagnostic;
use thiserror::Error;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum BotError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration file not found")]
    #[diagnostic(
        code(hikbot::no_config),
        help(
            "Create one with: hikbot init-config\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(code(hikbot::config_exists), help("Use --force to overwrite it."))]
    ConfigExists { path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(
        code(hikbot::validation),
        help("Fix the config file, then run: hikbot check-config")
    )]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(hikbot::config))]
    Config(ConfigError),

    // ── Runtime ──────────────────────────────────────────────────────

    #[error("Could not reach the Telegram Bot API: {message}")]
    #[diagnostic(
        code(hikbot::telegram),
        help("Check telegram.token and network access to telegram.api_url.")
    )]
    Telegram { message: String },

    #[error("Camera setup failed: {0}")]
    #[diagnostic(code(hikbot::camera))]
    Camera(#[from] CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for BotError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => Self::NoConfig {
                path: path.display().to_string(),
            },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

impl BotError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NoConfig { .. } | Self::ConfigExists { .. } | Self::Validation { .. } => {
                exit_code::USAGE
            }
            Self::Telegram { .. } => exit_code::CONNECTION,
            _ => exit_code::GENERAL,
        }
    }
}
