//! CLI error types with miette diagnostics.
//!
//! Maps config and core errors into user-facing errors with actionable help
//! text.

use miette::Diagnostic;
use thiserror::Error;

use devlink_config::ConfigError;
use devlink_core::{CommandError, CoreError};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(devlink::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Config file: {path}"
        )
    )]
    ProfileNotFound {
        name: String,
        available: String,
        path: String,
    },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(devlink::no_credentials),
        help(
            "Set api_key_env or username/password in the profile,\n\
             store the secret in the system keyring under service 'devlink',\n\
             or export DEVLINK_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    #[error("Invalid configuration: {reason}")]
    #[diagnostic(
        code(devlink::configuration),
        help("Fix the profile and run: devlink check")
    )]
    Configuration { reason: String },

    #[error(transparent)]
    #[diagnostic(code(devlink::config))]
    Config(Box<ConfigError>),

    // ── Device ───────────────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(devlink::auth_failed),
        help("Verify the credentials for profile '{profile}'.")
    )]
    AuthFailed { profile: String, message: String },

    #[error("Could not reach the device: {reason}")]
    #[diagnostic(
        code(devlink::connection_failed),
        help("Check the profile URL, or use --insecure (-k) for self-signed certificates.")
    )]
    ConnectionFailed { reason: String },

    #[error("Channel '{channel}' not found")]
    #[diagnostic(code(devlink::unknown_channel), help("Known channels: {available}"))]
    UnknownChannel { channel: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(devlink::rejected))]
    Rejected(#[from] CommandError),

    #[error("Write to '{channel}' was not accepted: {reason}")]
    #[diagnostic(code(devlink::write_failed))]
    WriteFailed { channel: String, reason: String },

    #[error("Command queue is full")]
    #[diagnostic(code(devlink::queue_full))]
    QueueFull,

    // ── Timeout ──────────────────────────────────────────────────────

    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(devlink::timeout),
        help("Increase the wait with --wait or check device responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO ───────────────────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::ProfileNotFound { .. } | Self::UnknownChannel { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Configuration { .. } | Self::Rejected(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Configuration {
                reason: format!("{field}: {reason}"),
            },
            other => CliError::Config(Box::new(other)),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Configuration(e) => CliError::Configuration {
                reason: e.to_string(),
            },
            CoreError::Command(e) => CliError::Rejected(e),
            CoreError::UnknownChannel { id } => CliError::UnknownChannel {
                channel: id,
                available: String::new(),
            },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::ConnectionFailed { reason } | CoreError::Transport { message: reason } => {
                CliError::ConnectionFailed { reason }
            }
        }
    }
}
