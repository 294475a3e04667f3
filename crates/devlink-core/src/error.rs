// ── Core error types ──
//
// Three families with different propagation rules:
// - `ConfigurationError` -- static, found by the session precheck; reaches
//   the status sink as CONFIGURATION_ERROR.
// - `CommandError` -- a command refusing to build its request; logged where
//   the command is executed, never escalated.
// - `CoreError` -- everything a caller of the public API can get back.

use thiserror::Error;

/// Static configuration problem detected before any network round trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("{field} is missing")]
    MissingCredential { field: &'static str },

    #[error("{field} must be between {min} and {max} characters, got {actual}")]
    CredentialLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error(
        "polling every {interval_secs}s issues {per_day} requests per day, above the limit of {limit}"
    )]
    RequestRateExceeded {
        interval_secs: u64,
        per_day: u64,
        limit: u64,
    },

    #[error("poll interval must be at least one second")]
    PollIntervalTooShort,

    #[error("invalid endpoint '{path}': {reason}")]
    InvalidEndpoint { path: String, reason: String },

    #[error("write accepted status {code} is not a success or redirect code")]
    InvalidWriteStatus { code: u16 },
}

/// A command could not turn its arguments into a request.
///
/// Never retryable: sending the same command again cannot succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("invalid value '{value}' for channel {channel}: {reason}")]
    Validation {
        channel: String,
        value: String,
        reason: String,
    },

    #[error("operation not supported: {operation}")]
    UnsupportedOperation { operation: String },
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Command rejected: {0}")]
    Command(#[from] CommandError),

    #[error("Unknown channel: {id}")]
    UnknownChannel { id: String },

    #[error("Transport setup failed: {message}")]
    Transport { message: String },

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<devlink_api::Error> for CoreError {
    fn from(err: devlink_api::Error) -> Self {
        match err {
            devlink_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            devlink_api::Error::Transport(ref e) if e.is_connect() => CoreError::ConnectionFailed {
                reason: e.to_string(),
            },
            other => CoreError::Transport {
                message: other.to_string(),
            },
        }
    }
}
