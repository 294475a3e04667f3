// ── Runtime connection configuration ──
//
// These types describe *how* to talk to one device: endpoint, credentials,
// pacing, and the channel table. They never touch disk; `devlink-config`
// builds a `ConnectionConfig` and hands it in.

use std::time::Duration;

use devlink_api::StatusCode;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CommandError, ConfigurationError};

/// Default number of attempts a retrying command gets.
pub const MAX_RETRIES: u32 = 5;

/// Default bound on pending commands.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// How to authenticate with the device.
#[derive(Debug, Clone)]
pub enum AuthCredentials {
    /// Static API token sent as a header on login and on every request.
    ApiKey(SecretString),
    /// Form login with username and password; the session lives in cookies.
    Credentials {
        username: String,
        password: SecretString,
    },
}

/// External request budget the device vendor enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestQuota {
    /// Hard daily limit imposed by the remote service.
    pub max_requests_per_day: u64,
    /// Requests one status poll costs against that limit.
    #[serde(default = "default_requests_per_poll")]
    pub requests_per_poll: u64,
}

fn default_requests_per_poll() -> u64 {
    1
}

/// Constraint a written value must satisfy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationRule {
    /// Any value is accepted.
    #[default]
    Any,
    /// Decimal number within `min..=max`.
    Range { min: f64, max: f64 },
    /// Whole number within `min..=max`.
    IntegerRange { min: i64, max: i64 },
    /// One of a fixed set of literals.
    OneOf { values: Vec<String> },
}

impl ValidationRule {
    /// Check `value` for `channel`.
    pub fn validate(&self, channel: &str, value: &str) -> Result<(), CommandError> {
        let invalid = |reason: String| CommandError::Validation {
            channel: channel.to_owned(),
            value: value.to_owned(),
            reason,
        };

        match self {
            Self::Any => Ok(()),
            Self::Range { min, max } => {
                let parsed: f64 = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid("not a number".into()))?;
                if parsed.is_finite() && (*min..=*max).contains(&parsed) {
                    Ok(())
                } else {
                    Err(invalid(format!("must be between {min} and {max}")))
                }
            }
            Self::IntegerRange { min, max } => {
                let parsed: i64 = value
                    .trim()
                    .parse()
                    .map_err(|_| invalid("not an integer".into()))?;
                if (*min..=*max).contains(&parsed) {
                    Ok(())
                } else {
                    Err(invalid(format!("must be between {min} and {max}")))
                }
            }
            Self::OneOf { values } => {
                if values.iter().any(|v| v == value) {
                    Ok(())
                } else {
                    Err(invalid(format!("expected one of: {}", values.join(", "))))
                }
            }
        }
    }
}

/// One observable (and possibly writable) value on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Stable identifier used by callers and the channel sink.
    pub id: String,
    /// JSON pointer into the status response, e.g. `/overview/power`.
    pub pointer: String,
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub rule: ValidationRule,
    /// Form field name used when writing; defaults to `id`.
    #[serde(default)]
    pub parameter: Option<String>,
}

impl Channel {
    pub fn read_only(id: impl Into<String>, pointer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pointer: pointer.into(),
            writable: false,
            rule: ValidationRule::Any,
            parameter: None,
        }
    }

    pub fn writable(id: impl Into<String>, pointer: impl Into<String>, rule: ValidationRule) -> Self {
        Self {
            writable: true,
            rule,
            ..Self::read_only(id, pointer)
        }
    }

    pub fn parameter_name(&self) -> &str {
        self.parameter.as_deref().unwrap_or(&self.id)
    }
}

/// Configuration for one device connection.
///
/// Held by the executor behind an atomic swap; a new snapshot takes effect at
/// the next authentication attempt.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Device or cloud base URL (e.g., `https://inverter.local`).
    pub url: Url,
    pub auth: AuthCredentials,
    /// Path of the login endpoint, relative to `url`.
    pub login_path: String,
    /// Header carrying the API key for [`AuthCredentials::ApiKey`].
    pub api_key_header: String,
    /// Path polled by status polls.
    pub status_path: String,
    /// Path setting updates are posted to.
    pub write_path: String,
    /// Status code the device answers an accepted write with.
    pub write_accepted_status: u16,
    /// Response header carrying a session token, if the device uses one.
    pub session_header: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Fixed delay between executor ticks.
    pub tick_interval: Duration,
    /// Interval for the built-in status poll job. `None` disables it.
    pub poll_interval: Option<Duration>,
    pub queue_capacity: usize,
    pub max_retries: u32,
    pub quota: Option<RequestQuota>,
    pub channels: Vec<Channel>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("http://127.0.0.1/").expect("static URL is valid"),
            auth: AuthCredentials::Credentials {
                username: String::new(),
                password: SecretString::from(String::new()),
            },
            login_path: "/api/login".into(),
            api_key_header: "X-API-KEY".into(),
            status_path: "/api/status".into(),
            write_path: "/api/settings".into(),
            write_accepted_status: 302,
            session_header: None,
            timeout: Duration::from_secs(30),
            tick_interval: Duration::from_secs(5),
            poll_interval: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_retries: MAX_RETRIES,
            quota: None,
            channels: Vec::new(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(url: Url, auth: AuthCredentials) -> Self {
        Self {
            url,
            auth,
            ..Self::default()
        }
    }

    /// Resolve a path against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, ConfigurationError> {
        self.url
            .join(path)
            .map_err(|e| ConfigurationError::InvalidEndpoint {
                path: path.to_owned(),
                reason: e.to_string(),
            })
    }

    pub fn channel(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    /// The status an accepted write answers with; must be 2xx or 3xx.
    pub fn write_accepted(&self) -> Result<StatusCode, ConfigurationError> {
        StatusCode::from_u16(self.write_accepted_status)
            .ok()
            .filter(|code| code.is_success() || code.is_redirection())
            .ok_or(ConfigurationError::InvalidWriteStatus {
                code: self.write_accepted_status,
            })
    }
}
