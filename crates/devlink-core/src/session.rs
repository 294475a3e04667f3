// ── Authentication session ──
//
// Owned by the executor's tick and never shared: the tick lock already
// guarantees exclusive access, so the session itself carries no locking.
// Every transition goes through `precheck -> attempt -> interpret`.

use std::sync::Arc;

use devlink_api::{CommunicationStatus, StatusCode, Transport};
use secrecy::ExposeSecret;
use strum::Display;
use tracing::{debug, info};

use crate::command::{Command, Login};
use crate::config::{AuthCredentials, ConnectionConfig};
use crate::error::{ConfigurationError, CoreError};
use crate::status::StatusReport;

const API_KEY_LEN: (usize, usize) = (16, 128);
const USERNAME_MAX_LEN: usize = 128;
const PASSWORD_LEN: (usize, usize) = (4, 128);
const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

#[derive(Debug)]
pub struct AuthenticationSession {
    state: SessionState,
    config: Arc<ConnectionConfig>,
}

impl AuthenticationSession {
    pub fn new(config: Arc<ConnectionConfig>) -> Self {
        Self {
            state: SessionState::Unauthenticated,
            config,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Swap in a fresh configuration snapshot. Takes effect at the next
    /// `precheck`.
    pub fn refresh_config(&mut self, config: Arc<ConnectionConfig>) {
        self.config = config;
    }

    /// Forget the authenticated state; the next tick logs in again.
    pub fn invalidate(&mut self) {
        if self.state != SessionState::Unauthenticated {
            debug!(from = %self.state, "session invalidated");
        }
        self.state = SessionState::Unauthenticated;
    }

    /// Validate the static configuration. Pure: no I/O, no state change.
    pub fn precheck(&self) -> Result<(), ConfigurationError> {
        check_credentials(&self.config.auth)?;
        check_request_rate(&self.config)?;
        self.config.endpoint(&self.config.login_path)?;
        self.config.write_accepted()?;
        Ok(())
    }

    /// Perform exactly one login round trip.
    ///
    /// Leaves the session `Authenticating`; [`interpret`](Self::interpret)
    /// settles it.
    pub async fn attempt(&mut self, transport: &dyn Transport) -> Result<CommunicationStatus, CoreError> {
        let mut login = Login::new(&self.config)?;
        let request = login.prepare_request()?;

        self.state = SessionState::Authenticating;
        debug!(url = %login.target_url(), "authenticating");
        let response = transport.send(request, self.config.timeout).await;
        login.on_complete(&response);

        Ok(login
            .outcome()
            .cloned()
            .unwrap_or_else(|| CommunicationStatus::new(response.code())))
    }

    /// Settle the session from a login outcome and say what to report.
    pub fn interpret(&mut self, status: &CommunicationStatus) -> StatusReport {
        let (state, report) = classify(status);
        if state == SessionState::Authenticated && self.state != SessionState::Authenticated {
            info!(url = %self.config.url, "authenticated");
        }
        self.state = state;
        report
    }
}

/// Map a login outcome onto the session state and the report for it.
///
/// Every outcome lands in exactly one bucket; unrecognized codes are
/// communication errors.
pub fn classify(status: &CommunicationStatus) -> (SessionState, StatusReport) {
    let code = status.code();
    if status.error().is_none() && code.is_success() {
        return (SessionState::Authenticated, StatusReport::online());
    }

    let report = if status.error().is_some() {
        StatusReport::communication_error(status.message())
    } else if code.is_redirection() || code == StatusCode::UNAUTHORIZED {
        StatusReport::configuration_error("invalid credential")
    } else if code == StatusCode::FORBIDDEN {
        StatusReport::configuration_error("invalid identifier")
    } else if code == StatusCode::SERVICE_UNAVAILABLE {
        StatusReport::bridge_offline(Some(status.message()))
    } else {
        StatusReport::communication_error(status.message())
    };
    (SessionState::Unauthenticated, report)
}

fn check_credentials(auth: &AuthCredentials) -> Result<(), ConfigurationError> {
    match auth {
        AuthCredentials::ApiKey(key) => {
            check_length("api key", key.expose_secret(), API_KEY_LEN.0, API_KEY_LEN.1)
        }
        AuthCredentials::Credentials { username, password } => {
            check_length("username", username, 1, USERNAME_MAX_LEN)?;
            check_length("password", password.expose_secret(), PASSWORD_LEN.0, PASSWORD_LEN.1)
        }
    }
}

fn check_length(field: &'static str, value: &str, min: usize, max: usize) -> Result<(), ConfigurationError> {
    let actual = value.chars().count();
    if actual == 0 {
        return Err(ConfigurationError::MissingCredential { field });
    }
    if actual < min || actual > max {
        return Err(ConfigurationError::CredentialLength {
            field,
            min,
            max,
            actual,
        });
    }
    Ok(())
}

fn check_request_rate(config: &ConnectionConfig) -> Result<(), ConfigurationError> {
    let (Some(quota), Some(interval)) = (config.quota, config.poll_interval) else {
        return Ok(());
    };
    let interval_secs = interval.as_secs();
    if interval_secs == 0 {
        return Err(ConfigurationError::PollIntervalTooShort);
    }
    let per_day = SECONDS_PER_DAY
        .div_ceil(interval_secs)
        .saturating_mul(quota.requests_per_poll);
    if per_day > quota.max_requests_per_day {
        return Err(ConfigurationError::RequestRateExceeded {
            interval_secs,
            per_day,
            limit: quota.max_requests_per_day,
        });
    }
    Ok(())
}
