use devlink_api::{CommunicationStatus, Request, Response};
use secrecy::ExposeSecret;
use url::Url;

use super::{Command, Completion};
use crate::config::{AuthCredentials, ConnectionConfig};
use crate::error::{CommandError, ConfigurationError};

/// One login round trip.
///
/// - API key: `GET {login_path}` with the key in `api_key_header`.
/// - Credentials: `POST {login_path}` with a `username` / `password` form.
///
/// Never retries itself; a failed login is re-attempted by the executor on
/// its next tick.
#[derive(Debug)]
pub struct Login {
    url: Url,
    auth: AuthCredentials,
    api_key_header: String,
    outcome: Option<CommunicationStatus>,
}

impl Login {
    pub fn new(config: &ConnectionConfig) -> Result<Self, ConfigurationError> {
        Ok(Self {
            url: config.endpoint(&config.login_path)?,
            auth: config.auth.clone(),
            api_key_header: config.api_key_header.clone(),
            outcome: None,
        })
    }

    /// Status of the completed attempt, once there is one.
    pub fn outcome(&self) -> Option<&CommunicationStatus> {
        self.outcome.as_ref()
    }
}

impl Command for Login {
    fn name(&self) -> &'static str {
        "login"
    }

    fn target_url(&self) -> &Url {
        &self.url
    }

    fn prepare_request(&self) -> Result<Request, CommandError> {
        let request = match &self.auth {
            AuthCredentials::ApiKey(key) => Request::get(self.url.clone())
                .with_header(self.api_key_header.as_str(), key.expose_secret()),
            AuthCredentials::Credentials { username, password } => Request::post(self.url.clone())
                .with_form(vec![
                    ("username".into(), username.clone()),
                    ("password".into(), password.expose_secret().to_owned()),
                ]),
        };
        Ok(request)
    }

    fn on_complete(&mut self, response: &Response) -> Completion {
        self.outcome = Some(response.status.clone());
        Completion::Done
    }
}
