// ── Transport ──
//
// The executor talks to the network through the `Transport` trait: one
// request in, one `Response` out, never an `Err`. `HttpTransport` is the
// reqwest implementation. It owns a cookie jar and, when configured, a
// session token header captured from responses and replayed on requests.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, trace};

use crate::error::Error;
use crate::request::{Body, Request, Response};
use crate::status::CommunicationStatus;

/// Sends one request and reports its outcome.
///
/// Implementations must not return until the request has completed or
/// `timeout` has elapsed. Failures below HTTP are folded into the returned
/// status via [`CommunicationStatus::from_error`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request, timeout: Duration) -> Response;

    /// Drop any session state the transport carries between requests.
    ///
    /// Called when the executor's session is invalidated.
    fn reset_session(&self) {}
}

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (for self-signed devices).
    DangerAcceptInvalid,
}

/// Settings for building an [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Upper bound for a single request; individual sends may pass a shorter one.
    pub timeout: Duration,
    /// Response header whose value is replayed on every later request.
    pub session_header: Option<String>,
    /// Headers attached to every request (e.g. an API key).
    pub default_headers: HeaderMap,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
            session_header: None,
            default_headers: HeaderMap::new(),
        }
    }
}

impl TransportConfig {
    /// Add a sensitive default header, e.g. `X-API-KEY`.
    pub fn with_secret_header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        let name = parse_header_name(name)?;
        let mut value = HeaderValue::from_str(value).map_err(|e| Error::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        value.set_sensitive(true);
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Build a `reqwest::Client` with the given cookie jar.
    ///
    /// Redirects are never followed: a 3xx is an answer the caller classifies.
    fn build_client(&self, jar: &Arc<Jar>) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("devlink/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .cookie_provider(Arc::clone(jar))
            .default_headers(self.default_headers.clone());

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    http: reqwest::Client,
    session_header: Option<HeaderName>,
    /// Last token seen in `session_header`; replayed on every request.
    session_token: RwLock<Option<HeaderValue>>,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, Error> {
        let jar = Arc::new(Jar::default());
        let http = config.build_client(&jar)?;
        let session_header = config
            .session_header
            .as_deref()
            .map(parse_header_name)
            .transpose()?;
        Ok(Self {
            http,
            session_header,
            session_token: RwLock::new(None),
        })
    }

    /// The currently captured session token, if any.
    pub fn session_token(&self) -> Option<String> {
        self.session_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    }

    /// Forget the captured session token.
    pub fn clear_session(&self) {
        *self
            .session_token
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn capture_token(&self, headers: &HeaderMap) {
        let Some(name) = &self.session_header else {
            return;
        };
        if let Some(value) = headers.get(name) {
            trace!(header = %name, "session token captured");
            *self
                .session_token
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(value.clone());
        }
    }

    fn build(&self, request: Request, timeout: Duration) -> Result<reqwest::RequestBuilder, Error> {
        let mut builder = self
            .http
            .request(request.method, request.url)
            .timeout(timeout);

        if let Some(name) = &self.session_header {
            let guard = self
                .session_token
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(token) = guard.as_ref() {
                builder = builder.header(name.clone(), token.clone());
            }
        }

        for (name, value) in &request.headers {
            let name = parse_header_name(name)?;
            let value = HeaderValue::from_str(value).map_err(|e| Error::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            builder = builder.header(name, value);
        }

        builder = match request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(&value),
            Body::Form(fields) => builder.form(&fields),
            Body::Text(text) => builder.body(text),
        };
        Ok(builder)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request, timeout: Duration) -> Response {
        debug!(method = %request.method, url = %request.url, "sending request");

        let builder = match self.build(request, timeout) {
            Ok(builder) => builder,
            Err(e) => return CommunicationStatus::from_error(e).into(),
        };

        match builder.send().await {
            Ok(resp) => {
                let code = resp.status();
                self.capture_token(resp.headers());
                let body = match resp.text().await {
                    Ok(text) if !text.is_empty() => Some(text),
                    Ok(_) => None,
                    Err(e) => {
                        debug!(error = %e, "failed to read response body");
                        None
                    }
                };
                trace!(status = code.as_u16(), "response received");
                Response::new(CommunicationStatus::new(code), body)
            }
            Err(e) if e.is_timeout() => {
                debug!(timeout_secs = timeout.as_secs(), "request timed out");
                CommunicationStatus::from_error(Error::Timeout {
                    timeout_secs: timeout.as_secs(),
                })
                .into()
            }
            Err(e) => {
                debug!(error = %e, "request failed");
                CommunicationStatus::from_error(Error::Transport(e)).into()
            }
        }
    }

    fn reset_session(&self) {
        self.clear_session();
    }
}

fn parse_header_name(name: &str) -> Result<HeaderName, Error> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::InvalidHeader {
        name: name.to_owned(),
        reason: e.to_string(),
    })
}
