// ── Communication status ──
//
// Outcome of one network attempt. Produced by the transport after every
// request, whether the device answered or the connection failed.

use std::fmt;
use std::sync::Arc;

use reqwest::StatusCode;

use crate::error::Error;

/// Sentinel code recorded when the request never produced an HTTP answer.
pub const INTERNAL_ERROR: StatusCode = StatusCode::INTERNAL_SERVER_ERROR;

/// Result of a single request attempt.
///
/// Immutable once built. Two statuses compare equal when their codes match;
/// the captured error does not participate in equality.
#[derive(Clone)]
pub struct CommunicationStatus {
    code: StatusCode,
    error: Option<Arc<Error>>,
}

impl CommunicationStatus {
    /// Status for a request the device answered.
    pub fn new(code: StatusCode) -> Self {
        Self { code, error: None }
    }

    /// Status for a request that failed below HTTP (connect, TLS, timeout).
    pub fn from_error(error: Error) -> Self {
        Self {
            code: INTERNAL_ERROR,
            error: Some(Arc::new(error)),
        }
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_deref()
    }

    /// `true` for a 2xx answer with no captured error.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.code.is_success()
    }

    /// Human-readable description of the outcome.
    ///
    /// Prefers the captured error's message, then the code's canonical
    /// reason phrase, then an empty string.
    pub fn message(&self) -> String {
        if let Some(error) = &self.error {
            return error.to_string();
        }
        self.code.canonical_reason().unwrap_or_default().to_owned()
    }
}

impl PartialEq for CommunicationStatus {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for CommunicationStatus {}

impl From<StatusCode> for CommunicationStatus {
    fn from(code: StatusCode) -> Self {
        Self::new(code)
    }
}

impl fmt::Debug for CommunicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommunicationStatus")
            .field("code", &self.code.as_u16())
            .field("error", &self.error.as_ref().map(ToString::to_string))
            .finish()
    }
}

impl fmt::Display for CommunicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.message();
        if message.is_empty() {
            write!(f, "{}", self.code.as_u16())
        } else {
            write!(f, "{} {message}", self.code.as_u16())
        }
    }
}
