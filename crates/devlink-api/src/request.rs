// ── Request / response model ──
//
// Commands describe what they want to send with a `Request`; the transport
// answers with a `Response`. Both are plain data so commands stay
// side-effect free and fakes can inspect them in tests.

use std::fmt;

use reqwest::{Method, StatusCode};
use url::Url;

use crate::status::CommunicationStatus;

/// Request payload.
#[derive(Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Text(String),
}

impl fmt::Debug for Body {
    // Form bodies routinely carry passwords; only their field names are shown.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Json(_) => f.write_str("Json(..)"),
            Self::Form(fields) => f
                .debug_tuple("Form")
                .field(&fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>())
                .finish(),
            Self::Text(text) => write!(f, "Text({} bytes)", text.len()),
        }
    }
}

/// A single outgoing call.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Body,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_json(mut self, value: serde_json::Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub fn with_form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Body::Form(fields);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.body = Body::Text(text.into());
        self
    }

    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What came back from one [`Request`].
#[derive(Debug, Clone)]
pub struct Response {
    pub status: CommunicationStatus,
    pub body: Option<String>,
}

impl Response {
    pub fn new(status: CommunicationStatus, body: Option<String>) -> Self {
        Self { status, body }
    }

    /// A response with only a status code and no body.
    pub fn status_only(code: StatusCode) -> Self {
        Self {
            status: CommunicationStatus::new(code),
            body: None,
        }
    }

    pub fn code(&self) -> StatusCode {
        self.status.code()
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

impl From<CommunicationStatus> for Response {
    fn from(status: CommunicationStatus) -> Self {
        Self { status, body: None }
    }
}
