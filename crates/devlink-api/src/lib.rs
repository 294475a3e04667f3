//! Transport layer for `devlink`.
//!
//! Everything here is about moving one request over the wire and reporting
//! what happened. Nothing in this crate knows about sessions, queues, or
//! retries -- those live in `devlink-core`.
//!
//! - **[`Request`]** / **[`Body`]** -- transport-neutral description of an
//!   outgoing call, built by commands.
//! - **[`CommunicationStatus`]** -- outcome of a single attempt: a status code
//!   plus an optional captured error.
//! - **[`Transport`]** -- the seam the executor talks to. [`HttpTransport`] is
//!   the reqwest-backed implementation; tests substitute scripted fakes.

pub mod error;
pub mod request;
pub mod status;
pub mod transport;

pub use error::Error;
pub use request::{Body, Request, Response};
pub use status::{CommunicationStatus, INTERNAL_ERROR};
pub use transport::{HttpTransport, TlsMode, Transport, TransportConfig};

pub use reqwest::{Method, StatusCode};
