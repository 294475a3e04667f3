use thiserror::Error;

/// Top-level error type for the `devlink-api` crate.
///
/// These never escape a [`Transport::send`](crate::Transport::send) call as a
/// `Result` -- the transport folds them into a
/// [`CommunicationStatus`](crate::CommunicationStatus). They surface as
/// `Err` only while building a transport.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Request construction ────────────────────────────────────────
    /// A header name or value could not be encoded.
    #[error("Invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
}
