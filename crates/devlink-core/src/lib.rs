//! Single-flight command executor for session-based device endpoints.
//!
//! One [`WebInterface`] per device connection serializes all traffic onto a
//! single authenticated session:
//!
//! - **[`WebInterface`]** -- the executor. A fixed-delay tick either logs in
//!   (when the session is not authenticated) or runs exactly one queued
//!   command. Failed retryable commands go back to the tail of the queue.
//!
//! - **[`AuthenticationSession`]** -- session state plus the
//!   `precheck -> attempt -> interpret` transitions. Login outcomes are
//!   classified into five buckets and reported through a [`StatusSink`].
//!
//! - **[`Command`]** -- open trait for units of work. [`Login`],
//!   [`StatusPoll`], and [`SettingUpdate`] are the stock implementations.
//!
//! - **[`CommandQueue`]** -- bounded FIFO. A full queue drops the newest
//!   command and logs it; producers never block.
//!
//! The transport itself lives in `devlink-api`; loading configuration from
//! disk lives in `devlink-config`.

pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod queue;
pub mod session;
pub mod status;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{Command, Completion, Login, RetryCounter, SettingUpdate, StatusPoll};
pub use config::{
    AuthCredentials, Channel, ConnectionConfig, DEFAULT_QUEUE_CAPACITY, MAX_RETRIES, RequestQuota,
    ValidationRule,
};
pub use error::{CommandError, ConfigurationError, CoreError};
pub use executor::{TickOutcome, WebInterface};
pub use queue::CommandQueue;
pub use session::{AuthenticationSession, SessionState};
pub use status::{ChannelSink, LogSink, OnlineStatus, StatusDetail, StatusReport, StatusSink};
