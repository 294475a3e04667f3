// ── Command API ──
//
// A command is one unit of work for the executor: it builds its own request,
// interprets its own response, and decides whether it wants another attempt.
// The set is open -- vendors implement `Command` for their own operations;
// `Login`, `StatusPoll`, and `SettingUpdate` cover the common shapes.

mod login;
mod poll;
mod setting;

use std::fmt;

use devlink_api::{Request, Response};
use tracing::{debug, warn};
use url::Url;

use crate::error::CommandError;

pub use login::Login;
pub use poll::StatusPoll;
pub use setting::SettingUpdate;

/// What the executor should do with a command after it completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Finished: succeeded, failed terminally, or out of retries.
    Done,
    /// Put the command back at the tail of the queue.
    Retry,
}

/// A unit of work executed on the authenticated session.
///
/// A command is owned by the queue while pending and by the executor while
/// running, so `on_complete` can mutate retry bookkeeping without locking.
pub trait Command: Send + fmt::Debug {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    fn target_url(&self) -> &Url;

    /// Build the request from the captured arguments.
    ///
    /// Must be free of side effects. An `Err` is final: the command is
    /// dropped and never requeued.
    fn prepare_request(&self) -> Result<Request, CommandError>;

    /// Inspect the outcome of the attempt and decide what happens next.
    fn on_complete(&mut self, response: &Response) -> Completion;

    /// Failed attempts recorded so far.
    fn retry_count(&self) -> u32 {
        0
    }
}

/// Retry bookkeeping shared by the retrying commands.
///
/// A command that fails every attempt is tried exactly `max_retries` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounter {
    retry_count: u32,
    max_retries: u32,
}

impl RetryCounter {
    pub fn new(max_retries: u32) -> Self {
        Self {
            retry_count: 0,
            max_retries,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Record a failed attempt of `command` and decide whether to go again.
    pub fn record_failure(&mut self, command: &str, response: &Response) -> Completion {
        self.retry_count += 1;
        if self.retry_count < self.max_retries {
            debug!(
                command,
                attempt = self.retry_count,
                status = %response.status,
                "attempt failed, will retry"
            );
            Completion::Retry
        } else {
            warn!(
                command,
                attempts = self.retry_count,
                status = %response.status,
                "giving up after exhausting retries"
            );
            Completion::Done
        }
    }
}
