// ── Executor ──
//
// `WebInterface` drives one device connection. A single tick, fired at a
// fixed delay, either authenticates or runs exactly one queued command, so
// at most one request is ever in flight on the session. The delay runs from
// the end of one tick to the start of the next, so a slow request stretches
// the schedule instead of letting ticks pile up. Producers only touch the
// queue; everything else belongs to whichever tick holds `tick_state`.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use devlink_api::{StatusCode, Transport};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::command::{Command, Completion, StatusPoll};
use crate::config::ConnectionConfig;
use crate::queue::CommandQueue;
use crate::session::{AuthenticationSession, SessionState};
use crate::status::{ChannelSink, StatusDetail, StatusReport, StatusSink};

const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still running.
    Skipped,
    /// Authenticated with nothing queued.
    Idle,
    /// The precheck failed; no request was sent.
    Misconfigured { reason: String },
    /// A login attempt succeeded.
    Authenticated,
    /// A login attempt failed and was classified as `detail`.
    AuthenticationFailed { detail: StatusDetail },
    /// One command ran; `requeued` when it went back to the tail.
    Executed { command: &'static str, requeued: bool },
    /// A command refused to build its request and was dropped.
    Rejected { command: &'static str, reason: String },
    /// The executor was disposed while the request was in flight.
    Discarded,
}

struct TickState {
    session: AuthenticationSession,
    /// Last report handed to the sink. Identical reports are not repeated
    /// unless the session changed state in between.
    last_report: Option<StatusReport>,
}

/// Single-flight command executor for one device connection.
///
/// Cheaply cloneable; clones share the same queue and session. Call
/// [`start()`](Self::start) to begin ticking and
/// [`dispose()`](Self::dispose) to stop. The background tasks hold a clone,
/// so a started executor lives until it is disposed.
#[derive(Clone)]
pub struct WebInterface {
    inner: Arc<Inner>,
}

struct Inner {
    config: ArcSwap<ConnectionConfig>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn StatusSink>,
    channel_sink: Option<Arc<dyn ChannelSink>>,
    queue: CommandQueue,
    tick_state: Mutex<TickState>,
    status: watch::Sender<StatusReport>,
    session_state: watch::Sender<SessionState>,
    cancel: CancellationToken,
    /// Child token for the current run: cancelled on dispose, replaced on start.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WebInterface {
    /// Build an executor. Does NOT start ticking.
    ///
    /// The queue capacity is fixed here; later config updates do not resize it.
    pub fn new(config: ConnectionConfig, transport: Arc<dyn Transport>, sink: Arc<dyn StatusSink>) -> Self {
        Self::build(config, transport, sink, None)
    }

    /// Build an executor whose status polls publish to `channel_sink`.
    ///
    /// Required for the periodic poll job.
    pub fn with_channel_sink(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn StatusSink>,
        channel_sink: Arc<dyn ChannelSink>,
    ) -> Self {
        Self::build(config, transport, sink, Some(channel_sink))
    }

    fn build(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn StatusSink>,
        channel_sink: Option<Arc<dyn ChannelSink>>,
    ) -> Self {
        let config = Arc::new(config);
        let queue = CommandQueue::new(config.queue_capacity);
        let (status, _) = watch::channel(StatusReport::unknown());
        let (session_state, _) = watch::channel(SessionState::Unauthenticated);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(Inner {
                config: ArcSwap::new(Arc::clone(&config)),
                transport,
                sink,
                channel_sink,
                queue,
                tick_state: Mutex::new(TickState {
                    session: AuthenticationSession::new(config),
                    last_report: None,
                }),
                status,
                session_state,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    // ── Producer API ─────────────────────────────────────────────

    /// Queue a command for execution.
    ///
    /// Returns `false` if the queue was full and the command was dropped.
    pub fn enqueue_command<C: Command + 'static>(&self, command: C) -> bool {
        self.enqueue_boxed(Box::new(command))
    }

    pub fn enqueue_boxed(&self, command: Box<dyn Command>) -> bool {
        self.inner.queue.enqueue(command)
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    // ── Configuration & observation ──────────────────────────────

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<ConnectionConfig> {
        self.inner.config.load_full()
    }

    /// Replace the configuration. Picked up before the next authentication
    /// attempt and by the next scheduled poll.
    pub fn update_config(&self, config: ConnectionConfig) {
        self.inner.config.store(Arc::new(config));
        debug!("connection config updated");
    }

    pub fn channel_sink(&self) -> Option<Arc<dyn ChannelSink>> {
        self.inner.channel_sink.clone()
    }

    /// Subscribe to the latest device status.
    pub fn status(&self) -> watch::Receiver<StatusReport> {
        self.inner.status.subscribe()
    }

    /// Subscribe to session state changes.
    pub fn session_state(&self) -> watch::Receiver<SessionState> {
        self.inner.session_state.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start the tick loop (and the poll job, if configured).
    ///
    /// The first tick fires immediately. Calling `start` on a running
    /// executor does nothing.
    pub async fn start(&self) {
        let mut handles = self.inner.task_handles.lock().await;
        if !handles.is_empty() {
            warn!("executor already started");
            return;
        }

        let child = self.inner.cancel.child_token();
        *self.inner.cancel_child.lock().await = child.clone();

        let config = self.config();
        let tick_interval = config.tick_interval.max(MIN_TICK_INTERVAL);
        handles.push(tokio::spawn(tick_task(self.clone(), tick_interval, child.clone())));

        match (config.poll_interval, self.inner.channel_sink.clone()) {
            (Some(every), Some(sink)) => {
                let every = every.max(MIN_TICK_INTERVAL);
                handles.push(tokio::spawn(poll_task(self.clone(), sink, every, child)));
            }
            (Some(_), None) => warn!("poll interval configured without a channel sink, poll job disabled"),
            _ => {}
        }

        info!(
            url = %config.url,
            tick_ms = u64::try_from(tick_interval.as_millis()).unwrap_or(u64::MAX),
            "executor started"
        );
    }

    /// Stop ticking and drop all pending work.
    ///
    /// A request already in flight is allowed to finish; its result is
    /// discarded. The executor can be started again afterwards.
    pub async fn dispose(&self) {
        // Cancel the child token (not the parent) so `start` can run again.
        self.inner.cancel_child.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "executor task ended abnormally");
            }
        }
        drop(handles);

        let dropped = self.inner.queue.clear();
        let mut state = self.inner.tick_state.lock().await;
        state.session.invalidate();
        state.last_report = None;
        drop(state);

        self.inner.transport.reset_session();
        self.inner.session_state.send_replace(SessionState::Unauthenticated);
        debug!(dropped, "executor disposed");
    }

    // ── Tick ─────────────────────────────────────────────────────

    /// Run one tick now.
    ///
    /// Normally driven by the tick loop; exposed for callers that schedule
    /// ticks themselves. Never overlaps with another tick.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(mut state) = self.inner.tick_state.try_lock() else {
            trace!("tick already running, skipping");
            return TickOutcome::Skipped;
        };
        let cancel = self.inner.cancel_child.lock().await.clone();
        if cancel.is_cancelled() {
            return TickOutcome::Discarded;
        }

        if state.session.is_authenticated() {
            self.execute_next(&mut state, &cancel).await
        } else {
            self.authenticate(&mut state, &cancel).await
        }
    }

    async fn authenticate(&self, state: &mut TickState, cancel: &CancellationToken) -> TickOutcome {
        state.session.refresh_config(self.inner.config.load_full());

        if let Err(e) = state.session.precheck() {
            debug!(error = %e, "precheck failed, not attempting login");
            self.report(state, StatusReport::configuration_error(e.to_string()));
            return TickOutcome::Misconfigured {
                reason: e.to_string(),
            };
        }

        self.inner.session_state.send_replace(SessionState::Authenticating);
        let status = match state.session.attempt(self.inner.transport.as_ref()).await {
            Ok(status) => status,
            Err(e) => {
                state.session.invalidate();
                self.inner.session_state.send_replace(SessionState::Unauthenticated);
                let reason = e.to_string();
                self.report(state, StatusReport::configuration_error(reason.clone()));
                return TickOutcome::Misconfigured { reason };
            }
        };

        if cancel.is_cancelled() {
            debug!("executor disposed during login, discarding result");
            state.session.invalidate();
            self.inner.session_state.send_replace(SessionState::Unauthenticated);
            return TickOutcome::Discarded;
        }

        let report = state.session.interpret(&status);
        let detail = report.detail;
        self.inner.session_state.send_replace(state.session.state());
        if state.session.is_authenticated() {
            self.report_transition(state, report);
        } else {
            self.report(state, report);
        }

        if state.session.is_authenticated() {
            TickOutcome::Authenticated
        } else {
            debug!(status = %status, %detail, "login failed, retrying next tick");
            TickOutcome::AuthenticationFailed { detail }
        }
    }

    async fn execute_next(&self, state: &mut TickState, cancel: &CancellationToken) -> TickOutcome {
        let Some(mut command) = self.inner.queue.poll() else {
            return TickOutcome::Idle;
        };
        let name = command.name();

        let request = match command.prepare_request() {
            Ok(request) => request,
            Err(e) => {
                warn!(command = name, error = %e, "command rejected");
                return TickOutcome::Rejected {
                    command: name,
                    reason: e.to_string(),
                };
            }
        };

        let timeout = self.inner.config.load().timeout;
        trace!(command = name, url = %command.target_url(), attempt = command.retry_count() + 1, "executing");
        let response = self.inner.transport.send(request, timeout).await;

        if cancel.is_cancelled() {
            debug!(command = name, "executor disposed during request, discarding result");
            return TickOutcome::Discarded;
        }

        if response.code() == StatusCode::UNAUTHORIZED && response.status.error().is_none() {
            info!(command = name, "session expired, re-authenticating on next tick");
            self.expire_session(state);
        }

        let requeued = match command.on_complete(&response) {
            Completion::Done => false,
            Completion::Retry => self.inner.queue.enqueue(command),
        };
        TickOutcome::Executed {
            command: name,
            requeued,
        }
    }

    fn expire_session(&self, state: &mut TickState) {
        state.session.invalidate();
        self.inner.transport.reset_session();
        self.inner.session_state.send_replace(SessionState::Unauthenticated);
        self.report_transition(state, StatusReport::communication_error("session expired"));
    }

    /// Report a change of session state; never swallowed by de-duplication.
    fn report_transition(&self, state: &mut TickState, report: StatusReport) {
        state.last_report = None;
        self.report(state, report);
    }

    fn report(&self, state: &mut TickState, report: StatusReport) {
        if state.last_report.as_ref() == Some(&report) {
            trace!(status = %report.status, "status unchanged, not notifying");
            return;
        }
        self.inner
            .sink
            .update(report.status, report.detail, report.message.as_deref());
        self.inner.status.send_replace(report.clone());
        state.last_report = Some(report);
    }
}

impl std::fmt::Debug for WebInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebInterface")
            .field("url", &self.inner.config.load().url.as_str())
            .field("queue", &self.inner.queue)
            .finish_non_exhaustive()
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Fixed-delay tick loop: the first tick runs at once, each later one
/// `every` after the previous tick finished.
async fn tick_task(executor: WebInterface, every: Duration, cancel: CancellationToken) {
    loop {
        let outcome = executor.tick().await;
        trace!(?outcome, "tick finished");

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(every) => {}
        }
    }
}

/// Enqueue a status poll of every channel each interval.
async fn poll_task(
    executor: WebInterface,
    sink: Arc<dyn ChannelSink>,
    every: Duration,
    cancel: CancellationToken,
) {
    loop {
        let config = executor.config();
        match StatusPoll::from_config(&config, Arc::clone(&sink)) {
            Ok(poll) => {
                executor.enqueue_command(poll);
            }
            Err(e) => warn!(error = %e, "cannot build status poll"),
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(every) => {}
        }
    }
}
