#![allow(clippy::unwrap_used)]
// Executor behaviour against a scripted in-memory transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use tokio::sync::Notify;
use tokio::time::Instant;
use url::Url;

use devlink_api::{CommunicationStatus, Request, Response, StatusCode, Transport};
use devlink_core::{
    AuthCredentials, Channel, ChannelSink, Command, CommandError, Completion, ConnectionConfig,
    OnlineStatus, RetryCounter, SessionState, SettingUpdate, StatusDetail, StatusPoll,
    StatusReport, StatusSink, TickOutcome, WebInterface,
};

// ── Helpers ─────────────────────────────────────────────────────────

/// Answers from a script, then with `fallback`. Tracks overlap.
struct ScriptedTransport {
    script: Mutex<VecDeque<Response>>,
    fallback: StatusCode,
    delay: Duration,
    gate: Option<Arc<Notify>>,
    paths: Mutex<Vec<String>>,
    /// Start and end of every send.
    spans: Mutex<Vec<(Instant, Instant)>>,
    sends: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    fn new(codes: &[u16]) -> Self {
        Self {
            script: Mutex::new(
                codes
                    .iter()
                    .map(|c| Response::status_only(StatusCode::from_u16(*c).unwrap()))
                    .collect(),
            ),
            fallback: StatusCode::OK,
            delay: Duration::ZERO,
            gate: None,
            paths: Mutex::new(Vec::new()),
            spans: Mutex::new(Vec::new()),
            sends: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn with_fallback(mut self, code: StatusCode) -> Self {
        self.fallback = code;
        self
    }

    fn then_body(self, code: u16, body: &str) -> Self {
        self.script.lock().unwrap().push_back(Response::new(
            CommunicationStatus::new(StatusCode::from_u16(code).unwrap()),
            Some(body.to_owned()),
        ));
        self
    }

    fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: Request, _timeout: Duration) -> Response {
        let started = Instant::now();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.paths.lock().unwrap().push(request.url.path().to_owned());

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Response::status_only(self.fallback));
        self.spans.lock().unwrap().push((started, Instant::now()));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

#[derive(Default)]
struct RecordingSink(Mutex<Vec<StatusReport>>);

impl RecordingSink {
    fn reports(&self) -> Vec<StatusReport> {
        self.0.lock().unwrap().clone()
    }
}

impl StatusSink for RecordingSink {
    fn update(&self, status: OnlineStatus, detail: StatusDetail, message: Option<&str>) {
        self.0.lock().unwrap().push(StatusReport {
            status,
            detail,
            message: message.map(String::from),
        });
    }
}

#[derive(Default)]
struct ChannelRecorder(Mutex<Vec<(String, serde_json::Value)>>);

impl ChannelSink for ChannelRecorder {
    fn publish(&self, channel: &str, value: &serde_json::Value) {
        self.0
            .lock()
            .unwrap()
            .push((channel.to_owned(), value.clone()));
    }
}

/// Command that logs each completion under its tag and retries until 200.
#[derive(Debug)]
struct Probe {
    tag: &'static str,
    url: Url,
    log: Arc<Mutex<Vec<&'static str>>>,
    retry: RetryCounter,
}

impl Probe {
    fn new(tag: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, max_retries: u32) -> Self {
        Self {
            tag,
            url: Url::parse(&format!("http://device.local/probe/{tag}")).unwrap(),
            log: Arc::clone(log),
            retry: RetryCounter::new(max_retries),
        }
    }
}

impl Command for Probe {
    fn name(&self) -> &'static str {
        self.tag
    }

    fn target_url(&self) -> &Url {
        &self.url
    }

    fn prepare_request(&self) -> Result<Request, CommandError> {
        Ok(Request::get(self.url.clone()))
    }

    fn on_complete(&mut self, response: &Response) -> Completion {
        self.log.lock().unwrap().push(self.tag);
        if response.code() == StatusCode::OK {
            Completion::Done
        } else {
            self.retry.record_failure(self.tag, response)
        }
    }

    fn retry_count(&self) -> u32 {
        self.retry.retry_count()
    }
}

fn config_with(auth: AuthCredentials) -> ConnectionConfig {
    let mut config = ConnectionConfig::new(Url::parse("http://device.local/").unwrap(), auth);
    config.tick_interval = Duration::from_millis(10);
    config.timeout = Duration::from_secs(1);
    config
}

fn config() -> ConnectionConfig {
    config_with(AuthCredentials::ApiKey(SecretString::from(
        "0123456789abcdef".to_owned(),
    )))
}

fn executor(
    config: ConnectionConfig,
    transport: &Arc<ScriptedTransport>,
    sink: &Arc<RecordingSink>,
) -> WebInterface {
    WebInterface::new(config, transport.clone(), sink.clone())
}

// ── Ordering and retry ──────────────────────────────────────────────

#[tokio::test]
async fn test_retried_command_moves_behind_pending_ones() {
    let transport = Arc::new(ScriptedTransport::new(&[200, 500, 200, 200]));
    let sink = Arc::new(RecordingSink::default());
    let exec = executor(config(), &transport, &sink);
    let log = Arc::new(Mutex::new(Vec::new()));

    assert!(exec.enqueue_command(Probe::new("c1", &log, 5)));
    assert!(exec.enqueue_command(Probe::new("c2", &log, 5)));

    assert_eq!(exec.tick().await, TickOutcome::Authenticated);
    assert_eq!(
        exec.tick().await,
        TickOutcome::Executed {
            command: "c1",
            requeued: true
        }
    );
    assert_eq!(
        exec.tick().await,
        TickOutcome::Executed {
            command: "c2",
            requeued: false
        }
    );
    assert_eq!(
        exec.tick().await,
        TickOutcome::Executed {
            command: "c1",
            requeued: false
        }
    );
    assert_eq!(exec.tick().await, TickOutcome::Idle);

    assert_eq!(*log.lock().unwrap(), vec!["c1", "c2", "c1"]);
    assert_eq!(
        transport.paths(),
        vec!["/api/login", "/probe/c1", "/probe/c2", "/probe/c1"]
    );
}

#[tokio::test]
async fn test_failing_command_is_attempted_exactly_max_retries_times() {
    let transport =
        Arc::new(ScriptedTransport::new(&[200]).with_fallback(StatusCode::BAD_GATEWAY));
    let sink = Arc::new(RecordingSink::default());
    let exec = executor(config(), &transport, &sink);
    let log = Arc::new(Mutex::new(Vec::new()));

    exec.enqueue_command(Probe::new("flaky", &log, 3));

    let mut outcomes = Vec::new();
    loop {
        let outcome = exec.tick().await;
        if outcome == TickOutcome::Idle {
            break;
        }
        outcomes.push(outcome);
        assert!(outcomes.len() < 10, "executor never went idle");
    }

    assert_eq!(log.lock().unwrap().len(), 3);
    assert_eq!(transport.sends(), 4);
    assert_eq!(
        outcomes.last(),
        Some(&TickOutcome::Executed {
            command: "flaky",
            requeued: false
        })
    );
    // Command failures never reach the device status.
    assert_eq!(sink.reports(), vec![StatusReport::online()]);
}

#[tokio::test]
async fn test_full_queue_drops_newest() {
    let transport = Arc::new(ScriptedTransport::new(&[]));
    let sink = Arc::new(RecordingSink::default());
    let mut cfg = config();
    cfg.queue_capacity = 3;
    let exec = executor(cfg, &transport, &sink);
    let log = Arc::new(Mutex::new(Vec::new()));

    assert!(exec.enqueue_command(Probe::new("a", &log, 1)));
    assert!(exec.enqueue_command(Probe::new("b", &log, 1)));
    assert!(exec.enqueue_command(Probe::new("c", &log, 1)));
    assert!(!exec.enqueue_command(Probe::new("d", &log, 1)));
    assert_eq!(exec.queue_len(), 3);

    exec.tick().await;
    while exec.tick().await != TickOutcome::Idle {}
    assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
}

// ── Authentication ──────────────────────────────────────────────────

#[tokio::test]
async fn test_login_outcomes_map_to_reports() {
    let cases = [
        (200, SessionState::Authenticated, OnlineStatus::Online, StatusDetail::None),
        (302, SessionState::Unauthenticated, OnlineStatus::Offline, StatusDetail::ConfigurationError),
        (401, SessionState::Unauthenticated, OnlineStatus::Offline, StatusDetail::ConfigurationError),
        (403, SessionState::Unauthenticated, OnlineStatus::Offline, StatusDetail::ConfigurationError),
        (503, SessionState::Unauthenticated, OnlineStatus::Offline, StatusDetail::BridgeOffline),
        (500, SessionState::Unauthenticated, OnlineStatus::Offline, StatusDetail::CommunicationError),
    ];

    for (code, state, online, detail) in cases {
        let transport = Arc::new(ScriptedTransport::new(&[code]));
        let sink = Arc::new(RecordingSink::default());
        let exec = executor(config(), &transport, &sink);

        exec.tick().await;

        assert_eq!(*exec.session_state().borrow(), state, "code {code}");
        let reports = sink.reports();
        assert_eq!(reports.len(), 1, "code {code}");
        assert_eq!((reports[0].status, reports[0].detail), (online, detail), "code {code}");
        assert_eq!(*exec.status().borrow(), reports[0]);
    }
}

#[tokio::test]
async fn test_failed_login_is_retried_next_tick() {
    let transport = Arc::new(ScriptedTransport::new(&[503, 200]));
    let sink = Arc::new(RecordingSink::default());
    let exec = executor(config(), &transport, &sink);

    assert_eq!(
        exec.tick().await,
        TickOutcome::AuthenticationFailed {
            detail: StatusDetail::BridgeOffline
        }
    );
    assert_eq!(exec.tick().await, TickOutcome::Authenticated);
    assert_eq!(transport.sends(), 2);
    assert_eq!(sink.reports().last(), Some(&StatusReport::online()));
}

#[tokio::test]
async fn test_precheck_failure_reports_once_and_sends_nothing() {
    let transport = Arc::new(ScriptedTransport::new(&[]));
    let sink = Arc::new(RecordingSink::default());
    let exec = executor(
        config_with(AuthCredentials::ApiKey(SecretString::from("short".to_owned()))),
        &transport,
        &sink,
    );
    let mut status = exec.status();

    exec.start().await;
    tokio::time::timeout(Duration::from_secs(2), status.changed())
        .await
        .unwrap()
        .unwrap();
    // Let a few more ticks run; the same failure is not reported again.
    tokio::time::sleep(Duration::from_millis(60)).await;
    exec.dispose().await;

    let reports = sink.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].detail, StatusDetail::ConfigurationError);
    assert_eq!(transport.sends(), 0);
}

#[tokio::test]
async fn test_config_update_is_picked_up_before_next_login() {
    let transport = Arc::new(ScriptedTransport::new(&[200]));
    let sink = Arc::new(RecordingSink::default());
    let exec = executor(
        config_with(AuthCredentials::Credentials {
            username: "installer".into(),
            password: SecretString::from("no".to_owned()),
        }),
        &transport,
        &sink,
    );

    assert!(matches!(exec.tick().await, TickOutcome::Misconfigured { .. }));
    exec.update_config(config());
    assert_eq!(exec.tick().await, TickOutcome::Authenticated);
    assert_eq!(transport.sends(), 1);
}

#[tokio::test]
async fn test_unauthorized_command_expires_session() {
    let transport = Arc::new(ScriptedTransport::new(&[200, 401, 200, 200]));
    let sink = Arc::new(RecordingSink::default());
    let exec = executor(config(), &transport, &sink);
    let log = Arc::new(Mutex::new(Vec::new()));
    exec.enqueue_command(Probe::new("write", &log, 5));

    assert_eq!(exec.tick().await, TickOutcome::Authenticated);
    assert_eq!(
        exec.tick().await,
        TickOutcome::Executed {
            command: "write",
            requeued: true
        }
    );
    assert_eq!(*exec.session_state().borrow(), SessionState::Unauthenticated);
    assert_eq!(exec.tick().await, TickOutcome::Authenticated);
    assert_eq!(
        exec.tick().await,
        TickOutcome::Executed {
            command: "write",
            requeued: false
        }
    );
    assert_eq!(
        transport.paths(),
        vec!["/api/login", "/probe/write", "/api/login", "/probe/write"]
    );
    // Losing the session and regaining it are both reported.
    assert_eq!(
        sink.reports(),
        vec![
            StatusReport::online(),
            StatusReport::communication_error("session expired"),
            StatusReport::online(),
        ]
    );
}

// ── Stock commands ──────────────────────────────────────────────────

#[tokio::test]
async fn test_status_poll_enqueued_before_start_runs_on_second_tick() {
    let transport = Arc::new(
        ScriptedTransport::new(&[200]).then_body(200, r#"{"overview":{"power":812}}"#),
    );
    let sink = Arc::new(RecordingSink::default());
    let channels = Arc::new(ChannelRecorder::default());
    let mut cfg = config();
    cfg.channels = vec![Channel::read_only("power", "/overview/power")];
    cfg.tick_interval = Duration::from_secs(3600);
    let exec = executor(cfg, &transport, &sink);

    let poll = StatusPoll::from_config(&exec.config(), channels.clone()).unwrap();
    assert!(exec.enqueue_command(poll));

    assert_eq!(exec.tick().await, TickOutcome::Authenticated);
    assert_eq!(
        exec.tick().await,
        TickOutcome::Executed {
            command: "status-poll",
            requeued: false
        }
    );
    assert_eq!(exec.queue_len(), 0);
    assert_eq!(
        *channels.0.lock().unwrap(),
        vec![("power".to_owned(), serde_json::json!(812))]
    );
    assert_eq!(transport.paths(), vec!["/api/login", "/api/status"]);
}

#[tokio::test]
async fn test_invalid_setting_is_rejected_without_a_request() {
    let transport = Arc::new(ScriptedTransport::new(&[200]));
    let sink = Arc::new(RecordingSink::default());
    let mut cfg = config();
    cfg.channels = vec![Channel::read_only("power", "/overview/power")];
    let exec = executor(cfg, &transport, &sink);

    let update = SettingUpdate::from_config(&exec.config(), "power", "5").unwrap();
    exec.enqueue_command(update);

    exec.tick().await;
    assert!(matches!(
        exec.tick().await,
        TickOutcome::Rejected {
            command: "setting-update",
            ..
        }
    ));
    assert_eq!(transport.sends(), 1);
    assert_eq!(sink.reports(), vec![StatusReport::online()]);
}

// ── Concurrency and lifecycle ───────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ticks_never_overlap() {
    let mut transport = ScriptedTransport::new(&[]);
    transport.delay = Duration::from_millis(20);
    let transport = Arc::new(transport);
    let sink = Arc::new(RecordingSink::default());
    let exec = executor(config(), &transport, &sink);
    let log = Arc::new(Mutex::new(Vec::new()));

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let exec = exec.clone();
            let log = Arc::clone(&log);
            std::thread::spawn(move || {
                for _ in 0..5 {
                    exec.enqueue_command(Probe::new("bulk", &log, 1));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    assert_eq!(exec.queue_len(), 20);

    let mut skipped = 0;
    for _ in 0..10 {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let exec = exec.clone();
                tokio::spawn(async move { exec.tick().await })
            })
            .collect();
        for handle in handles {
            if handle.await.unwrap() == TickOutcome::Skipped {
                skipped += 1;
            }
        }
    }

    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(skipped > 0);
    assert_eq!(transport.sends() + skipped, 40);
}

#[tokio::test(start_paused = true)]
async fn test_next_tick_waits_a_full_interval_after_the_last_one() {
    let mut transport = ScriptedTransport::new(&[]);
    transport.delay = Duration::from_millis(90);
    let transport = Arc::new(transport);
    let sink = Arc::new(RecordingSink::default());
    let mut cfg = config();
    cfg.tick_interval = Duration::from_millis(100);
    let exec = executor(cfg, &transport, &sink);
    let log = Arc::new(Mutex::new(Vec::new()));
    for tag in ["a", "b", "c"] {
        exec.enqueue_command(Probe::new(tag, &log, 1));
    }

    exec.start().await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    exec.dispose().await;

    let spans = transport.spans.lock().unwrap().clone();
    assert_eq!(spans.len(), 4);
    let gaps: Vec<Duration> = spans
        .windows(2)
        .map(|pair| pair[1].0.duration_since(pair[0].1))
        .collect();
    assert!(
        gaps.iter().all(|gap| *gap >= Duration::from_millis(100)),
        "gaps between requests: {gaps:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_overrunning_tick_delays_instead_of_queueing() {
    let mut transport = ScriptedTransport::new(&[]);
    transport.delay = Duration::from_millis(250);
    let transport = Arc::new(transport);
    let sink = Arc::new(RecordingSink::default());
    let mut cfg = config();
    cfg.tick_interval = Duration::from_millis(100);
    let exec = executor(cfg, &transport, &sink);
    let log = Arc::new(Mutex::new(Vec::new()));
    for _ in 0..10 {
        exec.enqueue_command(Probe::new("slow", &log, 1));
    }

    exec.start().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    // The scheduled tick is still inside its request.
    assert_eq!(exec.tick().await, TickOutcome::Skipped);

    // Requests start at 0, 350 and 700ms; the next is due at 1050ms.
    tokio::time::sleep(Duration::from_millis(950)).await;
    assert_eq!(transport.sends(), 3);
    exec.dispose().await;
    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_session_state_shows_login_in_progress() {
    let gate = Arc::new(Notify::new());
    let mut transport = ScriptedTransport::new(&[200]);
    transport.gate = Some(Arc::clone(&gate));
    let transport = Arc::new(transport);
    let sink = Arc::new(RecordingSink::default());
    let exec = executor(config(), &transport, &sink);

    let ticking = {
        let exec = exec.clone();
        tokio::spawn(async move { exec.tick().await })
    };
    while transport.sends() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(*exec.session_state().borrow(), SessionState::Authenticating);

    gate.notify_one();
    assert_eq!(ticking.await.unwrap(), TickOutcome::Authenticated);
    assert_eq!(*exec.session_state().borrow(), SessionState::Authenticated);
}

#[tokio::test]
async fn test_dispose_discards_in_flight_login() {
    let gate = Arc::new(Notify::new());
    let mut transport = ScriptedTransport::new(&[200, 200]);
    transport.gate = Some(Arc::clone(&gate));
    let transport = Arc::new(transport);
    let sink = Arc::new(RecordingSink::default());
    let mut cfg = config();
    cfg.tick_interval = Duration::from_secs(3600);
    let exec = executor(cfg, &transport, &sink);
    let log = Arc::new(Mutex::new(Vec::new()));
    exec.enqueue_command(Probe::new("pending", &log, 1));

    exec.start().await;
    while transport.sends() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let disposing = {
        let exec = exec.clone();
        tokio::spawn(async move { exec.dispose().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.notify_one();
    disposing.await.unwrap();

    assert!(sink.reports().is_empty());
    assert_eq!(*exec.session_state().borrow(), SessionState::Unauthenticated);
    assert_eq!(exec.queue_len(), 0);
    assert_eq!(exec.tick().await, TickOutcome::Discarded);

    // Restartable: a fresh run logs in again.
    transport.gate.as_ref().unwrap().notify_one();
    let mut status = exec.status();
    exec.start().await;
    tokio::time::timeout(Duration::from_secs(2), status.changed())
        .await
        .unwrap()
        .unwrap();
    exec.dispose().await;
    assert_eq!(sink.reports(), vec![StatusReport::online()]);
}

#[tokio::test]
async fn test_poll_job_feeds_the_queue() {
    let transport = Arc::new(ScriptedTransport::new(&[200]).with_fallback(StatusCode::OK));
    let sink = Arc::new(RecordingSink::default());
    let channels = Arc::new(ChannelRecorder::default());
    let mut cfg = config();
    cfg.poll_interval = Some(Duration::from_millis(15));
    let exec = WebInterface::with_channel_sink(cfg, transport.clone(), sink.clone(), channels);

    exec.start().await;
    tokio::time::timeout(Duration::from_secs(2), async {
        while !transport.paths().iter().any(|p| p == "/api/status") {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    exec.dispose().await;

    assert_eq!(transport.paths()[0], "/api/login");
    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
}
