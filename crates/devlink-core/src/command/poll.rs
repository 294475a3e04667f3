use std::fmt;
use std::sync::Arc;

use devlink_api::{Request, Response, StatusCode};
use tracing::{debug, trace, warn};
use url::Url;

use super::{Command, Completion, RetryCounter};
use crate::config::{Channel, ConnectionConfig};
use crate::error::{CommandError, ConfigurationError};
use crate::status::ChannelSink;

/// Periodic read of every configured channel.
///
/// Expects `200 OK` with a JSON body; each channel's value is looked up by
/// its JSON pointer and published to the sink. Other statuses are retried
/// up to the configured limit. An exhausted poll is dropped quietly since
/// the next scheduled poll covers it.
pub struct StatusPoll {
    url: Url,
    channels: Arc<[Channel]>,
    sink: Arc<dyn ChannelSink>,
    retry: RetryCounter,
}

impl StatusPoll {
    pub fn new(url: Url, channels: Arc<[Channel]>, sink: Arc<dyn ChannelSink>, max_retries: u32) -> Self {
        Self {
            url,
            channels,
            sink,
            retry: RetryCounter::new(max_retries),
        }
    }

    /// Poll of `status_path` covering every channel in `config`.
    pub fn from_config(
        config: &ConnectionConfig,
        sink: Arc<dyn ChannelSink>,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self::new(
            config.endpoint(&config.status_path)?,
            config.channels.iter().cloned().collect(),
            sink,
            config.max_retries,
        ))
    }

    fn publish(&self, body: &str) {
        let document: serde_json::Value = match serde_json::from_str(body) {
            Ok(document) => document,
            Err(e) => {
                warn!(error = %e, url = %self.url, "status response is not valid JSON");
                return;
            }
        };

        let mut published = 0usize;
        for channel in self.channels.iter() {
            match document.pointer(&channel.pointer) {
                Some(value) => {
                    self.sink.publish(&channel.id, value);
                    published += 1;
                }
                None => trace!(channel = %channel.id, pointer = %channel.pointer, "channel missing from response"),
            }
        }
        debug!(published, total = self.channels.len(), "status poll applied");
    }
}

impl fmt::Debug for StatusPoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusPoll")
            .field("url", &self.url.as_str())
            .field("channels", &self.channels.len())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Command for StatusPoll {
    fn name(&self) -> &'static str {
        "status-poll"
    }

    fn target_url(&self) -> &Url {
        &self.url
    }

    fn prepare_request(&self) -> Result<Request, CommandError> {
        Ok(Request::get(self.url.clone()).with_header("Accept", "application/json"))
    }

    fn on_complete(&mut self, response: &Response) -> Completion {
        if response.code() != StatusCode::OK || response.status.error().is_some() {
            let name = self.name();
            return self.retry.record_failure(name, response);
        }
        match response.body() {
            Some(body) => self.publish(body),
            None => debug!(url = %self.url, "status response has no body"),
        }
        Completion::Done
    }

    fn retry_count(&self) -> u32 {
        self.retry.retry_count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use devlink_api::CommunicationStatus;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, serde_json::Value)>>);

    impl ChannelSink for Recorder {
        fn publish(&self, channel: &str, value: &serde_json::Value) {
            self.0
                .lock()
                .expect("recorder lock")
                .push((channel.to_owned(), value.clone()));
        }
    }

    fn poll(sink: Arc<Recorder>, max_retries: u32) -> StatusPoll {
        let channels: Arc<[Channel]> = vec![
            Channel::read_only("power", "/overview/power"),
            Channel::read_only("energy", "/overview/energy/today"),
            Channel::read_only("missing", "/nope"),
        ]
        .into();
        StatusPoll::new(
            Url::parse("https://device.local/api/status").expect("valid url"),
            channels,
            sink,
            max_retries,
        )
    }

    #[test]
    fn success_publishes_found_channels() {
        let sink = Arc::new(Recorder::default());
        let mut cmd = poll(Arc::clone(&sink), 5);

        let response = Response::new(
            CommunicationStatus::new(StatusCode::OK),
            Some(r#"{"overview":{"power":1520.5,"energy":{"today":12}}}"#.into()),
        );
        assert_eq!(cmd.on_complete(&response), Completion::Done);

        let published = sink.0.lock().expect("recorder lock");
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].0, "power");
        assert_eq!(published[1].1, serde_json::json!(12));
    }

    #[test]
    fn malformed_body_finishes_without_retry() {
        let sink = Arc::new(Recorder::default());
        let mut cmd = poll(Arc::clone(&sink), 5);

        let response = Response::new(
            CommunicationStatus::new(StatusCode::OK),
            Some("<html>maintenance</html>".into()),
        );
        assert_eq!(cmd.on_complete(&response), Completion::Done);
        assert!(sink.0.lock().expect("recorder lock").is_empty());
    }

    #[test]
    fn non_success_retries_until_exhausted() {
        let sink = Arc::new(Recorder::default());
        let mut cmd = poll(sink, 2);
        let failed = Response::status_only(StatusCode::BAD_GATEWAY);

        assert_eq!(cmd.on_complete(&failed), Completion::Retry);
        assert_eq!(cmd.on_complete(&failed), Completion::Done);
        assert_eq!(cmd.retry_count(), 2);
    }

    #[test]
    fn request_asks_for_json() {
        let cmd = poll(Arc::new(Recorder::default()), 5);
        let request = cmd.prepare_request().expect("builds");
        assert_eq!(request.header("accept"), Some("application/json"));
        assert_eq!(cmd.target_url().path(), "/api/status");
    }
}
