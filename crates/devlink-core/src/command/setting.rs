use std::fmt;
use std::sync::Arc;

use devlink_api::{Request, Response, StatusCode};
use tracing::{debug, info};
use url::Url;

use super::{Command, Completion, RetryCounter};
use crate::config::{Channel, ConnectionConfig};
use crate::error::{CommandError, CoreError};
use crate::status::ChannelSink;

/// Write one channel's value.
///
/// The value is checked against the channel's [`ValidationRule`] before the
/// request is built; writing a read-only channel is an unsupported
/// operation. Both failures are final. The device acknowledges an accepted
/// write with `accepted` (a redirect on most web interfaces); anything else
/// is retried up to the configured limit.
///
/// [`ValidationRule`]: crate::config::ValidationRule
pub struct SettingUpdate {
    url: Url,
    channel: Channel,
    value: String,
    accepted: StatusCode,
    sink: Option<Arc<dyn ChannelSink>>,
    retry: RetryCounter,
}

impl SettingUpdate {
    pub fn new(url: Url, channel: Channel, value: impl Into<String>, max_retries: u32) -> Self {
        Self {
            url,
            channel,
            value: value.into(),
            accepted: StatusCode::FOUND,
            sink: None,
            retry: RetryCounter::new(max_retries),
        }
    }

    /// Update of channel `channel_id` posted to `write_path`.
    pub fn from_config(
        config: &ConnectionConfig,
        channel_id: &str,
        value: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let channel = config
            .channel(channel_id)
            .cloned()
            .ok_or_else(|| CoreError::UnknownChannel {
                id: channel_id.to_owned(),
            })?;
        let accepted = config.write_accepted()?;
        Ok(
            Self::new(config.endpoint(&config.write_path)?, channel, value, config.max_retries)
                .with_accepted_status(accepted),
        )
    }

    /// Status the device answers an accepted write with.
    pub fn with_accepted_status(mut self, accepted: StatusCode) -> Self {
        self.accepted = accepted;
        self
    }

    /// Publish the written value to `sink` once the device accepts it.
    pub fn with_sink(mut self, sink: Arc<dyn ChannelSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn accepted_status(&self) -> StatusCode {
        self.accepted
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Check the write without building a request.
    pub fn validate(&self) -> Result<(), CommandError> {
        if !self.channel.writable {
            return Err(CommandError::UnsupportedOperation {
                operation: format!("write to read-only channel {}", self.channel.id),
            });
        }
        self.channel.rule.validate(&self.channel.id, &self.value)
    }
}

impl fmt::Debug for SettingUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingUpdate")
            .field("channel", &self.channel.id)
            .field("value", &self.value)
            .field("accepted", &self.accepted.as_u16())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Command for SettingUpdate {
    fn name(&self) -> &'static str {
        "setting-update"
    }

    fn target_url(&self) -> &Url {
        &self.url
    }

    fn prepare_request(&self) -> Result<Request, CommandError> {
        self.validate()?;
        Ok(Request::post(self.url.clone()).with_form(vec![(
            self.channel.parameter_name().to_owned(),
            self.value.clone(),
        )]))
    }

    fn on_complete(&mut self, response: &Response) -> Completion {
        if response.code() != self.accepted || response.status.error().is_some() {
            let name = self.name();
            return self.retry.record_failure(name, response);
        }

        info!(channel = %self.channel.id, value = %self.value, "setting accepted");
        if let Some(sink) = &self.sink {
            let value = serde_json::from_str(&self.value)
                .unwrap_or_else(|_| serde_json::Value::String(self.value.clone()));
            sink.publish(&self.channel.id, &value);
        }
        debug!(attempts = self.retry.retry_count() + 1, "setting update done");
        Completion::Done
    }

    fn retry_count(&self) -> u32 {
        self.retry.retry_count()
    }
}
