// ── Status reporting ──
//
// The executor's only outward side effects besides issuing requests:
// device-level status goes to a `StatusSink`, parsed channel values go to a
// `ChannelSink`. Both are implemented by the embedding application.

use serde::Serialize;
use strum::{Display, EnumString};

/// Coarse device availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OnlineStatus {
    Unknown,
    Online,
    Offline,
}

/// Why the device has its current [`OnlineStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusDetail {
    None,
    ConfigurationError,
    CommunicationError,
    BridgeOffline,
}

/// One notification to the [`StatusSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub status: OnlineStatus,
    pub detail: StatusDetail,
    pub message: Option<String>,
}

impl StatusReport {
    /// Initial report before the first authentication attempt.
    pub fn unknown() -> Self {
        Self {
            status: OnlineStatus::Unknown,
            detail: StatusDetail::None,
            message: None,
        }
    }

    pub fn online() -> Self {
        Self {
            status: OnlineStatus::Online,
            detail: StatusDetail::None,
            message: None,
        }
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::offline(StatusDetail::ConfigurationError, Some(message.into()))
    }

    pub fn communication_error(message: impl Into<String>) -> Self {
        Self::offline(StatusDetail::CommunicationError, Some(message.into()))
    }

    pub fn bridge_offline(message: Option<String>) -> Self {
        Self::offline(StatusDetail::BridgeOffline, message)
    }

    fn offline(detail: StatusDetail, message: Option<String>) -> Self {
        Self {
            status: OnlineStatus::Offline,
            detail,
            message,
        }
    }
}

/// Receives device-level status changes.
///
/// Called from the executor's tick; implementations should return quickly.
pub trait StatusSink: Send + Sync {
    fn update(&self, status: OnlineStatus, detail: StatusDetail, message: Option<&str>);
}

/// Receives channel values parsed out of status responses.
pub trait ChannelSink: Send + Sync {
    fn publish(&self, channel: &str, value: &serde_json::Value);
}

/// Sink that only logs; handy when nothing downstream cares.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn update(&self, status: OnlineStatus, detail: StatusDetail, message: Option<&str>) {
        tracing::info!(%status, %detail, message = message.unwrap_or_default(), "device status");
    }
}

impl ChannelSink for LogSink {
    fn publish(&self, channel: &str, value: &serde_json::Value) {
        tracing::debug!(channel, %value, "channel updated");
    }
}
