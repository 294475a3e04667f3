//! Terminal sinks: channel values to stdout, device status to stderr.

use std::io::Write;

use devlink_core::{ChannelSink, OnlineStatus, StatusDetail, StatusSink};

/// Prints every published channel value on its own line.
#[derive(Debug, Clone, Copy)]
pub struct ChannelPrinter {
    pub json: bool,
}

impl ChannelSink for ChannelPrinter {
    fn publish(&self, channel: &str, value: &serde_json::Value) {
        let line = if self.json {
            serde_json::json!({ "channel": channel, "value": value }).to_string()
        } else {
            format!("{channel} = {value}")
        };
        // A closed stdout (e.g. piped into `head`) is not worth failing over.
        let _ = writeln!(std::io::stdout().lock(), "{line}");
    }
}

/// Prints device status changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusPrinter;

impl StatusSink for StatusPrinter {
    fn update(&self, status: OnlineStatus, detail: StatusDetail, message: Option<&str>) {
        match (detail, message) {
            (StatusDetail::None, _) => eprintln!("status: {status}"),
            (_, Some(message)) => eprintln!("status: {status} ({detail}: {message})"),
            (_, None) => eprintln!("status: {status} ({detail})"),
        }
    }
}
