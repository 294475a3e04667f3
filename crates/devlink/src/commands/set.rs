//! `devlink set`: write one channel and wait for the outcome.

use std::sync::Arc;
use std::time::Duration;

use devlink_api::{CommunicationStatus, Request, Response, StatusCode};
use devlink_core::{
    Command, CommandError, Completion, LogSink, SettingUpdate, StatusDetail, WebInterface,
};
use tokio::sync::oneshot;
use url::Url;

use super::{build_executor, load_device};
use crate::cli::{GlobalOpts, SetArgs};
use crate::error::CliError;

/// Final status of a command once it stops retrying.
#[derive(Debug)]
struct Finished {
    status: CommunicationStatus,
    failures: u32,
}

/// Reports the final attempt of the wrapped command over a oneshot.
#[derive(Debug)]
struct Tracked<C> {
    inner: C,
    done: Option<oneshot::Sender<Finished>>,
}

impl<C: Command> Command for Tracked<C> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn target_url(&self) -> &Url {
        self.inner.target_url()
    }

    fn prepare_request(&self) -> Result<Request, CommandError> {
        self.inner.prepare_request()
    }

    fn on_complete(&mut self, response: &Response) -> Completion {
        let completion = self.inner.on_complete(response);
        if completion == Completion::Done {
            if let Some(done) = self.done.take() {
                let _ = done.send(Finished {
                    status: response.status.clone(),
                    failures: self.inner.retry_count(),
                });
            }
        }
        completion
    }

    fn retry_count(&self) -> u32 {
        self.inner.retry_count()
    }
}

pub async fn handle(args: &SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let device = load_device(global)?;
    let config = &device.connection;

    if config.channel(&args.channel).is_none() {
        return Err(CliError::UnknownChannel {
            channel: args.channel.clone(),
            available: config
                .channels
                .iter()
                .map(|c| c.id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    let executor = build_executor(&device, global, Arc::new(LogSink))?;
    let update = SettingUpdate::from_config(config, &args.channel, args.value.as_str())?;
    let update = match executor.channel_sink() {
        Some(sink) => update.with_sink(sink),
        None => update,
    };
    update.validate()?;

    let accepted = update.accepted_status();
    let (tx, rx) = oneshot::channel();
    if !executor.enqueue_command(Tracked {
        inner: update,
        done: Some(tx),
    }) {
        return Err(CliError::QueueFull);
    }

    executor.start().await;
    let result = wait_for(&executor, rx, args, &device.profile_name, accepted).await;
    executor.dispose().await;
    result
}

async fn wait_for(
    executor: &WebInterface,
    mut done: oneshot::Receiver<Finished>,
    args: &SetArgs,
    profile: &str,
    accepted: StatusCode,
) -> Result<(), CliError> {
    let mut status = executor.status();
    let deadline = tokio::time::sleep(Duration::from_secs(args.wait));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            finished = &mut done => {
                let Ok(finished) = finished else {
                    return Err(CliError::WriteFailed {
                        channel: args.channel.clone(),
                        reason: "command was dropped before completing".into(),
                    });
                };
                if finished.status.code() == accepted && finished.status.error().is_none() {
                    return Ok(());
                }
                return Err(CliError::WriteFailed {
                    channel: args.channel.clone(),
                    reason: format!(
                        "last status {} after {} failed attempts",
                        finished.status, finished.failures
                    ),
                });
            }
            changed = status.changed() => {
                if changed.is_err() {
                    return Err(CliError::WriteFailed {
                        channel: args.channel.clone(),
                        reason: "executor stopped".into(),
                    });
                }
                let report = status.borrow_and_update().clone();
                if report.detail == StatusDetail::ConfigurationError {
                    return Err(CliError::AuthFailed {
                        profile: profile.to_owned(),
                        message: report.message.unwrap_or_default(),
                    });
                }
            }
            () = &mut deadline => {
                return Err(CliError::Timeout { seconds: args.wait });
            }
        }
    }
}
