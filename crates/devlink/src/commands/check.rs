//! `devlink check`: validate a profile, optionally with one login.

use std::sync::Arc;

use devlink_core::{AuthenticationSession, CoreError, LogSink, StatusDetail, TickOutcome};

use super::{build_executor, load_device};
use crate::cli::{CheckArgs, GlobalOpts};
use crate::error::CliError;

pub async fn handle(args: &CheckArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let device = load_device(global)?;

    AuthenticationSession::new(Arc::new(device.connection.clone()))
        .precheck()
        .map_err(CoreError::from)?;
    println!("profile '{}' is valid", device.profile_name);

    if !args.login {
        return Ok(());
    }

    // One tick on an unstarted executor is exactly one login attempt.
    let executor = build_executor(&device, global, Arc::new(LogSink))?;
    let outcome = executor.tick().await;
    let message = executor.status().borrow().message.clone().unwrap_or_default();

    match outcome {
        TickOutcome::Authenticated => {
            println!("login succeeded");
            Ok(())
        }
        TickOutcome::AuthenticationFailed {
            detail: StatusDetail::ConfigurationError,
        } => Err(CliError::AuthFailed {
            profile: device.profile_name,
            message,
        }),
        TickOutcome::AuthenticationFailed { .. } => Err(CliError::ConnectionFailed { reason: message }),
        TickOutcome::Misconfigured { reason } => Err(CliError::Configuration { reason }),
        other => Err(CliError::ConnectionFailed {
            reason: format!("unexpected tick outcome: {other:?}"),
        }),
    }
}
