//! `devlink run`: poll until interrupted.

use std::sync::Arc;
use std::time::Duration;

use devlink_core::{AuthenticationSession, CoreError};
use tracing::{info, warn};

use super::{build_executor, load_device};
use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;
use crate::output::StatusPrinter;

pub async fn handle(args: &RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut device = load_device(global)?;
    if let Some(secs) = args.poll_interval {
        device.connection.poll_interval = Some(Duration::from_secs(secs));
    }
    if device.connection.poll_interval.is_none() {
        warn!("no poll interval configured, only the session will be maintained");
    }

    // Refuse to start on a profile the executor would only report as broken.
    AuthenticationSession::new(Arc::new(device.connection.clone()))
        .precheck()
        .map_err(CoreError::from)?;

    let executor = build_executor(&device, global, Arc::new(StatusPrinter))?;
    executor.start().await;

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
    }
    info!(profile = %device.profile_name, "shutting down");
    executor.dispose().await;
    Ok(())
}
