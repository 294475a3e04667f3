//! Command handlers plus the profile -> executor plumbing they share.

pub mod check;
pub mod config_cmd;
pub mod run;
pub mod set;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use devlink_api::{HttpTransport, TlsMode, TransportConfig};
use devlink_config::{Config, ConfigError, profile_to_connection_config, transport_config};
use devlink_core::{ConnectionConfig, CoreError, StatusSink, WebInterface};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output::ChannelPrinter;

/// Everything needed to talk to the selected device.
#[derive(Debug)]
pub struct Device {
    pub profile_name: String,
    pub connection: ConnectionConfig,
    pub transport: TransportConfig,
}

pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(devlink_config::config_path)
}

/// Resolve the active profile, applying CLI flag overrides.
pub fn load_device(global: &GlobalOpts) -> Result<Device, CliError> {
    let path = config_file(global);
    let cfg = devlink_config::load_config_from(&path)?;

    let (name, profile) = match cfg.profile(global.profile.as_deref()) {
        Ok(found) => found,
        Err(ConfigError::UnknownProfile { name }) => {
            return Err(profile_not_found(name, &cfg, &path));
        }
        Err(e) => return Err(e.into()),
    };

    let mut connection = profile_to_connection_config(profile, name, &cfg.defaults)?;
    if let Some(secs) = global.timeout {
        connection.timeout = Duration::from_secs(secs);
    }

    let mut transport = transport_config(profile, &cfg.defaults, &connection)?;
    if global.insecure {
        transport.tls = TlsMode::DangerAcceptInvalid;
    }

    tracing::debug!(profile = name, url = %connection.url, "profile resolved");
    Ok(Device {
        profile_name: name.to_owned(),
        connection,
        transport,
    })
}

pub fn profile_not_found(name: String, cfg: &Config, path: &Path) -> CliError {
    let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    available.sort_unstable();
    CliError::ProfileNotFound {
        name,
        available: if available.is_empty() {
            "(none)".into()
        } else {
            available.join(", ")
        },
        path: path.display().to_string(),
    }
}

/// Build an executor for `device` that prints channel values.
pub fn build_executor(
    device: &Device,
    global: &GlobalOpts,
    status_sink: Arc<dyn StatusSink>,
) -> Result<WebInterface, CliError> {
    let http = HttpTransport::new(&device.transport).map_err(CoreError::from)?;
    Ok(WebInterface::with_channel_sink(
        device.connection.clone(),
        Arc::new(http),
        status_sink,
        Arc::new(ChannelPrinter { json: global.json }),
    ))
}
