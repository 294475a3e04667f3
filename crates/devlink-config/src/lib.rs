//! Configuration for devlink.
//!
//! TOML profiles (one per device), credential resolution (env + keyring +
//! plaintext), and translation to `devlink_core::ConnectionConfig` plus the
//! matching `devlink_api::TransportConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use devlink_api::{TlsMode, TransportConfig};
use devlink_core::{AuthCredentials, Channel, ConnectionConfig, RequestQuota};

const KEYRING_SERVICE: &str = "devlink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("transport setup failed: {0}")]
    Transport(#[from] devlink_api::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile<'a>(&'a self, name: Option<&'a str>) -> Result<(&'a str, &'a Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|profile| (name, profile))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

/// Values a profile falls back to.
#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default)]
    pub insecure: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Delay between executor ticks in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            insecure: false,
            timeout: default_timeout(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_tick_interval_ms() -> u64 {
    5_000
}

/// A named device profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Device or cloud base URL (e.g., "https://192.168.1.40").
    pub url: String,

    #[serde(default)]
    pub auth_mode: AuthMode,

    /// API key (plaintext -- prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Header the API key is sent in.
    pub api_key_header: Option<String>,

    pub username: Option<String>,

    /// Password (plaintext -- prefer keyring).
    pub password: Option<String>,

    pub login_path: Option<String>,
    pub status_path: Option<String>,
    pub write_path: Option<String>,

    /// Status code the device answers an accepted write with.
    pub write_accepted_status: Option<u16>,

    /// Response header carrying a session token.
    pub session_header: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Override tick delay (milliseconds).
    pub tick_interval_ms: Option<u64>,

    /// Built-in status poll interval (seconds); no poll job when absent.
    pub poll_interval: Option<u64>,

    pub queue_capacity: Option<usize>,
    pub max_retries: Option<u32>,

    /// Vendor request budget, checked against `poll_interval`.
    pub quota: Option<RequestQuota>,

    #[serde(default)]
    pub channels: Vec<Channel>,
}

/// How a profile authenticates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Static API key, see [`resolve_api_key`].
    #[default]
    ApiKey,
    /// Username and password form login, see [`resolve_credentials`].
    Credentials,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "devlink", "devlink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("devlink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load config from `path`, merged over defaults and under `DEVLINK_*`
/// environment variables. Nested keys use `__`, e.g.
/// `DEVLINK_DEFAULTS__TIMEOUT=10`.
///
/// A missing file is not an error; the defaults apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DEVLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parent
/// directories as needed.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve an API key: profile env var, then keyring, then plaintext.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(val) = profile
        .api_key_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
    {
        return Ok(SecretString::from(val));
    }

    if let Some(secret) = keyring_secret(profile_name, "api-key") {
        return Ok(secret);
    }

    profile
        .api_key
        .clone()
        .map(SecretString::from)
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })
}

/// Resolve username and password: `DEVLINK_PASSWORD`, then keyring, then
/// plaintext.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<(String, SecretString), ConfigError> {
    let username = profile
        .username
        .clone()
        .or_else(|| std::env::var("DEVLINK_USERNAME").ok())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })?;

    if let Ok(pw) = std::env::var("DEVLINK_PASSWORD") {
        return Ok((username, SecretString::from(pw)));
    }

    if let Some(pw) = keyring_secret(profile_name, "password") {
        return Ok((username, pw));
    }

    profile
        .password
        .clone()
        .map(|pw| (username, SecretString::from(pw)))
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })
}

fn keyring_secret(profile_name: &str, kind: &str) -> Option<SecretString> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{kind}"))
        .and_then(|entry| entry.get_password())
        .ok()
        .map(SecretString::from)
}

/// Resolve `AuthCredentials` from a profile's `auth_mode` field.
pub fn resolve_auth(profile: &Profile, profile_name: &str) -> Result<AuthCredentials, ConfigError> {
    match profile.auth_mode {
        AuthMode::ApiKey => Ok(AuthCredentials::ApiKey(resolve_api_key(profile, profile_name)?)),
        AuthMode::Credentials => {
            let (username, password) = resolve_credentials(profile, profile_name)?;
            Ok(AuthCredentials::Credentials { username, password })
        }
    }
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `ConnectionConfig` from a profile, falling back to `defaults`.
pub fn profile_to_connection_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ConnectionConfig, ConfigError> {
    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    let auth = resolve_auth(profile, profile_name)?;
    let base = ConnectionConfig::new(url, auth);

    let config = ConnectionConfig {
        login_path: profile.login_path.clone().unwrap_or(base.login_path),
        api_key_header: profile.api_key_header.clone().unwrap_or(base.api_key_header),
        status_path: profile.status_path.clone().unwrap_or(base.status_path),
        write_path: profile.write_path.clone().unwrap_or(base.write_path),
        write_accepted_status: profile
            .write_accepted_status
            .unwrap_or(base.write_accepted_status),
        session_header: profile.session_header.clone(),
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        tick_interval: Duration::from_millis(
            profile.tick_interval_ms.unwrap_or(defaults.tick_interval_ms),
        ),
        poll_interval: profile.poll_interval.map(Duration::from_secs),
        queue_capacity: profile.queue_capacity.unwrap_or(base.queue_capacity),
        max_retries: profile.max_retries.unwrap_or(base.max_retries),
        quota: profile.quota,
        channels: profile.channels.clone(),
        ..base
    };
    config
        .write_accepted()
        .map_err(|e| ConfigError::Validation {
            field: "write_accepted_status".into(),
            reason: e.to_string(),
        })?;
    Ok(config)
}

/// Transport settings matching `config`.
///
/// API keys ride along as a sensitive default header so every request
/// carries them, not only the login.
pub fn transport_config(
    profile: &Profile,
    defaults: &Defaults,
    config: &ConnectionConfig,
) -> Result<TransportConfig, ConfigError> {
    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    let transport = TransportConfig {
        tls,
        timeout: config.timeout,
        session_header: config.session_header.clone(),
        ..TransportConfig::default()
    };

    match &config.auth {
        AuthCredentials::ApiKey(key) => Ok(transport
            .with_secret_header(&config.api_key_header, key.expose_secret())?),
        AuthCredentials::Credentials { .. } => Ok(transport),
    }
}
