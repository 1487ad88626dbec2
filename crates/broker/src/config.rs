//! Broker configuration.
//!
//! Loaded from TOML. Every field has a default so an absent file or an
//! empty table yields a working setup for a stock X11 + D-Bus system.

use std::path::{Path, PathBuf};
use std::time::Duration;

use portico_protocol::SessionOption;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths;

pub const MAX_SECRET_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub display: DisplayConfig,
    pub bus: BusConfig,
    pub accounts: AccountsConfig,
    pub sessions: SessionsConfig,
    pub auth: AuthConfig,
    pub broker: BrokerConfig,
    pub logging: LoggingConfig,
}

const DISPLAY_READY: ReadyPolicy = ReadyPolicy::new(50, 100);
const BUS_READY: ReadyPolicy = ReadyPolicy::new(30, 100);
const REAP: ReadyPolicy = ReadyPolicy::new(20, 100);

/// Bounded readiness poll budget.
///
/// Each section has its own default; a partial table such as
/// `{ interval_ms = 200 }` only overrides the fields it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadyPolicy {
    pub attempts: u32,
    pub interval_ms: u64,
}

impl ReadyPolicy {
    pub const fn new(attempts: u32, interval_ms: u64) -> Self {
        Self {
            attempts,
            interval_ms,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyOverride {
    attempts: Option<u32>,
    interval_ms: Option<u64>,
}

impl PolicyOverride {
    fn over(self, base: ReadyPolicy) -> ReadyPolicy {
        ReadyPolicy {
            attempts: self.attempts.unwrap_or(base.attempts),
            interval_ms: self.interval_ms.unwrap_or(base.interval_ms),
        }
    }
}

fn display_ready<'de, D: serde::Deserializer<'de>>(d: D) -> Result<ReadyPolicy, D::Error> {
    PolicyOverride::deserialize(d).map(|o| o.over(DISPLAY_READY))
}

fn bus_ready<'de, D: serde::Deserializer<'de>>(d: D) -> Result<ReadyPolicy, D::Error> {
    PolicyOverride::deserialize(d).map(|o| o.over(BUS_READY))
}

fn reap_policy<'de, D: serde::Deserializer<'de>>(d: D) -> Result<ReadyPolicy, D::Error> {
    PolicyOverride::deserialize(d).map(|o| o.over(REAP))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub command: String,
    /// `{display}` is replaced with `display`
    pub args: Vec<String>,
    pub display: String,
    /// Directory holding the server's `X<n>` listening sockets
    pub socket_dir: PathBuf,
    #[serde(deserialize_with = "display_ready")]
    pub ready: ReadyPolicy,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            command: "/usr/bin/X".into(),
            args: [
                "{display}",
                "-ac",
                "-nolisten",
                "tcp",
                "-background",
                "none",
                "-noreset",
                "vt1",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            display: ":0".into(),
            socket_dir: PathBuf::from("/tmp/.X11-unix"),
            ready: DISPLAY_READY,
        }
    }
}

impl DisplayConfig {
    /// The `<n>` of a `:<n>` display identifier.
    pub fn display_number(&self) -> Option<u32> {
        self.display.strip_prefix(':')?.parse().ok()
    }

    pub fn socket_path(&self) -> Option<PathBuf> {
        self.display_number()
            .map(|n| paths::display_socket_path(&self.socket_dir, n))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BusConfig {
    pub command: String,
    /// `{address}` is replaced with the private bus address
    pub args: Vec<String>,
    /// Parent of the per-run bus directory
    pub run_dir: PathBuf,
    #[serde(deserialize_with = "bus_ready")]
    pub ready: ReadyPolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            command: "dbus-daemon".into(),
            args: [
                "--session",
                "--nofork",
                "--print-address=1",
                "--address={address}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            run_dir: std::env::temp_dir(),
            ready: BUS_READY,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccountsConfig {
    /// Read accounts from this passwd-format file instead of the system
    /// database
    pub passwd_path: Option<PathBuf>,
    pub min_uid: u32,
    pub max_count: usize,
    pub excluded: Vec<String>,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            passwd_path: None,
            min_uid: 1000,
            max_count: 20,
            excluded: vec!["nobody".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionsConfig {
    /// Directory probed for known session launchers
    pub search_dir: PathBuf,
    /// Parent of per-user `XDG_RUNTIME_DIR`s
    pub runtime_root: PathBuf,
    /// Extra options appended after the probed ones
    pub extra: Vec<SessionOption>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            search_dir: PathBuf::from("/usr/bin"),
            runtime_root: PathBuf::from("/run/user"),
            extra: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthBackendKind {
    #[default]
    Pam,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub backend: AuthBackendKind,
    /// PAM service name
    pub service: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            backend: AuthBackendKind::Pam,
            service: "login".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    pub secret_capacity: usize,
    /// Budget for a child to exit after SIGTERM before SIGKILL
    #[serde(deserialize_with = "reap_policy")]
    pub reap: ReadyPolicy,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            secret_capacity: 63,
            reap: REAP,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub dir: Option<PathBuf>,
    pub filter: Option<String>,
    /// `json` (default) or `pretty`
    pub format: Option<String>,
}

impl Config {
    /// Load config from `explicit`, or from the default path if it exists.
    ///
    /// An explicitly named file must exist; a missing default file yields
    /// built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let (path, required) = match explicit {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(paths::DEFAULT_CONFIG_PATH), false),
        };

        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg = Self::from_toml(&content).map_err(|err| match err {
                    ConfigError::Parse { source, .. } => ConfigError::Parse {
                        path: path.clone(),
                        source,
                    },
                    other => other,
                })?;
                Ok((cfg, Some(path)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                let cfg = Self::default();
                cfg.validate()?;
                Ok((cfg, None))
            }
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.display.command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "display.command must not be empty".to_string(),
            ));
        }
        if self.display.display_number().is_none() {
            return Err(ConfigError::Invalid(format!(
                "display.display must look like ':0', got '{}'",
                self.display.display
            )));
        }
        if self.bus.command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "bus.command must not be empty".to_string(),
            ));
        }
        if self.broker.secret_capacity == 0 || self.broker.secret_capacity > MAX_SECRET_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "broker.secret_capacity must be between 1 and {MAX_SECRET_CAPACITY}"
            )));
        }
        if self.accounts.max_count == 0 {
            return Err(ConfigError::Invalid(
                "accounts.max_count must be greater than 0".to_string(),
            ));
        }
        if self.auth.service.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "auth.service must not be empty".to_string(),
            ));
        }
        for option in &self.sessions.extra {
            if option.command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "sessions.extra entry '{}' has an empty command",
                    option.label
                )));
            }
        }
        Ok(())
    }
}
