use std::fs;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use common::{RemovalPolicy, SupervisorConfig};

pub const DEFAULT_LISTEN_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 8095));
pub const DEFAULT_STATE_FILE: &str = "/state/zookeeper-volume-state.json";

/// Name of the daemon's own log file inside the log directory
pub const LOG_FILE_NAME: &str = "zkvol.log";

/// `DEBUG=0` disables debug output, any other value enables it
pub fn debug_enabled(value: &str) -> bool {
    value != "0"
}

/// Partial settings, as read from a TOML file or gathered from the command line
///
/// Every field is optional; unset fields fall through to the next source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub listen_addr: Option<SocketAddr>,
    pub state_file: Option<PathBuf>,
    pub base_path: Option<PathBuf>,
    pub helper_binary: Option<PathBuf>,
    pub helper_args: Option<Vec<String>>,
    pub log_dir: Option<PathBuf>,
    pub debug: Option<bool>,
    pub removal_policy: Option<RemovalPolicy>,
    pub startup_grace_ms: Option<u64>,
    pub terminate_timeout_ms: Option<u64>,
    pub kill_timeout_ms: Option<u64>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Layer `overrides` on top of `self`; set fields in `overrides` win
    pub fn merge(self, overrides: ConfigFile) -> ConfigFile {
        ConfigFile {
            listen_addr: overrides.listen_addr.or(self.listen_addr),
            state_file: overrides.state_file.or(self.state_file),
            base_path: overrides.base_path.or(self.base_path),
            helper_binary: overrides.helper_binary.or(self.helper_binary),
            helper_args: overrides.helper_args.or(self.helper_args),
            log_dir: overrides.log_dir.or(self.log_dir),
            debug: overrides.debug.or(self.debug),
            removal_policy: overrides.removal_policy.or(self.removal_policy),
            startup_grace_ms: overrides.startup_grace_ms.or(self.startup_grace_ms),
            terminate_timeout_ms: overrides.terminate_timeout_ms.or(self.terminate_timeout_ms),
            kill_timeout_ms: overrides.kill_timeout_ms.or(self.kill_timeout_ms),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Fully resolved daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the plugin API listens on
    pub listen_addr: SocketAddr,
    /// Snapshot of volume definitions
    pub state_file: PathBuf,
    pub removal_policy: RemovalPolicy,
    /// Helper, mountpoint, logging and timeout settings handed to every volume
    pub supervisor: SupervisorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config::from(ConfigFile::default())
    }
}

impl From<ConfigFile> for Config {
    fn from(file: ConfigFile) -> Self {
        let defaults = SupervisorConfig::default();
        Config {
            listen_addr: file.listen_addr.unwrap_or(DEFAULT_LISTEN_ADDR),
            state_file: file
                .state_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
            removal_policy: file.removal_policy.unwrap_or_default(),
            supervisor: SupervisorConfig {
                helper_binary: file.helper_binary.unwrap_or(defaults.helper_binary),
                helper_args: file.helper_args.unwrap_or(defaults.helper_args),
                base_path: file.base_path.unwrap_or(defaults.base_path),
                log_dir: file.log_dir.or(defaults.log_dir),
                debug: file.debug.unwrap_or(defaults.debug),
                startup_grace: file
                    .startup_grace_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.startup_grace),
                terminate_timeout: file
                    .terminate_timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.terminate_timeout),
                kill_timeout: file
                    .kill_timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.kill_timeout),
            },
        }
    }
}

impl Config {
    /// Resolve the configuration: `overrides` (CLI and environment) over the
    /// optional TOML file over built-in defaults
    pub fn load(path: Option<&Path>, overrides: ConfigFile) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        Ok(Config::from(file.merge(overrides)))
    }

    pub fn debug(&self) -> bool {
        self.supervisor.debug
    }

    /// The daemon log file, only written in debug mode
    pub fn log_file(&self) -> Option<PathBuf> {
        match &self.supervisor.log_dir {
            Some(dir) if self.debug() => Some(dir.join(LOG_FILE_NAME)),
            _ => None,
        }
    }
}
