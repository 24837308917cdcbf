use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;

use common::RemovalPolicy;
use zkvol_daemon::service_config::{debug_enabled, ConfigError, ConfigFile};
use zkvol_daemon::ServiceConfig;

/// Run the plugin daemon in the foreground
///
/// Flags override the config file, which overrides built-in defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct Daemon {
    /// Address to serve the plugin API on (default 127.0.0.1:8095)
    #[arg(long, env = "ZKVOL_LISTEN_ADDR")]
    pub listen_addr: Option<SocketAddr>,

    /// Snapshot of volume definitions
    #[arg(long, env = "ZKVOL_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Directory holding one mountpoint per volume
    #[arg(long, env = "ZKVOL_BASE_PATH")]
    pub base_path: Option<PathBuf>,

    /// Mount helper executable
    #[arg(long, env = "ZKVOL_HELPER")]
    pub helper_binary: Option<PathBuf>,

    /// Extra argument passed to the helper before the generated ones (repeatable)
    #[arg(long = "helper-arg", allow_hyphen_values = true)]
    pub helper_args: Vec<String>,

    /// Where debug logs of the daemon and its helpers are written
    #[arg(long, env = "ZKVOL_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Verbose logging and helper debug output; DEBUG=0 turns it off
    #[arg(
        long,
        env = "DEBUG",
        num_args = 0..=1,
        default_missing_value = "1",
        value_parser = parse_debug
    )]
    pub debug: Option<bool>,

    /// What removing a mounted volume does: reject or force
    #[arg(long, env = "ZKVOL_REMOVAL_POLICY")]
    pub removal_policy: Option<RemovalPolicy>,

    /// How long a new helper must stay up to count as mounted
    #[arg(long)]
    pub startup_grace_ms: Option<u64>,

    /// How long to wait for a helper to exit after SIGTERM
    #[arg(long)]
    pub terminate_timeout_ms: Option<u64>,

    /// How long to wait for a helper to exit after SIGKILL
    #[arg(long)]
    pub kill_timeout_ms: Option<u64>,
}

fn parse_debug(value: &str) -> Result<bool, String> {
    Ok(debug_enabled(value))
}

impl Daemon {
    /// Settings given on the command line or through the environment
    fn overrides(&self) -> ConfigFile {
        ConfigFile {
            listen_addr: self.listen_addr,
            state_file: self.state_file.clone(),
            base_path: self.base_path.clone(),
            helper_binary: self.helper_binary.clone(),
            helper_args: (!self.helper_args.is_empty()).then(|| self.helper_args.clone()),
            log_dir: self.log_dir.clone(),
            debug: self.debug,
            removal_policy: self.removal_policy,
            startup_grace_ms: self.startup_grace_ms,
            terminate_timeout_ms: self.terminate_timeout_ms,
            kill_timeout_ms: self.kill_timeout_ms,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Service(#[from] anyhow::Error),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = ServiceConfig::load(ctx.config_path.as_deref(), self.overrides())?;
        zkvol_daemon::spawn_service(&config).await?;
        Ok("daemon ended".to_string())
    }
}

impl std::fmt::Display for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "daemon")
    }
}
