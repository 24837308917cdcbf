use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use zkvol_daemon::http_server::api::client::ApiError;
use zkvol_daemon::http_server::health::liveness::LivezRequest;
use zkvol_daemon::http_server::plugin::{ActivateRequest, CapabilitiesRequest};
use zkvol_daemon::ServiceConfig;

#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug)]
pub struct ConfigInfo {
    pub listen_addr: String,
    pub state_file: PathBuf,
    pub state_file_present: bool,
    pub base_path: PathBuf,
    pub helper_binary: PathBuf,
    pub helper_present: bool,
    pub removal_policy: String,
}

#[derive(Debug)]
pub enum EndpointStatus {
    Ok(String),
    Unhealthy(String),
    NotReachable,
}

#[derive(Debug)]
pub struct DaemonInfo {
    pub url: String,
    pub livez: EndpointStatus,
    pub activate: EndpointStatus,
    pub scope: EndpointStatus,
}

#[derive(Debug)]
pub struct HealthOutput {
    pub config: Option<ConfigInfo>,
    pub config_error: Option<String>,
    pub daemon: DaemonInfo,
}

fn presence(present: bool) -> String {
    if present {
        "OK".green().to_string()
    } else {
        "MISSING".yellow().to_string()
    }
}

impl fmt::Display for HealthOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", "Config".bold())?;
        match (&self.config, &self.config_error) {
            (Some(info), _) => {
                writeln!(f, "  {} {}", "listen_addr:".dimmed(), info.listen_addr)?;
                writeln!(
                    f,
                    "  {} {} {}",
                    "state_file:".dimmed(),
                    info.state_file.display(),
                    presence(info.state_file_present)
                )?;
                writeln!(f, "  {} {}", "base_path:".dimmed(), info.base_path.display())?;
                writeln!(
                    f,
                    "  {} {} {}",
                    "helper:".dimmed(),
                    info.helper_binary.display(),
                    presence(info.helper_present)
                )?;
                writeln!(
                    f,
                    "  {} {}",
                    "removal_policy:".dimmed(),
                    info.removal_policy
                )?;
            }
            (None, Some(err)) => writeln!(f, "  {} {}", "error:".red(), err)?,
            (None, None) => writeln!(f, "  {}", "no config file given".dimmed())?,
        }

        writeln!(f)?;
        writeln!(f, "{} ({}):", "Daemon".bold(), self.daemon.url)?;

        let status_str = |s: &EndpointStatus| -> String {
            match s {
                EndpointStatus::Ok(detail) if detail.is_empty() => "OK".green().to_string(),
                EndpointStatus::Ok(detail) => format!("{} ({})", "OK".green(), detail),
                EndpointStatus::Unhealthy(reason) => {
                    format!("{} ({})", "UNHEALTHY".red(), reason)
                }
                EndpointStatus::NotReachable => "NOT REACHABLE".red().to_string(),
            }
        };

        writeln!(
            f,
            "  {} {}",
            "livez:".dimmed(),
            status_str(&self.daemon.livez)
        )?;
        writeln!(
            f,
            "  {} {}",
            "activate:".dimmed(),
            status_str(&self.daemon.activate)
        )?;
        write!(
            f,
            "  {} {}",
            "scope:".dimmed(),
            status_str(&self.daemon.scope)
        )
    }
}

fn endpoint_status<T>(
    result: Result<T, ApiError>,
    detail: impl FnOnce(T) -> String,
) -> EndpointStatus {
    match result {
        Ok(response) => EndpointStatus::Ok(detail(response)),
        Err(ApiError::HttpStatus(status, message)) => {
            EndpointStatus::Unhealthy(format!("{status}: {message}"))
        }
        Err(_) => EndpointStatus::NotReachable,
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    // Problems are part of the report, not failures of the command
    type Error = std::convert::Infallible;
    type Output = HealthOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (config, config_error) = match &ctx.config_path {
            Some(path) => match ServiceConfig::load(Some(path.as_path()), Default::default()) {
                Ok(config) => (
                    Some(ConfigInfo {
                        listen_addr: config.listen_addr.to_string(),
                        state_file_present: config.state_file.is_file(),
                        state_file: config.state_file,
                        base_path: config.supervisor.base_path,
                        helper_present: config.supervisor.helper_binary.is_file(),
                        helper_binary: config.supervisor.helper_binary,
                        removal_policy: config.removal_policy.to_string(),
                    }),
                    None,
                ),
                Err(e) => (None, Some(e.to_string())),
            },
            None => (None, None),
        };

        let mut client = ctx.client.clone();
        let livez = endpoint_status(client.call(LivezRequest {}).await, |r| {
            if r.status == "ok" {
                String::new()
            } else {
                r.status
            }
        });
        let activate = endpoint_status(client.call(ActivateRequest {}).await, |r| {
            r.implements.join(", ")
        });
        let scope = endpoint_status(client.call(CapabilitiesRequest {}).await, |r| {
            r.capabilities.scope
        });

        Ok(HealthOutput {
            config,
            config_error,
            daemon: DaemonInfo {
                url: ctx.client.base_url().to_string(),
                livez,
                activate,
                scope,
            },
        })
    }
}
