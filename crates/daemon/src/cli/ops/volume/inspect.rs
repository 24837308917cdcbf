use std::fmt;

use clap::Args;
use comfy_table::Table;
use owo_colors::OwoColorize;

use zkvol_daemon::http_server::api::client::ApiError;
use zkvol_daemon::http_server::plugin::{GetVolumeRequest, GetVolumeResponse, VolumeDetail};

#[derive(Args, Debug, Clone)]
pub struct Inspect {
    /// Volume name
    pub name: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug)]
pub struct InspectOutput {
    pub volume: VolumeDetail,
    pub json: bool,
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for InspectOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.json {
            let json = serde_json::to_string_pretty(&self.volume).map_err(|_| fmt::Error)?;
            return write!(f, "{json}");
        }

        let status = &self.volume.status;
        let alive = if status.alive {
            "yes".green().to_string()
        } else {
            "no".dimmed().to_string()
        };

        let mut table = Table::new();
        table.add_row(vec!["name".to_string(), self.volume.name.clone()]);
        table.add_row(vec!["mountpoint".to_string(), self.volume.mountpoint.clone()]);
        table.add_row(vec!["hosts".to_string(), status.hosts.clone()]);
        table.add_row(vec!["path".to_string(), status.path.clone()]);
        table.add_row(vec!["mode".to_string(), status.mode.to_string()]);
        table.add_row(vec!["status".to_string(), status.status.to_string()]);
        table.add_row(vec!["mount id".to_string(), status.mount_id.to_string()]);
        table.add_row(vec!["refcount".to_string(), status.refcount.to_string()]);
        table.add_row(vec!["helper alive".to_string(), alive]);
        table.add_row(vec!["helper pid".to_string(), or_dash(status.pid)]);
        table.add_row(vec!["last exit code".to_string(), or_dash(status.last_exit_code)]);
        write!(f, "{table}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Inspect {
    type Error = InspectError;
    type Output = InspectOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response: GetVolumeResponse = client
            .call(GetVolumeRequest {
                name: self.name.clone(),
            })
            .await?;

        Ok(InspectOutput {
            volume: response.volume,
            json: self.json,
        })
    }
}
