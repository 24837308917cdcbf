use std::fmt;

use clap::Args;
use comfy_table::Table;

use zkvol_daemon::http_server::api::client::ApiError;
use zkvol_daemon::http_server::plugin::{ListVolumesRequest, ListVolumesResponse, VolumeSummary};

#[derive(Args, Debug, Clone)]
pub struct List {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug)]
pub struct ListOutput {
    pub volumes: Vec<VolumeSummary>,
    pub json: bool,
}

impl fmt::Display for ListOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.json {
            let json = serde_json::to_string_pretty(&self.volumes).map_err(|_| fmt::Error)?;
            return write!(f, "{json}");
        }

        if self.volumes.is_empty() {
            return write!(f, "No volumes found");
        }

        let mut table = Table::new();
        table.set_header(vec!["NAME", "MOUNTPOINT"]);
        for volume in &self.volumes {
            table.add_row(vec![volume.name.clone(), volume.mountpoint.clone()]);
        }
        write!(f, "{table}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for List {
    type Error = ListError;
    type Output = ListOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response: ListVolumesResponse = client.call(ListVolumesRequest {}).await?;

        Ok(ListOutput {
            volumes: response.volumes,
            json: self.json,
        })
    }
}
