use clap::Args;

use zkvol_daemon::http_server::api::client::ApiError;
use zkvol_daemon::http_server::plugin::{MountVolumeRequest, MountVolumeResponse};

use crate::cli::op::{Op, OpContext};

/// Take a mount reference, as Docker does when a container starts
#[derive(Args, Debug, Clone)]
pub struct Mount {
    /// Volume name
    pub name: String,

    /// Caller identifier recorded in the daemon log
    #[arg(long, default_value = "zkvol-cli")]
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl Op for Mount {
    type Error = MountError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let response: MountVolumeResponse = client
            .call(MountVolumeRequest {
                name: self.name.clone(),
                id: Some(self.id.clone()),
            })
            .await?;

        Ok(response.mountpoint)
    }
}

impl std::fmt::Display for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "volume mount {}", self.name)
    }
}
