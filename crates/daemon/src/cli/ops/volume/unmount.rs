use clap::Args;

use zkvol_daemon::http_server::api::client::ApiError;
use zkvol_daemon::http_server::plugin::{UnmountVolumeRequest, UnmountVolumeResponse};

use crate::cli::op::{Op, OpContext};

/// Release a mount reference taken with `volume mount`
#[derive(Args, Debug, Clone)]
pub struct Unmount {
    /// Volume name
    pub name: String,

    /// Caller identifier recorded in the daemon log
    #[arg(long, default_value = "zkvol-cli")]
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UnmountError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl Op for Unmount {
    type Error = UnmountError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let _: UnmountVolumeResponse = client
            .call(UnmountVolumeRequest {
                name: self.name.clone(),
                id: Some(self.id.clone()),
            })
            .await?;

        Ok(format!("Unmounted volume {}", self.name))
    }
}

impl std::fmt::Display for Unmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "volume unmount {}", self.name)
    }
}
