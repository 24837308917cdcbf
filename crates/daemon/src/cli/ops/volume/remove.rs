use clap::Args;

use zkvol_daemon::http_server::api::client::ApiError;
use zkvol_daemon::http_server::plugin::{RemoveVolumeRequest, RemoveVolumeResponse};

use crate::cli::op::{Op, OpContext};

#[derive(Args, Debug, Clone)]
pub struct Remove {
    /// Volume name
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoveError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl Op for Remove {
    type Error = RemoveError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let _: RemoveVolumeResponse = client
            .call(RemoveVolumeRequest {
                name: self.name.clone(),
            })
            .await?;

        Ok(format!("Removed volume {}", self.name))
    }
}

impl std::fmt::Display for Remove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "volume rm {}", self.name)
    }
}
