use std::collections::BTreeMap;

use clap::Args;

use common::LeafMode;
use zkvol_daemon::http_server::api::client::ApiError;
use zkvol_daemon::http_server::plugin::{CreateVolumeRequest, CreateVolumeResponse};

use crate::cli::op::{Op, OpContext};

#[derive(Args, Debug, Clone)]
pub struct Create {
    /// Volume name
    pub name: String,

    /// ZooKeeper endpoint, host:port (repeatable)
    #[arg(long = "host", required = true)]
    pub hosts: Vec<String>,

    /// Path inside ZooKeeper to expose
    #[arg(long, default_value = "/")]
    pub path: String,

    /// How leaf nodes are exposed: DIR or FILE
    #[arg(long)]
    pub mode: Option<LeafMode>,

    /// ZooKeeper authentication, e.g. digest:user:password
    #[arg(long, env = "ZKVOL_AUTH", hide_env_values = true)]
    pub auth: Option<String>,
}

impl Create {
    /// The same options `docker volume create -o` would send
    fn opts(&self) -> BTreeMap<String, String> {
        let mut opts = BTreeMap::new();
        opts.insert("hosts".to_string(), self.hosts.join(","));
        opts.insert("path".to_string(), self.path.clone());
        if let Some(mode) = self.mode {
            opts.insert("mode".to_string(), mode.to_string());
        }
        if let Some(auth) = &self.auth {
            opts.insert("auth".to_string(), auth.clone());
        }
        opts
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
}

#[async_trait::async_trait]
impl Op for Create {
    type Error = CreateError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = ctx.client.clone();
        let _: CreateVolumeResponse = client
            .call(CreateVolumeRequest {
                name: self.name.clone(),
                opts: Some(self.opts()),
            })
            .await?;

        Ok(format!("Created volume {}", self.name))
    }
}

impl std::fmt::Display for Create {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "volume create {}", self.name)
    }
}
