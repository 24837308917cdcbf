//! Get volume endpoint
//!
//! Besides name and mountpoint, Docker shows the free-form `Status` object in
//! `docker volume inspect`; it carries the live mount state.

use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::{LeafMode, MountStatus, Volume};

use super::{with_registry, PluginError, PluginRequest, PluginResponse};
use crate::http_server::api::client::{endpoint, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetVolumeRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetVolumeResponse {
    #[serde(rename = "Volume")]
    pub volume: VolumeDetail,
    #[serde(rename = "Err")]
    pub err: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeDetail {
    pub name: String,
    pub mountpoint: String,
    pub status: VolumeStatusInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeStatusInfo {
    pub hosts: String,
    pub path: String,
    pub mode: LeafMode,
    pub mount_id: u32,
    pub refcount: usize,
    pub in_use: bool,
    pub alive: bool,
    pub status: MountStatus,
    pub pid: Option<u32>,
    pub last_exit_code: Option<i32>,
}

impl From<&Volume> for VolumeDetail {
    fn from(volume: &Volume) -> Self {
        let status = volume.status();
        let config = volume.config();
        VolumeDetail {
            name: config.name.clone(),
            mountpoint: volume.mountpoint().display().to_string(),
            status: VolumeStatusInfo {
                hosts: config.hosts.to_arg(),
                path: config.path.clone(),
                mode: config.mode,
                mount_id: status.mount_id,
                refcount: status.refcount,
                in_use: status.in_use(),
                alive: status.alive,
                status: status.status,
                pid: status.pid,
                last_exit_code: status.last_exit_code,
            },
        }
    }
}

pub async fn handler(
    State(state): State<ServiceState>,
    PluginRequest(request): PluginRequest<GetVolumeRequest>,
) -> Result<impl IntoResponse, PluginError> {
    tracing::debug!(volume = %request.name, "VolumeDriver.Get");
    let name = request.name;
    // status() takes the volume lock, which a slow mount may be holding
    let volume = with_registry(&state, move |registry| {
        let volume = registry.get(&name)?;
        Ok(VolumeDetail::from(volume.as_ref()))
    })
    .await?;

    Ok(PluginResponse(GetVolumeResponse {
        volume,
        err: String::new(),
    }))
}

impl ApiRequest for GetVolumeRequest {
    type Response = GetVolumeResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client
            .post(endpoint(base_url, "/VolumeDriver.Get"))
            .json(&self)
    }
}
