//! Mount volume endpoint
//!
//! Docker calls this once per container using the volume; the helper is
//! only spawned for the first one.

use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::{with_registry, PluginError, PluginRequest, PluginResponse};
use crate::http_server::api::client::{endpoint, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountVolumeRequest {
    pub name: String,
    /// Identifier of the caller, logged only
    #[serde(rename = "ID", default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountVolumeResponse {
    #[serde(rename = "Mountpoint")]
    pub mountpoint: String,
    #[serde(rename = "Err")]
    pub err: String,
}

pub async fn handler(
    State(state): State<ServiceState>,
    PluginRequest(request): PluginRequest<MountVolumeRequest>,
) -> Result<impl IntoResponse, PluginError> {
    tracing::debug!(volume = %request.name, id = ?request.id, "VolumeDriver.Mount");
    let name = request.name;
    let mountpoint = with_registry(&state, move |registry| registry.mount(&name)).await?;

    Ok(PluginResponse(MountVolumeResponse {
        mountpoint: mountpoint.display().to_string(),
        err: String::new(),
    }))
}

impl ApiRequest for MountVolumeRequest {
    type Response = MountVolumeResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client
            .post(endpoint(base_url, "/VolumeDriver.Mount"))
            .json(&self)
    }
}
