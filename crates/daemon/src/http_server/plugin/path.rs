use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::{with_registry, PluginError, PluginRequest, PluginResponse};
use crate::http_server::api::client::{endpoint, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumePathRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumePathResponse {
    #[serde(rename = "Mountpoint")]
    pub mountpoint: String,
    #[serde(rename = "Err")]
    pub err: String,
}

/// Where the volume is (or would be) mounted; does not mount it
pub async fn handler(
    State(state): State<ServiceState>,
    PluginRequest(request): PluginRequest<VolumePathRequest>,
) -> Result<impl IntoResponse, PluginError> {
    tracing::debug!(volume = %request.name, "VolumeDriver.Path");
    let name = request.name;
    let mountpoint = with_registry(&state, move |registry| {
        Ok(registry.get(&name)?.mountpoint().to_path_buf())
    })
    .await?;

    Ok(PluginResponse(VolumePathResponse {
        mountpoint: mountpoint.display().to_string(),
        err: String::new(),
    }))
}

impl ApiRequest for VolumePathRequest {
    type Response = VolumePathResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client
            .post(endpoint(base_url, "/VolumeDriver.Path"))
            .json(&self)
    }
}
