use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::{with_registry, ErrResponse, PluginError, PluginRequest, PluginResponse};
use crate::http_server::api::client::{endpoint, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UnmountVolumeRequest {
    pub name: String,
    #[serde(rename = "ID", default)]
    pub id: Option<String>,
}

pub type UnmountVolumeResponse = ErrResponse;

pub async fn handler(
    State(state): State<ServiceState>,
    PluginRequest(request): PluginRequest<UnmountVolumeRequest>,
) -> Result<impl IntoResponse, PluginError> {
    tracing::debug!(volume = %request.name, id = ?request.id, "VolumeDriver.Unmount");
    let name = request.name;
    with_registry(&state, move |registry| {
        // Docker replays unmounts for containers it tracked before a daemon
        // restart; there is nothing to release for those.
        if !registry.release(&name)? {
            tracing::warn!(volume = %name, "unmount of a volume that is not mounted, ignoring");
        }
        Ok(())
    })
    .await?;

    Ok(PluginResponse(UnmountVolumeResponse::default()))
}

impl ApiRequest for UnmountVolumeRequest {
    type Response = UnmountVolumeResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client
            .post(endpoint(base_url, "/VolumeDriver.Unmount"))
            .json(&self)
    }
}
