use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::RegistryError;

use super::{with_registry, ErrResponse, PluginError, PluginRequest, PluginResponse};
use crate::http_server::api::client::{endpoint, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoveVolumeRequest {
    pub name: String,
}

pub type RemoveVolumeResponse = ErrResponse;

pub async fn handler(
    State(state): State<ServiceState>,
    PluginRequest(request): PluginRequest<RemoveVolumeRequest>,
) -> Result<impl IntoResponse, PluginError> {
    tracing::debug!(volume = %request.name, "VolumeDriver.Remove");
    let name = request.name;
    with_registry(&state, move |registry| {
        let removed = registry.remove(&name);
        // A failed teardown still unregisters the volume
        if let Err(RegistryError::NotFound(_) | RegistryError::InUse { .. }) = removed {
            return removed;
        }
        registry.persist()?;
        removed
    })
    .await?;

    Ok(PluginResponse(RemoveVolumeResponse::default()))
}

impl ApiRequest for RemoveVolumeRequest {
    type Response = RemoveVolumeResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client
            .post(endpoint(base_url, "/VolumeDriver.Remove"))
            .json(&self)
    }
}
