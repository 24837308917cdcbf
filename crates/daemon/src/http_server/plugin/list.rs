use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::{with_registry, PluginError, PluginResponse};
use crate::http_server::api::client::{endpoint, ApiRequest};
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListVolumesRequest {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeSummary {
    pub name: String,
    pub mountpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListVolumesResponse {
    #[serde(rename = "Volumes")]
    pub volumes: Vec<VolumeSummary>,
    #[serde(rename = "Err")]
    pub err: String,
}

pub async fn handler(State(state): State<ServiceState>) -> Result<impl IntoResponse, PluginError> {
    tracing::debug!("VolumeDriver.List");
    let mut volumes = with_registry(&state, |registry| {
        Ok(registry
            .list()
            .iter()
            .map(|volume| VolumeSummary {
                name: volume.name().to_string(),
                mountpoint: volume.mountpoint().display().to_string(),
            })
            .collect::<Vec<_>>())
    })
    .await?;
    volumes.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(PluginResponse(ListVolumesResponse {
        volumes,
        err: String::new(),
    }))
}

impl ApiRequest for ListVolumesRequest {
    type Response = ListVolumesResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client.post(endpoint(base_url, "/VolumeDriver.List"))
    }
}
