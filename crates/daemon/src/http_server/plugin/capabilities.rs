use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::PluginResponse;
use crate::http_server::api::client::{endpoint, ApiRequest};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitiesRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Capabilities {
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CapabilitiesResponse {
    pub capabilities: Capabilities,
}

/// Volumes live in ZooKeeper, so every node sees the same ones
pub async fn handler() -> impl IntoResponse {
    tracing::debug!("VolumeDriver.Capabilities");
    PluginResponse(CapabilitiesResponse {
        capabilities: Capabilities {
            scope: "global".to_string(),
        },
    })
}

impl ApiRequest for CapabilitiesRequest {
    type Response = CapabilitiesResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client.post(endpoint(base_url, "/VolumeDriver.Capabilities"))
    }
}
