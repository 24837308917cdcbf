//! Plugin handshake

use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use super::PluginResponse;
use crate::http_server::api::client::{endpoint, ApiRequest};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivateRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivateResponse {
    pub implements: Vec<String>,
}

pub async fn handler() -> impl IntoResponse {
    tracing::debug!("Plugin.Activate");
    PluginResponse(ActivateResponse {
        implements: vec!["VolumeDriver".to_string()],
    })
}

impl ApiRequest for ActivateRequest {
    type Response = ActivateResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client.post(endpoint(base_url, "/Plugin.Activate"))
    }
}
