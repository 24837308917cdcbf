use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::http_server::api::client::{endpoint, ApiRequest};

/// Request type for the liveness probe endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivezRequest {}

/// Response type for the liveness probe endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivezResponse {
    pub status: String,
}

impl ApiRequest for LivezRequest {
    type Response = LivezResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client.get(endpoint(base_url, "/_status/livez"))
    }
}

/// Always answers ok while the process is able to serve requests. Says nothing
/// about the helpers; a dead helper shows up in `VolumeDriver.Get` instead.
#[tracing::instrument]
pub async fn handler() -> Response {
    let msg = serde_json::json!({"status": "ok"});
    (StatusCode::OK, Json(msg)).into_response()
}
