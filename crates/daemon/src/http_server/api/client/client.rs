use reqwest::{header::HeaderMap, header::HeaderValue, Client};
use serde::Deserialize;
use url::Url;

use super::error::ApiError;
use super::ApiRequest;
use crate::http_server::plugin::PLUGIN_CONTENT_TYPE;

#[derive(Debug, Clone)]
pub struct ApiClient {
    pub remote: Url,
    client: Client,
}

/// Body of a failed plugin call
#[derive(Debug, Deserialize)]
struct ErrBody {
    #[serde(rename = "Err")]
    err: String,
}

impl ApiClient {
    pub fn new(remote: &Url) -> Result<Self, ApiError> {
        if remote.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(remote.to_string()));
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            "Content-Type",
            HeaderValue::from_static(PLUGIN_CONTENT_TYPE),
        );
        let client = Client::builder().default_headers(default_headers).build()?;

        Ok(Self {
            remote: remote.clone(),
            client,
        })
    }

    pub async fn call<T: ApiRequest>(&mut self, request: T) -> Result<T::Response, ApiError> {
        let request_builder = request.build_request(&self.remote, &self.client);
        let response = request_builder.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T::Response>().await?);
        }

        // Plugin errors carry their message in {"Err": ...}
        let text = response.text().await?;
        let message = match serde_json::from_str::<ErrBody>(&text) {
            Ok(body) => body.err,
            Err(_) => text,
        };
        Err(ApiError::HttpStatus(status, message))
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> &Url {
        &self.remote
    }
}
