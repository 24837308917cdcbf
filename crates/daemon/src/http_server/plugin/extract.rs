use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::PluginError;
use super::PLUGIN_CONTENT_TYPE;

/// JSON request body, parsed whatever the declared content type
///
/// Docker sends `application/vnd.docker.plugins.v1+json` (or nothing at all),
/// which axum's `Json` extractor refuses.
#[derive(Debug, Clone)]
pub struct PluginRequest<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for PluginRequest<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = PluginError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| PluginError::BadRequest(e.body_text()))?;
        let value = serde_json::from_slice(&body)
            .map_err(|e| PluginError::BadRequest(format!("invalid JSON body: {e}")))?;
        Ok(PluginRequest(value))
    }
}

/// JSON response tagged with the plugin content type
#[derive(Debug, Clone)]
pub struct PluginResponse<T>(pub T);

impl<T: Serialize> IntoResponse for PluginResponse<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(body) => (
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static(PLUGIN_CONTENT_TYPE),
                )],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("failed to serialize plugin response: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
        }
    }
}
