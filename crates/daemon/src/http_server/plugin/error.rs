use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use common::{HostSetError, LeafModeError, RegistryError};

use super::extract::PluginResponse;

/// Body of every plugin response that only reports success or failure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrResponse {
    #[serde(rename = "Err")]
    pub err: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("malformed request: {0}")]
    BadRequest(String),
    #[error("invalid hosts option: {0}")]
    InvalidHosts(#[from] HostSetError),
    #[error("invalid mode option: {0}")]
    InvalidMode(#[from] LeafModeError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("request worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl PluginError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PluginError::BadRequest(_)
            | PluginError::InvalidHosts(_)
            | PluginError::InvalidMode(_) => StatusCode::BAD_REQUEST,
            PluginError::Registry(e) => match e {
                RegistryError::MissingConfiguration(_) => StatusCode::BAD_REQUEST,
                RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
                RegistryError::AlreadyExists(_) | RegistryError::InUse { .. } => {
                    StatusCode::CONFLICT
                }
                RegistryError::Mount { .. }
                | RegistryError::Teardown { .. }
                | RegistryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            PluginError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PluginError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", self);
        } else {
            tracing::warn!(status = status.as_u16(), "{}", self);
        }

        (
            status,
            PluginResponse(ErrResponse {
                err: self.to_string(),
            }),
        )
            .into_response()
    }
}
