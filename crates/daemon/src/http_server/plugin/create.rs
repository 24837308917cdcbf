//! Create volume endpoint
//!
//! Recognised options: `host` (a single endpoint) or `hosts` (comma
//! separated), `path` (default `/`), `mode` (`DIR` or `FILE`) and `auth`.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use common::{HostSet, LeafMode, VolumeOptions};

use super::{with_registry, ErrResponse, PluginError, PluginRequest, PluginResponse};
use crate::http_server::api::client::{endpoint, ApiRequest};
use crate::ServiceState;

const KNOWN_OPTIONS: [&str; 5] = ["host", "hosts", "path", "mode", "auth"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateVolumeRequest {
    pub name: String,
    #[serde(default)]
    pub opts: Option<BTreeMap<String, String>>,
}

pub type CreateVolumeResponse = ErrResponse;

pub async fn handler(
    State(state): State<ServiceState>,
    PluginRequest(request): PluginRequest<CreateVolumeRequest>,
) -> Result<impl IntoResponse, PluginError> {
    tracing::debug!(volume = %request.name, opts = ?request.opts, "VolumeDriver.Create");
    if request.name.is_empty() {
        return Err(PluginError::BadRequest("volume name is empty".to_string()));
    }

    let options = volume_options(&request.opts.unwrap_or_default())?;
    let name = request.name;
    with_registry(&state, move |registry| {
        registry.create(&name, options)?;
        registry.persist()
    })
    .await?;

    Ok(PluginResponse(CreateVolumeResponse::default()))
}

/// Translate Docker's `-o key=value` options into volume options
///
/// Missing hosts are left unset; the registry reports them.
fn volume_options(opts: &BTreeMap<String, String>) -> Result<VolumeOptions, PluginError> {
    let hosts = match (opts.get("host"), opts.get("hosts")) {
        (Some(host), _) => Some(HostSet::new([host])?),
        (None, Some(hosts)) => Some(hosts.parse::<HostSet>()?),
        (None, None) => None,
    };
    let mode = opts
        .get("mode")
        .map(|mode| mode.parse::<LeafMode>())
        .transpose()?
        .unwrap_or_default();

    for key in opts.keys().filter(|k| !KNOWN_OPTIONS.contains(&k.as_str())) {
        tracing::warn!(option = %key, "ignoring unknown volume option");
    }

    Ok(VolumeOptions {
        hosts,
        path: Some(opts.get("path").cloned().unwrap_or_else(|| "/".to_string())),
        mode,
        auth: opts.get("auth").cloned(),
    })
}

impl ApiRequest for CreateVolumeRequest {
    type Response = CreateVolumeResponse;

    fn build_request(self, base_url: &Url, client: &Client) -> RequestBuilder {
        client
            .post(endpoint(base_url, "/VolumeDriver.Create"))
            .json(&self)
    }
}
