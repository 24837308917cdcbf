//! Docker volume plugin protocol
//!
//! Every endpoint is a `POST` carrying a small JSON document and answering
//! with `application/vnd.docker.plugins.v1+json`. Failures are reported as
//! `{"Err": "<message>"}` with a status code chosen by [`PluginError`].
//!
//! Registry calls may block for seconds while a helper starts or stops, so
//! handlers run them on tokio's blocking pool through [`with_registry`].

use axum::routing::post;
use axum::Router;

use common::{RegistryError, VolumeRegistry};

use crate::ServiceState;

mod activate;
mod capabilities;
mod create;
mod error;
mod extract;
mod get;
mod list;
mod mount;
mod path;
mod remove;
mod unmount;

// Re-export request/response types for use by the CLI and other clients
pub use activate::{ActivateRequest, ActivateResponse};
pub use capabilities::{Capabilities, CapabilitiesRequest, CapabilitiesResponse};
pub use create::{CreateVolumeRequest, CreateVolumeResponse};
pub use error::{ErrResponse, PluginError};
pub use extract::{PluginRequest, PluginResponse};
pub use get::{GetVolumeRequest, GetVolumeResponse, VolumeDetail, VolumeStatusInfo};
pub use list::{ListVolumesRequest, ListVolumesResponse, VolumeSummary};
pub use mount::{MountVolumeRequest, MountVolumeResponse};
pub use path::{VolumePathRequest, VolumePathResponse};
pub use remove::{RemoveVolumeRequest, RemoveVolumeResponse};
pub use unmount::{UnmountVolumeRequest, UnmountVolumeResponse};

/// Content type of every plugin response
pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1+json";

pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/Plugin.Activate", post(activate::handler))
        .route("/VolumeDriver.Create", post(create::handler))
        .route("/VolumeDriver.Remove", post(remove::handler))
        .route("/VolumeDriver.Mount", post(mount::handler))
        .route("/VolumeDriver.Unmount", post(unmount::handler))
        .route("/VolumeDriver.Path", post(path::handler))
        .route("/VolumeDriver.Get", post(get::handler))
        .route("/VolumeDriver.List", post(list::handler))
        .route("/VolumeDriver.Capabilities", post(capabilities::handler))
        .with_state(state)
}

/// Run `f` against the registry on the blocking pool
async fn with_registry<F, T>(state: &ServiceState, f: F) -> Result<T, PluginError>
where
    F: FnOnce(&VolumeRegistry) -> Result<T, RegistryError> + Send + 'static,
    T: Send + 'static,
{
    let registry = state.registry().clone();
    let result = tokio::task::spawn_blocking(move || f(&registry)).await?;
    Ok(result?)
}
