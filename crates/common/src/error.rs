use crate::store::StorageError;
use crate::volume::supervisor::{MountError, TeardownError};
use crate::volume::VolumeError;

/// Failures surfaced by [`crate::VolumeRegistry`]
///
/// Each variant maps to a distinct client-visible response, so callers should
/// match on them rather than on the message.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("volume {0} is not known and hosts and path are required to create it")]
    MissingConfiguration(String),
    #[error("volume {0} does not exist")]
    NotFound(String),
    #[error("volume {0} already exists")]
    AlreadyExists(String),
    #[error("volume {name} is still in use ({refcount} active mounts)")]
    InUse { name: String, refcount: usize },
    #[error("failed to mount volume {name}: {source}")]
    Mount {
        name: String,
        #[source]
        source: MountError,
    },
    #[error("failed to tear down volume {name}: {source}")]
    Teardown {
        name: String,
        #[source]
        source: TeardownError,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<VolumeError> for RegistryError {
    fn from(err: VolumeError) -> Self {
        match err {
            VolumeError::Mount { name, source } => RegistryError::Mount { name, source },
            VolumeError::Teardown { name, source } => RegistryError::Teardown { name, source },
            VolumeError::InUse { name, refcount } => RegistryError::InUse { name, refcount },
            // Lost a race with a concurrent removal.
            VolumeError::Removed(name) => RegistryError::NotFound(name),
        }
    }
}
