use std::sync::Arc;

use common::{SnapshotStore, VolumeRegistry};

use super::service_config::Config;

/// Main service state, shared by every request handler
#[derive(Clone, Debug)]
pub struct State {
    registry: Arc<VolumeRegistry>,
}

impl State {
    /// Load the volume snapshot and build the registry
    ///
    /// Blocks on file I/O; call before the runtime starts serving requests.
    pub fn from_config(config: &Config) -> Self {
        tracing::info!(state_file = %config.state_file.display(), "loading volume registry");
        let registry = VolumeRegistry::open(
            SnapshotStore::new(config.state_file.clone()),
            config.supervisor.clone(),
            config.removal_policy,
        );
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &Arc<VolumeRegistry> {
        &self.registry
    }
}
