//! Registry of named volumes
//!
//! One instance is built at process start from the persisted snapshot and
//! shared by reference with whatever dispatches client requests. The map
//! lock is only held for lookups, inserts, removals and the snapshot write;
//! helper spawn and teardown run under the volume's own lock.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::host_set::HostSet;
use crate::id_allocator::IdAllocator;
use crate::store::SnapshotStore;
use crate::volume::supervisor::SupervisorConfig;
use crate::volume::{LeafMode, Volume, VolumeConfig, VolumeError};

/// What removing a mounted volume does
///
/// `Reject` refuses while any mount reference is held. `Force` tears the
/// helper down regardless, for orchestrators that skip the unmount call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    #[default]
    Reject,
    Force,
}

impl RemovalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalPolicy::Reject => "reject",
            RemovalPolicy::Force => "force",
        }
    }
}

impl FromStr for RemovalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(RemovalPolicy::Reject),
            "force" => Ok(RemovalPolicy::Force),
            other => Err(format!("unknown removal policy: {other}")),
        }
    }
}

impl fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for a volume that may not exist yet
///
/// `hosts` and `path` are only required when the volume has to be created.
#[derive(Debug, Clone, Default)]
pub struct VolumeOptions {
    pub hosts: Option<HostSet>,
    pub path: Option<String>,
    pub mode: LeafMode,
    pub auth: Option<String>,
}

impl VolumeOptions {
    pub fn new(hosts: HostSet, path: impl Into<String>) -> Self {
        Self {
            hosts: Some(hosts),
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: LeafMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_auth(mut self, auth: impl Into<String>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    fn into_config(self, name: &str) -> Result<VolumeConfig, RegistryError> {
        match (self.hosts, self.path) {
            (Some(hosts), Some(path)) => Ok(VolumeConfig {
                hosts,
                name: name.to_string(),
                path,
                mode: self.mode,
                auth: self.auth.filter(|a| !a.is_empty()),
            }),
            _ => Err(RegistryError::MissingConfiguration(name.to_string())),
        }
    }
}

pub struct VolumeRegistry {
    volumes: Mutex<HashMap<String, Arc<Volume>>>,
    allocator: Arc<IdAllocator>,
    supervisor: Arc<SupervisorConfig>,
    store: SnapshotStore,
    removal_policy: RemovalPolicy,
    shut_down: AtomicBool,
}

impl VolumeRegistry {
    /// Build the registry from the persisted snapshot
    ///
    /// Every volume comes back unmounted with a freshly allocated mount
    /// identifier. An absent or unreadable snapshot yields an empty registry.
    pub fn open(
        store: SnapshotStore,
        supervisor: SupervisorConfig,
        removal_policy: RemovalPolicy,
    ) -> Self {
        let allocator = Arc::new(IdAllocator::new());
        let supervisor = Arc::new(supervisor);

        let mut volumes = HashMap::new();
        for config in store.load() {
            let name = config.name.clone();
            let volume = Volume::new(config, allocator.clone(), supervisor.clone());
            if volumes.insert(name.clone(), Arc::new(volume)).is_some() {
                tracing::warn!(volume = %name, "duplicate volume in snapshot, keeping the last one");
            }
        }
        tracing::info!(
            path = %store.path().display(),
            policy = %removal_policy,
            "loaded {} volumes",
            volumes.len()
        );

        Self {
            volumes: Mutex::new(volumes),
            allocator,
            supervisor,
            store,
            removal_policy,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        self.removal_policy
    }

    pub fn supervisor_config(&self) -> &SupervisorConfig {
        &self.supervisor
    }

    pub fn base_path(&self) -> &Path {
        &self.supervisor.base_path
    }

    pub fn exists(&self, name: &str) -> bool {
        self.volumes.lock().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<Arc<Volume>, RegistryError> {
        self.volumes
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Return the named volume, creating it from `options` if unknown
    ///
    /// For an existing volume `options` are ignored. Creating requires hosts
    /// and path. Does not persist; call [`VolumeRegistry::persist`] once the
    /// batch of changes is done.
    pub fn get_or_create(
        &self,
        name: &str,
        options: VolumeOptions,
    ) -> Result<Arc<Volume>, RegistryError> {
        let mut volumes = self.volumes.lock();
        if let Some(volume) = volumes.get(name) {
            return Ok(volume.clone());
        }
        let volume = self.build(name, options)?;
        volumes.insert(name.to_string(), volume.clone());
        Ok(volume)
    }

    /// Create a new volume, failing if the name is taken
    pub fn create(&self, name: &str, options: VolumeOptions) -> Result<Arc<Volume>, RegistryError> {
        let mut volumes = self.volumes.lock();
        if volumes.contains_key(name) {
            return Err(RegistryError::AlreadyExists(name.to_string()));
        }
        let volume = self.build(name, options)?;
        volumes.insert(name.to_string(), volume.clone());
        tracing::info!(
            volume = %name,
            hosts = %volume.config().hosts,
            path = %volume.config().path,
            mount_id = volume.mount_id(),
            "created volume"
        );
        Ok(volume)
    }

    /// Unregister a volume and release its resources
    ///
    /// Under [`RemovalPolicy::Reject`] a volume with active mounts is left
    /// registered and [`RegistryError::InUse`] is returned. Under
    /// [`RemovalPolicy::Force`] its helper is torn down first. Does not
    /// persist.
    pub fn remove(&self, name: &str) -> Result<(), RegistryError> {
        let volume = self.get(name)?;
        let force = self.removal_policy == RemovalPolicy::Force;

        let result = volume.retire(force);
        if let Err(VolumeError::InUse { .. } | VolumeError::Removed(_)) = result {
            return result.map_err(Into::into);
        }

        // Past this point the volume refuses mounts, so it leaves the map
        // even if its helper could not be stopped.
        {
            let mut volumes = self.volumes.lock();
            if volumes.get(name).is_some_and(|v| Arc::ptr_eq(v, &volume)) {
                volumes.remove(name);
            }
        }
        tracing::info!(volume = %name, "removed volume");
        result.map_err(Into::into)
    }

    /// Take a mount reference on the named volume
    pub fn mount(&self, name: &str) -> Result<PathBuf, RegistryError> {
        let volume = self.get(name)?;
        Ok(volume.on_mount()?)
    }

    /// Release a mount reference on the named volume
    pub fn unmount(&self, name: &str) -> Result<(), RegistryError> {
        let volume = self.get(name)?;
        Ok(volume.on_unmount()?)
    }

    /// Release a mount reference if the named volume holds one
    ///
    /// Returns `false` for a volume nobody has mounted.
    pub fn release(&self, name: &str) -> Result<bool, RegistryError> {
        let volume = self.get(name)?;
        Ok(volume.release_if_held()?)
    }

    /// Snapshot of the registered volumes, in no particular order
    pub fn list(&self) -> Vec<Arc<Volume>> {
        self.volumes.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.volumes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.lock().is_empty()
    }

    /// Write every volume definition to the snapshot
    ///
    /// On failure the in-memory registry is unchanged and stays
    /// authoritative; the next successful persist catches the file up.
    pub fn persist(&self) -> Result<(), RegistryError> {
        if self.shut_down.load(Ordering::SeqCst) {
            tracing::debug!("registry is shut down, not persisting");
            return Ok(());
        }

        let volumes = self.volumes.lock();
        let mut configs: Vec<VolumeConfig> =
            volumes.values().map(|v| v.config().clone()).collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));

        self.store.save(&configs).map_err(|e| {
            tracing::error!("failed to persist volume snapshot: {}", e);
            RegistryError::from(e)
        })
    }

    /// Unmount and release every volume
    ///
    /// Idempotent. Meant to be called once by the service runner on exit;
    /// teardown failures are logged, not returned, so every volume gets its
    /// turn.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::warn!("zookeeper-volume terminating");

        let drained: Vec<Arc<Volume>> = self.volumes.lock().drain().map(|(_, v)| v).collect();
        for volume in drained {
            if let Err(e) = volume.close() {
                tracing::error!(volume = %volume.name(), "failed to release volume: {}", e);
            }
        }
    }

    fn build(&self, name: &str, options: VolumeOptions) -> Result<Arc<Volume>, RegistryError> {
        let config = options.into_config(name)?;
        Ok(Arc::new(Volume::new(
            config,
            self.allocator.clone(),
            self.supervisor.clone(),
        )))
    }
}

impl fmt::Debug for VolumeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeRegistry")
            .field("volumes", &self.len())
            .field("store", &self.store.path())
            .field("removal_policy", &self.removal_policy)
            .finish_non_exhaustive()
    }
}
