//! Volumes and their reference-counted mount state machine
//!
//! A volume is either Unmounted (no users, no helper) or Mounted (at least
//! one user, helper running). Mounting and Unmounting are only observable
//! while the helper is being spawned or torn down. Failed marks a volume
//! whose helper is not running although it was supposed to: a failed start,
//! or a helper that died under active users.

pub mod supervisor;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::host_set::HostSet;
use crate::id_allocator::IdAllocator;
use supervisor::{MountError, MountSupervisor, SupervisorConfig, TeardownError};

/// How the helper exposes ZooKeeper leaf nodes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LeafMode {
    #[default]
    Dir,
    File,
}

impl LeafMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeafMode::Dir => "DIR",
            LeafMode::File => "FILE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown leaf mode {0:?}, expected DIR or FILE")]
pub struct LeafModeError(pub String);

impl FromStr for LeafMode {
    type Err = LeafModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DIR" => Ok(LeafMode::Dir),
            "FILE" => Ok(LeafMode::File),
            _ => Err(LeafModeError(s.to_string())),
        }
    }
}

impl fmt::Display for LeafMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static definition of a volume, exactly what gets persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub hosts: HostSet,
    pub name: String,
    /// Path inside ZooKeeper to expose
    pub path: String,
    #[serde(default)]
    pub mode: LeafMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
}

/// Observable mount phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountStatus {
    Unmounted,
    Mounting,
    Mounted,
    Unmounting,
    Failed,
}

impl MountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountStatus::Unmounted => "unmounted",
            MountStatus::Mounting => "mounting",
            MountStatus::Mounted => "mounted",
            MountStatus::Unmounting => "unmounting",
            MountStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of a volume's runtime state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeStatus {
    pub mount_id: u32,
    pub refcount: usize,
    pub alive: bool,
    pub status: MountStatus,
    pub pid: Option<u32>,
    pub last_exit_code: Option<i32>,
}

impl VolumeStatus {
    pub fn in_use(&self) -> bool {
        self.refcount > 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("failed to mount volume {name}: {source}")]
    Mount {
        name: String,
        #[source]
        source: MountError,
    },
    #[error("failed to unmount volume {name}: {source}")]
    Teardown {
        name: String,
        #[source]
        source: TeardownError,
    },
    #[error("volume {name} is still in use ({refcount} active mounts)")]
    InUse { name: String, refcount: usize },
    #[error("volume {0} has been removed")]
    Removed(String),
}

struct MountState {
    refcount: usize,
    supervisor: MountSupervisor,
    /// Set once the volume left the registry; no further mounts
    removed: bool,
}

/// One named volume bound to a local mountpoint
pub struct Volume {
    config: VolumeConfig,
    mount_id: u32,
    mountpoint: PathBuf,
    allocator: Arc<IdAllocator>,
    state: Mutex<MountState>,
    status: RwLock<MountStatus>,
    closed: AtomicBool,
}

impl fmt::Debug for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Volume")
            .field("name", &self.config.name)
            .field("hosts", &self.config.hosts)
            .field("path", &self.config.path)
            .field("mode", &self.config.mode)
            .field("mount_id", &self.mount_id)
            .field("status", &*self.status.read())
            .finish_non_exhaustive()
    }
}

impl Volume {
    /// Create an unmounted volume, allocating its mount identifier
    pub fn new(
        config: VolumeConfig,
        allocator: Arc<IdAllocator>,
        supervisor: Arc<SupervisorConfig>,
    ) -> Self {
        let mount_id = allocator.allocate();
        let mountpoint = supervisor.mountpoint(mount_id);
        tracing::debug!(volume = %config.name, mount_id, "created volume");

        Self {
            config,
            mount_id,
            mountpoint,
            allocator,
            state: Mutex::new(MountState {
                refcount: 0,
                supervisor: MountSupervisor::new(supervisor),
                removed: false,
            }),
            status: RwLock::new(MountStatus::Unmounted),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    pub fn mount_id(&self) -> u32 {
        self.mount_id
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    pub fn refcount(&self) -> usize {
        self.state.lock().refcount
    }

    /// Current phase, readable while a transition is in flight
    pub fn mount_status(&self) -> MountStatus {
        *self.status.read()
    }

    /// Take a reference on the mount, spawning the helper on first use
    ///
    /// Blocks for the helper's startup grace period when a spawn is needed.
    /// A failed spawn leaves the refcount untouched, so retrying is safe.
    pub fn on_mount(&self) -> Result<PathBuf, VolumeError> {
        let mut state = self.state.lock();
        if state.removed {
            return Err(VolumeError::Removed(self.config.name.clone()));
        }

        if !state.supervisor.is_running() {
            if state.refcount > 0 {
                tracing::warn!(
                    volume = %self.config.name,
                    refcount = state.refcount,
                    "helper is gone while the volume is in use, respawning"
                );
            }
            self.set_status(MountStatus::Mounting);
            if let Err(source) = state.supervisor.start(&self.config, &self.mountpoint) {
                self.set_status(MountStatus::Failed);
                return Err(VolumeError::Mount {
                    name: self.config.name.clone(),
                    source,
                });
            }
            tracing::info!(
                volume = %self.config.name,
                mountpoint = %self.mountpoint.display(),
                "mounted volume"
            );
        }

        state.refcount += 1;
        self.set_status(MountStatus::Mounted);
        tracing::debug!(volume = %self.config.name, refcount = state.refcount, "mount reference taken");
        Ok(self.mountpoint.clone())
    }

    /// Drop a reference on the mount, tearing the helper down on the last one
    ///
    /// Unmounting a volume nobody holds is a caller bug: it asserts in debug
    /// builds and is logged and ignored otherwise. If teardown fails the
    /// reference is kept, so the helper stays accounted for and a retry
    /// attempts the teardown again.
    pub fn on_unmount(&self) -> Result<(), VolumeError> {
        let mut state = self.state.lock();
        debug_assert!(
            state.refcount > 0,
            "unmount of volume {} without a matching mount",
            self.config.name
        );
        if state.refcount == 0 {
            tracing::error!(volume = %self.config.name, "unmount without a matching mount, ignoring");
            return Ok(());
        }
        self.release(&mut state)
    }

    /// Drop a reference if one is held
    ///
    /// Like [`Volume::on_unmount`], but an unheld volume is not a bug: the
    /// check and the release happen under one lock, and `false` is returned
    /// when there was nothing to release.
    pub fn release_if_held(&self) -> Result<bool, VolumeError> {
        let mut state = self.state.lock();
        if state.refcount == 0 {
            return Ok(false);
        }
        self.release(&mut state).map(|()| true)
    }

    fn release(&self, state: &mut MountState) -> Result<(), VolumeError> {
        if state.refcount == 1 {
            self.set_status(MountStatus::Unmounting);
            if let Err(source) = state.supervisor.stop() {
                self.set_status(MountStatus::Mounted);
                return Err(VolumeError::Teardown {
                    name: self.config.name.clone(),
                    source,
                });
            }
            tracing::info!(volume = %self.config.name, "unmounted volume");
        }

        state.refcount -= 1;
        if state.refcount == 0 {
            self.set_status(MountStatus::Unmounted);
        }
        tracing::debug!(volume = %self.config.name, refcount = state.refcount, "mount reference released");
        Ok(())
    }

    /// Whether the helper is running right now
    ///
    /// Never waits on the process. If the helper has exited it is reaped,
    /// its exit code recorded, and the volume marked accordingly.
    pub fn is_alive(&self) -> bool {
        let mut state = self.state.lock();
        self.probe(&mut state)
    }

    /// Snapshot of the runtime state
    pub fn status(&self) -> VolumeStatus {
        let mut state = self.state.lock();
        let alive = self.probe(&mut state);
        VolumeStatus {
            mount_id: self.mount_id,
            refcount: state.refcount,
            alive,
            status: self.mount_status(),
            pid: state.supervisor.pid(),
            last_exit_code: state.supervisor.last_exit_code(),
        }
    }

    /// Leave the registry: refuse further mounts, stop the helper, free the id
    ///
    /// Without `force` a volume that is still in use is left untouched and
    /// [`VolumeError::InUse`] is returned.
    pub fn retire(&self, force: bool) -> Result<(), VolumeError> {
        {
            let mut state = self.state.lock();
            if state.removed {
                return Err(VolumeError::Removed(self.config.name.clone()));
            }
            if state.refcount > 0 {
                if !force {
                    return Err(VolumeError::InUse {
                        name: self.config.name.clone(),
                        refcount: state.refcount,
                    });
                }
                tracing::warn!(
                    volume = %self.config.name,
                    refcount = state.refcount,
                    "force-unmounting volume that is still in use"
                );
            }
            state.removed = true;
        }
        self.close()
    }

    /// Stop the helper if running and release the mount identifier
    ///
    /// Idempotent, only the first call has an effect. If the helper cannot be
    /// killed the identifier is kept, since its mountpoint is still occupied.
    pub fn close(&self) -> Result<(), VolumeError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut state = self.state.lock();
        state.removed = true;
        if state.supervisor.has_process() {
            self.set_status(MountStatus::Unmounting);
        }
        if let Err(source) = state.supervisor.stop() {
            tracing::error!(
                volume = %self.config.name,
                mount_id = self.mount_id,
                "failed to stop helper, mount identifier stays reserved: {}",
                source
            );
            return Err(VolumeError::Teardown {
                name: self.config.name.clone(),
                source,
            });
        }

        state.refcount = 0;
        self.set_status(MountStatus::Unmounted);
        self.allocator.free(self.mount_id);
        tracing::debug!(volume = %self.config.name, mount_id = self.mount_id, "closed volume");
        Ok(())
    }

    fn probe(&self, state: &mut MountState) -> bool {
        let alive = state.supervisor.is_running();
        if !alive && self.mount_status() == MountStatus::Mounted {
            tracing::error!(
                volume = %self.config.name,
                last_exit_code = ?state.supervisor.last_exit_code(),
                "helper is no longer running"
            );
            self.set_status(MountStatus::Failed);
        }
        alive
    }

    fn set_status(&self, status: MountStatus) {
        *self.status.write() = status;
    }
}

impl Drop for Volume {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(volume = %self.config.name, "error while dropping volume: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::thread;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    struct Fixture {
        dir: TempDir,
        allocator: Arc<IdAllocator>,
        supervisor: Arc<SupervisorConfig>,
    }

    impl Fixture {
        /// Helper that records every start in `starts.log` and then idles
        fn new() -> Self {
            Self::with_script("echo started >> \"$STARTS\"; exec sleep 30")
        }

        fn with_script(script: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let starts = dir.path().join("starts.log");
            let script = format!("STARTS='{}'; {}", starts.display(), script);
            let supervisor = SupervisorConfig {
                helper_binary: PathBuf::from("/bin/sh"),
                helper_args: vec!["-c".to_string(), script, "zookeeperfuse".to_string()],
                base_path: dir.path().join("mnt"),
                log_dir: None,
                debug: false,
                startup_grace: Duration::from_millis(300),
                terminate_timeout: Duration::from_secs(2),
                kill_timeout: Duration::from_secs(2),
            };
            Self {
                dir,
                allocator: Arc::new(IdAllocator::new()),
                supervisor: Arc::new(supervisor),
            }
        }

        fn volume(&self, name: &str) -> Volume {
            let config = VolumeConfig {
                hosts: HostSet::new(["h2", "h1"]).unwrap(),
                name: name.to_string(),
                path: "/data".to_string(),
                mode: LeafMode::Dir,
                auth: None,
            };
            Volume::new(config, self.allocator.clone(), self.supervisor.clone())
        }

        fn starts(&self) -> usize {
            fs::read_to_string(self.dir.path().join("starts.log"))
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }
    }

    #[test]
    fn test_leaf_mode_parse() {
        assert_eq!("DIR".parse::<LeafMode>().unwrap(), LeafMode::Dir);
        assert_eq!("file".parse::<LeafMode>().unwrap(), LeafMode::File);
        assert!("LINK".parse::<LeafMode>().is_err());
        assert_eq!(LeafMode::default(), LeafMode::Dir);
    }

    #[test]
    fn test_refcounted_mount_and_unmount() {
        let fx = Fixture::new();
        let volume = fx.volume("v1");
        assert_eq!(volume.mount_status(), MountStatus::Unmounted);

        let first = volume.on_mount().unwrap();
        assert_eq!(first, fx.dir.path().join("mnt").join("0"));
        assert!(volume.is_alive());
        assert_eq!(volume.mount_status(), MountStatus::Mounted);

        let second = volume.on_mount().unwrap();
        assert_eq!(first, second);
        assert_eq!(volume.refcount(), 2);
        assert_eq!(fx.starts(), 1);

        volume.on_unmount().unwrap();
        assert_eq!(volume.refcount(), 1);
        assert!(volume.is_alive());

        volume.on_unmount().unwrap();
        assert_eq!(volume.refcount(), 0);
        assert!(!volume.is_alive());
        assert_eq!(volume.mount_status(), MountStatus::Unmounted);
        assert!(!first.exists());
    }

    #[test]
    fn test_concurrent_mounts_spawn_once() {
        let fx = Fixture::new();
        let volume = Arc::new(fx.volume("shared"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let volume = volume.clone();
                thread::spawn(move || volume.on_mount().unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), volume.mountpoint());
        }
        assert_eq!(volume.refcount(), 8);
        assert_eq!(fx.starts(), 1);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let volume = volume.clone();
                thread::spawn(move || volume.on_unmount().unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(volume.refcount(), 0);
        assert!(!volume.is_alive());
        assert_eq!(fx.starts(), 1);
        assert!(!volume.mountpoint().exists());
    }

    #[test]
    fn test_failed_mount_keeps_refcount_and_retries() {
        let fx = Fixture::with_script("echo started >> \"$STARTS\"; exit 4");
        let volume = fx.volume("broken");

        let err = volume.on_mount().unwrap_err();
        assert!(matches!(
            err,
            VolumeError::Mount {
                source: MountError::Exited { code: Some(4), .. },
                ..
            }
        ));
        assert_eq!(volume.refcount(), 0);
        assert_eq!(volume.mount_status(), MountStatus::Failed);
        assert!(volume.mountpoint().is_dir());

        let status = volume.status();
        assert_eq!(status.last_exit_code, Some(4));
        assert!(!status.alive);

        assert!(volume.on_mount().is_err());
        assert_eq!(fx.starts(), 2);
        assert_eq!(volume.refcount(), 0);
    }

    #[test]
    fn test_dead_helper_is_detected_and_respawned() {
        let fx = Fixture::new();
        let volume = fx.volume("flaky");
        volume.on_mount().unwrap();

        let pid = volume.status().pid.unwrap() as libc::pid_t;
        // SAFETY: signalling the helper spawned by this test.
        unsafe { libc::kill(pid, libc::SIGKILL) };
        thread::sleep(Duration::from_millis(200));

        assert!(!volume.is_alive());
        assert_eq!(volume.mount_status(), MountStatus::Failed);
        assert_eq!(volume.refcount(), 1);

        volume.on_mount().unwrap();
        assert!(volume.is_alive());
        assert_eq!(volume.refcount(), 2);
        assert_eq!(fx.starts(), 2);

        volume.on_unmount().unwrap();
        volume.on_unmount().unwrap();
        assert!(!volume.is_alive());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "without a matching mount")]
    fn test_unbalanced_unmount_asserts() {
        let fx = Fixture::new();
        let volume = fx.volume("v");
        let _ = volume.on_unmount();
    }

    #[test]
    fn test_release_if_held_releases_once() {
        let fx = Fixture::new();
        let volume = Arc::new(fx.volume("replayed"));
        assert!(!volume.release_if_held().unwrap());

        volume.on_mount().unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let volume = volume.clone();
                thread::spawn(move || volume.release_if_held().unwrap())
            })
            .collect();
        let released = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|released| *released)
            .count();

        assert_eq!(released, 1);
        assert_eq!(volume.refcount(), 0);
        assert!(!volume.is_alive());
        assert_eq!(volume.mount_status(), MountStatus::Unmounted);
    }

    #[test]
    fn test_close_is_idempotent_and_frees_id() {
        let fx = Fixture::new();
        let volume = fx.volume("v");
        volume.on_mount().unwrap();
        assert!(fx.allocator.is_allocated(0));

        volume.close().unwrap();
        assert!(!volume.is_alive());
        assert!(!fx.allocator.is_allocated(0));
        assert!(matches!(volume.on_mount(), Err(VolumeError::Removed(_))));

        volume.close().unwrap();
        drop(volume);
        assert_eq!(fx.allocator.outstanding(), 0);
    }

    #[test]
    fn test_drop_frees_id() {
        let fx = Fixture::new();
        let a = fx.volume("a");
        let b = fx.volume("b");
        assert_eq!((a.mount_id(), b.mount_id()), (0, 1));

        drop(a);
        let c = fx.volume("c");
        assert_eq!(c.mount_id(), 0);
        assert_ne!(c.mountpoint(), b.mountpoint());
    }

    #[test]
    fn test_retire_rejects_in_use_unless_forced() {
        let fx = Fixture::new();
        let volume = fx.volume("v");
        volume.on_mount().unwrap();

        assert!(matches!(
            volume.retire(false),
            Err(VolumeError::InUse { refcount: 1, .. })
        ));
        assert!(volume.is_alive());

        volume.retire(true).unwrap();
        assert!(!volume.is_alive());
        assert_eq!(volume.refcount(), 0);
        assert!(matches!(volume.retire(true), Err(VolumeError::Removed(_))));
    }
}
