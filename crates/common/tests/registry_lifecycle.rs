//! End-to-end registry scenarios against a stand-in helper process
//!
//! The helper is `/bin/sh -c <script>`, which ignores the zookeeperfuse
//! arguments appended after the script name. Each start is recorded in a
//! file so tests can count spawns.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use common::{
    HostSet, LeafMode, MountStatus, RegistryError, RemovalPolicy, SnapshotStore,
    SupervisorConfig, VolumeOptions, VolumeRegistry,
};

const IDLE: &str = "echo started >> \"$STARTS\"; exec sleep 30";
const CRASH: &str = "echo started >> \"$STARTS\"; exit 7";

struct Setup {
    dir: TempDir,
}

impl Setup {
    fn new() -> Self {
        init_tracing();
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn state_file(&self) -> PathBuf {
        self.dir.path().join("state").join("zookeeper-volume-state.json")
    }

    fn base_path(&self) -> PathBuf {
        self.dir.path().join("volumes")
    }

    fn supervisor(&self, script: &str) -> SupervisorConfig {
        let starts = self.dir.path().join("starts.log");
        SupervisorConfig {
            helper_binary: PathBuf::from("/bin/sh"),
            helper_args: vec![
                "-c".to_string(),
                format!("STARTS='{}'; {}", starts.display(), script),
                "zookeeperfuse".to_string(),
            ],
            base_path: self.base_path(),
            log_dir: None,
            debug: false,
            startup_grace: Duration::from_millis(300),
            terminate_timeout: Duration::from_secs(2),
            kill_timeout: Duration::from_secs(2),
        }
    }

    fn registry(&self, script: &str, policy: RemovalPolicy) -> VolumeRegistry {
        VolumeRegistry::open(
            SnapshotStore::new(self.state_file()),
            self.supervisor(script),
            policy,
        )
    }

    fn starts(&self) -> usize {
        fs::read_to_string(self.dir.path().join("starts.log"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::new("common=debug"))
        .try_init();
}

fn options(hosts: &[&str], path: &str) -> VolumeOptions {
    VolumeOptions::new(HostSet::new(hosts).unwrap(), path)
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(true)
}

#[test]
fn test_mount_twice_unmount_twice() {
    let setup = Setup::new();
    let registry = setup.registry(IDLE, RemovalPolicy::Reject);

    registry.create("v1", options(&["h1", "h2"], "/data")).unwrap();
    registry.persist().unwrap();

    let mountpoint = registry.mount("v1").unwrap();
    assert_eq!(mountpoint, setup.base_path().join("0"));
    let volume = registry.get("v1").unwrap();
    assert!(volume.is_alive());

    assert_eq!(registry.mount("v1").unwrap(), mountpoint);
    assert_eq!(volume.refcount(), 2);

    registry.unmount("v1").unwrap();
    registry.unmount("v1").unwrap();
    assert_eq!(volume.refcount(), 0);
    assert!(!volume.is_alive());
    assert!(!mountpoint.exists());
    assert_eq!(setup.starts(), 1);

    registry.shutdown();
}

#[test]
fn test_many_users_one_helper() {
    let setup = Setup::new();
    let registry = Arc::new(setup.registry(IDLE, RemovalPolicy::Reject));
    registry.create("busy", options(&["zk"], "/")).unwrap();

    // Mounts and unmounts interleave freely, as long as every worker mounts
    // before it unmounts.
    let handles: Vec<_> = (0..6)
        .map(|i| {
            let registry = registry.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20 * i));
                registry.mount("busy").unwrap();
                thread::sleep(Duration::from_millis(50));
                registry.unmount("busy").unwrap();
            })
        })
        .collect();

    // Keep one reference open so the helper cannot be torn down mid-test.
    registry.mount("busy").unwrap();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(setup.starts(), 1);

    let volume = registry.get("busy").unwrap();
    assert_eq!(volume.refcount(), 1);
    registry.unmount("busy").unwrap();
    assert_eq!(volume.refcount(), 0);
    assert!(!volume.is_alive());

    registry.shutdown();
}

#[test]
fn test_failed_mount_is_retryable() {
    let setup = Setup::new();
    let registry = setup.registry(CRASH, RemovalPolicy::Reject);
    registry.create("bad", options(&["zk"], "/")).unwrap();

    let err = registry.mount("bad").unwrap_err();
    assert!(matches!(err, RegistryError::Mount { ref name, .. } if name == "bad"));

    let volume = registry.get("bad").unwrap();
    assert_eq!(volume.refcount(), 0);
    assert_eq!(volume.mount_status(), MountStatus::Failed);
    assert!(volume.mountpoint().is_dir());
    assert_eq!(volume.status().last_exit_code, Some(7));

    assert!(registry.mount("bad").is_err());
    assert_eq!(setup.starts(), 2);
    assert_eq!(volume.refcount(), 0);
}

#[test]
fn test_get_or_create() {
    let setup = Setup::new();
    let registry = setup.registry(IDLE, RemovalPolicy::Reject);

    let err = registry.get_or_create("new", VolumeOptions::default()).unwrap_err();
    assert!(matches!(err, RegistryError::MissingConfiguration(_)));
    assert!(!registry.exists("new"));

    let partial = VolumeOptions {
        hosts: Some(HostSet::new(["zk"]).unwrap()),
        ..VolumeOptions::default()
    };
    assert!(matches!(
        registry.get_or_create("new", partial),
        Err(RegistryError::MissingConfiguration(_))
    ));

    let created = registry
        .get_or_create("new", options(&["b", "a"], "/x"))
        .unwrap();
    let fetched = registry
        .get_or_create("new", VolumeOptions::default())
        .unwrap();
    assert!(Arc::ptr_eq(&created, &fetched));

    // Configuration of an existing volume is not changed.
    let again = registry
        .get_or_create("new", options(&["other"], "/y"))
        .unwrap();
    assert_eq!(again.config().hosts.to_arg(), "a,b");
    assert_eq!(again.config().path, "/x");
}

#[test]
fn test_create_rejects_duplicate() {
    let setup = Setup::new();
    let registry = setup.registry(IDLE, RemovalPolicy::Reject);

    registry.create("dup", options(&["zk"], "/")).unwrap();
    assert!(matches!(
        registry.create("dup", options(&["zk"], "/")),
        Err(RegistryError::AlreadyExists(_))
    ));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_host_order_does_not_matter() {
    let setup = Setup::new();
    let registry = setup.registry(IDLE, RemovalPolicy::Reject);

    let a = registry.create("a", options(&["b", "a"], "/p")).unwrap();
    let b = registry.create("b", options(&["a", "b"], "/p")).unwrap();
    assert_eq!(a.config().hosts, b.config().hosts);
}

#[test]
fn test_mount_ids_never_shared() {
    let setup = Setup::new();
    let registry = setup.registry(IDLE, RemovalPolicy::Reject);

    for i in 0..5 {
        registry.create(&format!("v{i}"), options(&["zk"], "/")).unwrap();
    }
    registry.remove("v1").unwrap();
    registry.remove("v3").unwrap();
    registry.create("v5", options(&["zk"], "/")).unwrap();
    registry.create("v6", options(&["zk"], "/")).unwrap();
    registry.create("v7", options(&["zk"], "/")).unwrap();

    let ids: Vec<u32> = registry.list().iter().map(|v| v.mount_id()).collect();
    let unique: HashSet<u32> = ids.iter().copied().collect();
    assert_eq!(ids.len(), 6);
    assert_eq!(unique.len(), ids.len());
    assert_eq!(registry.get("v5").unwrap().mount_id(), 1);
    assert_eq!(registry.get("v6").unwrap().mount_id(), 3);
    assert_eq!(registry.get("v7").unwrap().mount_id(), 5);
}

#[test]
fn test_persist_and_reload() {
    let setup = Setup::new();
    {
        let registry = setup.registry(IDLE, RemovalPolicy::Reject);
        registry.create("plain", options(&["h2", "h1"], "/a")).unwrap();
        registry
            .create(
                "fancy",
                options(&["zk"], "/b")
                    .with_mode(LeafMode::File)
                    .with_auth("digest:u:p"),
            )
            .unwrap();
        registry.mount("plain").unwrap();
        registry.persist().unwrap();
        registry.shutdown();
    }

    let registry = setup.registry(IDLE, RemovalPolicy::Reject);
    assert_eq!(registry.len(), 2);

    let plain = registry.get("plain").unwrap();
    assert_eq!(plain.config().hosts.to_arg(), "h1,h2");
    assert_eq!(plain.config().path, "/a");
    assert_eq!(plain.config().mode, LeafMode::Dir);
    assert_eq!(plain.config().auth, None);
    assert_eq!(plain.refcount(), 0);
    assert_eq!(plain.mount_status(), MountStatus::Unmounted);

    let fancy = registry.get("fancy").unwrap();
    assert_eq!(fancy.config().mode, LeafMode::File);
    assert_eq!(fancy.config().auth.as_deref(), Some("digest:u:p"));

    let mut ids: Vec<u32> = registry.list().iter().map(|v| v.mount_id()).collect();
    ids.sort_unstable();
    assert_eq!(ids, [0, 1]);
}

#[test]
fn test_failed_persist_keeps_memory_authoritative() {
    let setup = Setup::new();
    let state_dir = setup.state_file().parent().unwrap().to_path_buf();
    fs::write(&state_dir, b"not a directory").unwrap();

    let registry = setup.registry(IDLE, RemovalPolicy::Reject);
    registry.create("v1", options(&["zk"], "/a")).unwrap();
    assert!(matches!(registry.persist(), Err(RegistryError::Storage(_))));
    assert!(registry.exists("v1"));
    assert_eq!(registry.mount("v1").unwrap(), setup.base_path().join("0"));

    fs::remove_file(&state_dir).unwrap();
    registry.persist().unwrap();

    let names: Vec<String> = SnapshotStore::new(setup.state_file())
        .load()
        .into_iter()
        .map(|v| v.name)
        .collect();
    assert_eq!(names, ["v1"]);
    registry.shutdown();
}

#[test]
fn test_reject_policy_keeps_mounted_volume() {
    let setup = Setup::new();
    let registry = setup.registry(IDLE, RemovalPolicy::Reject);
    registry.create("held", options(&["zk"], "/")).unwrap();
    registry.mount("held").unwrap();

    assert!(matches!(
        registry.remove("held"),
        Err(RegistryError::InUse { refcount: 1, .. })
    ));
    assert!(registry.exists("held"));
    assert!(registry.get("held").unwrap().is_alive());

    registry.unmount("held").unwrap();
    registry.remove("held").unwrap();
    assert!(!registry.exists("held"));
    assert!(matches!(registry.remove("held"), Err(RegistryError::NotFound(_))));
}

#[test]
fn test_force_policy_tears_down_mounted_volume() {
    let setup = Setup::new();
    let registry = setup.registry(IDLE, RemovalPolicy::Force);
    registry.create("held", options(&["zk"], "/")).unwrap();
    let mountpoint = registry.mount("held").unwrap();
    let volume = registry.get("held").unwrap();

    registry.remove("held").unwrap();
    assert!(!registry.exists("held"));
    assert!(!volume.is_alive());
    assert!(!mountpoint.exists());

    // Stale handles refuse to mount.
    assert!(volume.on_mount().is_err());
    assert!(matches!(registry.mount("held"), Err(RegistryError::NotFound(_))));
}

#[test]
fn test_unknown_names() {
    let setup = Setup::new();
    let registry = setup.registry(IDLE, RemovalPolicy::Reject);

    assert!(matches!(registry.get("nope"), Err(RegistryError::NotFound(_))));
    assert!(matches!(registry.mount("nope"), Err(RegistryError::NotFound(_))));
    assert!(matches!(registry.unmount("nope"), Err(RegistryError::NotFound(_))));
    assert!(matches!(registry.remove("nope"), Err(RegistryError::NotFound(_))));
}

#[test]
fn test_shutdown_releases_everything_once() {
    let setup = Setup::new();
    let registry = setup.registry(IDLE, RemovalPolicy::Reject);
    registry.create("a", options(&["zk"], "/")).unwrap();
    registry.create("b", options(&["zk"], "/")).unwrap();
    registry.mount("a").unwrap();
    registry.mount("b").unwrap();
    registry.persist().unwrap();

    let volumes = registry.list();
    registry.shutdown();
    registry.shutdown();

    assert!(registry.is_empty());
    for volume in volumes {
        assert!(!volume.is_alive());
        assert!(!volume.mountpoint().exists());
    }
    assert!(is_empty_dir(&setup.base_path()));

    // The snapshot written before shutdown is left alone.
    registry.persist().unwrap();
    let reloaded = setup.registry(IDLE, RemovalPolicy::Reject);
    assert_eq!(reloaded.len(), 2);
}
