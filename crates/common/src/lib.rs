//! Core volume management for zookeeper-volume
//!
//! This crate holds everything that has real invariants: the registry of
//! named volumes, the reference-counted mount state machine of each volume,
//! and the supervisor that owns the external `zookeeperfuse` helper process.
//!
//! # Architecture
//!
//! - `IdAllocator`: hands out small integers used as mountpoint directory names
//! - `HostSet`: normalized, order-independent set of remote endpoints
//! - `MountSupervisor`: spawns, probes and tears down one helper process
//! - `Volume`: refcounted mount/unmount transitions around a supervisor
//! - `VolumeRegistry`: name -> volume map, persisted through `SnapshotStore`
//!
//! Locking is two-tiered. The registry lock only guards the map and the
//! snapshot write. Each volume has its own lock which is held across the
//! (bounded) helper spawn or teardown, so traffic on different volumes never
//! contends.

pub mod error;
pub mod host_set;
pub mod id_allocator;
pub mod registry;
pub mod store;
pub mod volume;

pub use error::RegistryError;
pub use host_set::{HostSet, HostSetError};
pub use id_allocator::IdAllocator;
pub use registry::{RemovalPolicy, VolumeOptions, VolumeRegistry};
pub use store::{SnapshotStore, StorageError};
pub use volume::supervisor::{MountError, MountSupervisor, SupervisorConfig, TeardownError};
pub use volume::{
    LeafMode, LeafModeError, MountStatus, Volume, VolumeConfig, VolumeError, VolumeStatus,
};
