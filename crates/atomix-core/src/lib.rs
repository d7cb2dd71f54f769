//! # atomix-core
//!
//! The partition-group membership subsystem of the atomix coordination
//! platform: the protocol and state machine by which peer nodes
//! converge on a shared, eventually-consistent view of the system
//! management group and the named data partition groups.
//!
//! The entry points are [`Atomix`] (builder/facade wiring the cluster
//! services together) and [`PartitionGroupMembershipManager`] (the
//! membership state machine itself, usable directly with any
//! [`atomix_cluster::ClusterMembership`] and
//! [`atomix_cluster::ClusterMessaging`] implementation).

pub mod atomix;
pub mod config;
pub mod event;
pub mod manager;
pub mod registry;

pub use atomix::{Atomix, AtomixBuilder};
pub use config::{ClusterConfig, PartitionGroupsConfig};
pub use event::{
    ListenerId, PartitionGroupMembershipEvent, PartitionGroupMembershipEventKind,
};
pub use manager::PartitionGroupMembershipManager;
pub use registry::{PartitionGroupType, PartitionGroupTypeRegistry};
