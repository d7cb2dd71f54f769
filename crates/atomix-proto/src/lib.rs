//! # atomix-proto
//!
//! Protocol types, constants, and data structures for the atomix
//! distributed coordination platform.
//!
//! This crate defines member identity and addressing, partition-group
//! descriptors and membership records, the bootstrap wire envelope,
//! error types, and the codec shared by all atomix components.

pub mod codec;
pub mod constants;
pub mod defaults;
pub mod error;
pub mod group;
pub mod member;

// Re-export commonly used types at the crate root
pub use error::{AtomixError, AtomixResult};
pub use group::{PartitionGroupConfig, PartitionGroupInfo, PartitionGroupMembership};
pub use member::{Address, Member, MemberId};
