//! Cluster membership service.
//!
//! Answers "who is in the cluster right now" and delivers arrival and
//! departure events to interested components. The partition-group
//! manager consumes this service to seed bootstrap targets, to filter
//! merged member sets against live members, and to shrink groups when
//! a member departs.

use async_trait::async_trait;
use tokio::sync::broadcast;

use atomix_proto::member::{Member, MemberId};

/// Kind of a cluster membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberEventKind {
    /// A member has joined the cluster.
    Added,
    /// A member has departed or been declared failed.
    Removed,
}

/// A cluster membership change event.
#[derive(Debug, Clone)]
pub struct MemberEvent {
    pub kind: MemberEventKind,
    pub member: Member,
}

/// Trait that all cluster membership backends must implement.
#[async_trait]
pub trait ClusterMembership: Send + Sync + 'static {
    /// The local member descriptor.
    fn local_member(&self) -> Member;

    /// All currently known cluster members, including the local one.
    async fn members(&self) -> Vec<Member>;

    /// Look up a member by id. Returns `None` for unknown or departed
    /// members.
    async fn member(&self, id: &MemberId) -> Option<Member>;

    /// Subscribe to membership change events.
    fn subscribe(&self) -> broadcast::Receiver<MemberEvent>;
}

pub mod local;

pub use local::LocalMembership;
