//! # atomix-cluster
//!
//! Cluster-level services consumed by the atomix coordination core:
//!
//! - [`membership`] — the cluster membership service: who is in the
//!   cluster right now, plus arrival/departure events.
//! - [`messaging`] — the cluster messaging service: subject-based
//!   request/response between members.
//!
//! Both services are defined as traits so the underlying substrate can
//! be swapped: an in-process implementation for tests and single-node
//! deployments, and a TCP implementation for real clusters.

pub mod membership;
pub mod messaging;

pub use membership::{ClusterMembership, MemberEvent, MemberEventKind};
pub use messaging::{ClusterMessaging, InboundRequest, Responder, Subscription};
