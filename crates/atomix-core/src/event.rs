//! Partition-group membership events and listener dispatch.
//!
//! Listeners are plain callbacks invoked on the manager's context in
//! registration order. The registry copies the listener list before a
//! dispatch and re-checks registration per delivery, so a listener
//! added during a dispatch does not observe the in-flight event and a
//! listener removed during a dispatch does not receive it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use atomix_proto::group::PartitionGroupMembership;

/// Kind of a partition-group membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionGroupMembershipEventKind {
    /// The member set of a group changed.
    MembersChanged,
}

/// A partition-group membership change event, carrying the post-change
/// record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionGroupMembershipEvent {
    pub kind: PartitionGroupMembershipEventKind,
    pub membership: PartitionGroupMembership,
}

impl PartitionGroupMembershipEvent {
    pub fn members_changed(membership: PartitionGroupMembership) -> Self {
        Self {
            kind: PartitionGroupMembershipEventKind::MembersChanged,
            membership,
        }
    }
}

/// Listener callback. Invoked on the manager context; must not block.
pub type Listener = Arc<dyn Fn(&PartitionGroupMembershipEvent) + Send + Sync>;

/// Handle returned by listener registration, used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener registry with ordered dispatch.
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(u64, Listener)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, listener));
        ListenerId(id)
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners.write().retain(|(lid, _)| *lid != id.0);
    }

    /// Register a channel-backed listener; events arrive on the
    /// returned receiver. Convenient for tests and observers.
    pub fn watch(&self) -> mpsc::UnboundedReceiver<PartitionGroupMembershipEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_listener(Arc::new(move |event: &PartitionGroupMembershipEvent| {
            let _ = tx.send(event.clone());
        }));
        rx
    }

    /// Deliver an event to every listener registered at this moment,
    /// in registration order.
    pub fn post(&self, event: PartitionGroupMembershipEvent) {
        let snapshot: Vec<(u64, Listener)> = self.listeners.read().clone();
        for (id, listener) in snapshot {
            if self.is_registered(id) {
                listener(&event);
            }
        }
    }

    fn is_registered(&self, id: u64) -> bool {
        self.listeners.read().iter().any(|(lid, _)| *lid == id)
    }
}
