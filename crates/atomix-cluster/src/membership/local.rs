//! In-process cluster membership roster.
//!
//! Tracks members in a plain map and broadcasts arrival/departure
//! events. There is no failure detection here: the roster changes only
//! when [`LocalMembership::add_member`] or
//! [`LocalMembership::remove_member`] is called, either by a discovery
//! layer or directly by tests. Seeded from static configuration, this
//! doubles as the bootstrap-discovery membership used by the facade.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use atomix_proto::defaults::DEFAULT_MEMBER_EVENT_CHANNEL_SIZE;
use atomix_proto::member::{Member, MemberId};

use super::{ClusterMembership, MemberEvent, MemberEventKind};

/// In-process membership roster with injectable changes.
pub struct LocalMembership {
    local: Member,
    roster: RwLock<HashMap<MemberId, Member>>,
    events: broadcast::Sender<MemberEvent>,
}

impl LocalMembership {
    /// Create a roster containing only the local member.
    pub fn new(local: Member) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_MEMBER_EVENT_CHANNEL_SIZE);
        let mut roster = HashMap::new();
        roster.insert(local.id.clone(), local.clone());
        Self {
            local,
            roster: RwLock::new(roster),
            events,
        }
    }

    /// Create a roster seeded with the local member plus static peers.
    pub fn with_peers(local: Member, peers: impl IntoIterator<Item = Member>) -> Self {
        let (events, _) = broadcast::channel(DEFAULT_MEMBER_EVENT_CHANNEL_SIZE);
        let mut roster = HashMap::new();
        roster.insert(local.id.clone(), local.clone());
        for peer in peers {
            roster.insert(peer.id.clone(), peer);
        }
        Self {
            local,
            roster: RwLock::new(roster),
            events,
        }
    }

    /// Add a member to the roster, broadcasting an `Added` event if it
    /// was not already present.
    pub async fn add_member(&self, member: Member) {
        let mut roster = self.roster.write().await;
        if roster.insert(member.id.clone(), member.clone()).is_none() {
            info!("member {} added to cluster", member.id);
            drop(roster);
            let _ = self.events.send(MemberEvent {
                kind: MemberEventKind::Added,
                member,
            });
        } else {
            debug!("member {} already known, updated descriptor", member.id);
        }
    }

    /// Remove a member from the roster, broadcasting a `Removed` event
    /// if it was present.
    pub async fn remove_member(&self, id: &MemberId) {
        let mut roster = self.roster.write().await;
        if let Some(member) = roster.remove(id) {
            info!("member {} removed from cluster", member.id);
            drop(roster);
            let _ = self.events.send(MemberEvent {
                kind: MemberEventKind::Removed,
                member,
            });
        }
    }
}

#[async_trait]
impl ClusterMembership for LocalMembership {
    fn local_member(&self) -> Member {
        self.local.clone()
    }

    async fn members(&self) -> Vec<Member> {
        let roster = self.roster.read().await;
        roster.values().cloned().collect()
    }

    async fn member(&self, id: &MemberId) -> Option<Member> {
        let roster = self.roster.read().await;
        roster.get(id).cloned()
    }

    fn subscribe(&self) -> broadcast::Receiver<MemberEvent> {
        self.events.subscribe()
    }
}
