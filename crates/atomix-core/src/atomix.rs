//! Builder/facade for an atomix node.
//!
//! Wires the cluster services together: a static-roster membership
//! service built from the configured peers, a TCP messaging transport
//! bound on the local address (overridable for tests and embedded
//! use), and the partition-group membership manager on top.

use std::sync::Arc;

use atomix_cluster::membership::{ClusterMembership, LocalMembership};
use atomix_cluster::messaging::{ClusterMessaging, TcpMessaging};
use atomix_proto::error::{AtomixError, AtomixResult};
use atomix_proto::group::PartitionGroupConfig;
use atomix_proto::member::{Address, Member, MemberId};

use crate::config::{ClusterConfig, PartitionGroupsConfig};
use crate::manager::PartitionGroupMembershipManager;
use crate::registry::{PartitionGroupType, PartitionGroupTypeRegistry};

/// Default port for cluster communication.
const DEFAULT_PORT: u16 = 5679;

/// Builder for an [`Atomix`] node.
pub struct AtomixBuilder {
    member_id: Option<MemberId>,
    address: Address,
    peers: Vec<Member>,
    groups: PartitionGroupsConfig,
    registry: PartitionGroupTypeRegistry,
    messaging: Option<Arc<dyn ClusterMessaging>>,
}

impl AtomixBuilder {
    fn new() -> Self {
        Self {
            member_id: None,
            address: Address::new("localhost", DEFAULT_PORT),
            peers: Vec::new(),
            groups: PartitionGroupsConfig::new(),
            registry: PartitionGroupTypeRegistry::with_builtin(),
            messaging: None,
        }
    }

    /// Set the local member id. Defaults to the local address rendered
    /// as a string.
    pub fn with_member_id(mut self, id: impl Into<MemberId>) -> Self {
        self.member_id = Some(id.into());
        self
    }

    /// Set the local hostname.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.address.host = host.into();
        self
    }

    /// Set the local port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.address.port = port;
        self
    }

    /// Set the local address.
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    /// Add a statically configured peer.
    pub fn with_peer(mut self, peer: Member) -> Self {
        self.peers.push(peer);
        self
    }

    /// Apply a whole cluster configuration: local identity, address,
    /// and peers.
    pub fn with_cluster_config(mut self, config: ClusterConfig) -> Self {
        self.member_id = Some(config.local.id);
        self.address = config.local.address;
        self.peers = config.peers;
        self
    }

    /// Configure the system management group hosted by this node.
    pub fn with_system_group(mut self, config: PartitionGroupConfig) -> Self {
        self.groups = self.groups.with_system_group(config);
        self
    }

    /// Configure a data partition group hosted by this node.
    pub fn with_group(mut self, config: PartitionGroupConfig) -> Self {
        self.groups = self.groups.with_group(config);
        self
    }

    /// Register an additional partition-group type.
    pub fn with_group_type(mut self, group_type: PartitionGroupType) -> Self {
        self.registry.register(group_type);
        self
    }

    /// Use a custom messaging transport instead of the default TCP
    /// transport.
    pub fn with_messaging(mut self, messaging: Arc<dyn ClusterMessaging>) -> Self {
        self.messaging = Some(messaging);
        self
    }

    pub fn build(self) -> Atomix {
        let id = self
            .member_id
            .unwrap_or_else(|| MemberId::new(self.address.to_string()));
        let local = Member::new(id, self.address);
        let membership = Arc::new(LocalMembership::with_peers(local, self.peers.clone()));
        Atomix {
            membership,
            peers: self.peers,
            groups: self.groups,
            registry: self.registry,
            messaging: self.messaging,
            manager: None,
        }
    }
}

/// An atomix node: cluster services plus the partition-group
/// membership service.
pub struct Atomix {
    membership: Arc<LocalMembership>,
    peers: Vec<Member>,
    groups: PartitionGroupsConfig,
    registry: PartitionGroupTypeRegistry,
    messaging: Option<Arc<dyn ClusterMessaging>>,
    manager: Option<PartitionGroupMembershipManager>,
}

impl Atomix {
    pub fn builder() -> AtomixBuilder {
        AtomixBuilder::new()
    }

    /// The local member descriptor.
    pub fn local_member(&self) -> Member {
        self.membership.local_member()
    }

    /// The cluster membership service.
    pub fn cluster_membership(&self) -> &Arc<LocalMembership> {
        &self.membership
    }

    /// Start the node: bind the transport if none was supplied, then
    /// start the partition-group membership manager and wait for its
    /// bootstrap to complete.
    pub async fn start(&mut self) -> AtomixResult<()> {
        if self.manager.is_some() {
            return Err(AtomixError::AlreadyStarted);
        }

        let messaging: Arc<dyn ClusterMessaging> = match &self.messaging {
            Some(messaging) => messaging.clone(),
            None => {
                let tcp = TcpMessaging::bind(self.membership.local_member()).await?;
                for peer in &self.peers {
                    tcp.register(peer).await;
                }
                Arc::new(tcp)
            }
        };

        let manager = PartitionGroupMembershipManager::new(
            self.membership.clone(),
            messaging,
            self.registry.clone(),
        );
        self.manager = Some(manager.clone());
        manager.start(self.groups.clone()).await
    }

    /// The partition-group membership service. Available once
    /// [`start`](Self::start) has been called.
    pub fn partition_groups(&self) -> AtomixResult<&PartitionGroupMembershipManager> {
        self.manager.as_ref().ok_or(AtomixError::NotStarted)
    }

    /// Stop the node.
    pub async fn stop(&mut self) {
        if let Some(manager) = &self.manager {
            manager.stop().await;
        }
    }
}
