//! Configuration inputs for the facade and the membership manager.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use atomix_proto::group::PartitionGroupConfig;
use atomix_proto::member::Member;

/// Static cluster layout: the local member plus the peers to discover
/// at bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// The local member descriptor.
    pub local: Member,
    /// Statically configured peer members.
    pub peers: Vec<Member>,
}

impl ClusterConfig {
    pub fn new(local: Member) -> Self {
        Self {
            local,
            peers: Vec::new(),
        }
    }

    pub fn with_peer(mut self, peer: Member) -> Self {
        self.peers.push(peer);
        self
    }
}

/// Partition-group configuration handed to the membership manager at
/// start: an optional system group descriptor plus the locally
/// configured data groups, keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionGroupsConfig {
    /// The system management group, if this node hosts it.
    pub system_group: Option<PartitionGroupConfig>,
    /// Locally configured data groups, keyed by group name.
    pub groups: HashMap<String, PartitionGroupConfig>,
}

impl PartitionGroupsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_group(mut self, config: PartitionGroupConfig) -> Self {
        self.system_group = Some(config);
        self
    }

    pub fn with_group(mut self, config: PartitionGroupConfig) -> Self {
        self.groups.insert(config.name.clone(), config);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_keyed_by_name() {
        let config = PartitionGroupsConfig::new()
            .with_system_group(PartitionGroupConfig::new("system", "raft"))
            .with_group(PartitionGroupConfig::new("data", "primary-backup"))
            .with_group(PartitionGroupConfig::new("events", "raft"));

        assert_eq!(config.system_group.as_ref().unwrap().name, "system");
        assert_eq!(config.groups.len(), 2);
        assert_eq!(config.groups["data"].group_type, "primary-backup");
    }

    #[test]
    fn test_same_name_replaces() {
        let config = PartitionGroupsConfig::new()
            .with_group(PartitionGroupConfig::new("data", "raft"))
            .with_group(PartitionGroupConfig::new("data", "primary-backup"));

        assert_eq!(config.groups.len(), 1);
        assert_eq!(config.groups["data"].group_type, "primary-backup");
    }
}
