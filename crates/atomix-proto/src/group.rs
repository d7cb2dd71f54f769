/// Partition-group descriptors, membership records, and the bootstrap
/// wire envelope.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::member::MemberId;

/// Immutable configuration of one partition group.
///
/// The name uniquely identifies the group across the cluster. The
/// type-specific configuration is an opaque blob understood by the
/// group-type registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionGroupConfig {
    /// Group name; non-empty, cluster-unique.
    pub name: String,
    /// Name of the group type (e.g. "raft", "primary-backup").
    pub group_type: String,
    /// Opaque type-specific configuration.
    pub config: Vec<u8>,
}

impl PartitionGroupConfig {
    pub fn new(name: impl Into<String>, group_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group_type: group_type.into(),
            config: Vec::new(),
        }
    }

    /// Attach a type-specific configuration blob.
    pub fn with_config(mut self, config: Vec<u8>) -> Self {
        self.config = config;
        self
    }
}

/// The membership record of one partition group: its configuration plus
/// the set of cluster members currently participating.
///
/// Records are compared by group name; the member set is unordered but
/// stored sorted so that equal records encode to equal bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionGroupMembership {
    /// Group name, always equal to `config.name`.
    pub group: String,
    /// The group configuration.
    pub config: PartitionGroupConfig,
    /// Members currently participating in the group.
    pub members: BTreeSet<MemberId>,
    /// Whether this is the system management group.
    pub system: bool,
}

impl PartitionGroupMembership {
    pub fn new(
        config: PartitionGroupConfig,
        members: BTreeSet<MemberId>,
        system: bool,
    ) -> Self {
        Self {
            group: config.name.clone(),
            config,
            members,
            system,
        }
    }

    /// A record seeded with a single member, as created at start for
    /// each locally configured group.
    pub fn solo(config: PartitionGroupConfig, member: MemberId, system: bool) -> Self {
        let mut members = BTreeSet::new();
        members.insert(member);
        Self::new(config, members, system)
    }

    pub fn group_type(&self) -> &str {
        &self.config.group_type
    }

    pub fn contains(&self, member: &MemberId) -> bool {
        self.members.contains(member)
    }

    /// A copy of this record with a different member set. Name, config,
    /// and system flag are unchanged.
    pub fn with_members(&self, members: BTreeSet<MemberId>) -> Self {
        Self {
            group: self.group.clone(),
            config: self.config.clone(),
            members,
            system: self.system,
        }
    }
}

impl fmt::Display for PartitionGroupMembership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<String> = self.members.iter().map(|m| m.to_string()).collect();
        write!(
            f,
            "{} (type={}, members=[{}])",
            self.group,
            self.group_type(),
            members.join(", ")
        )
    }
}

/// Wire envelope exchanged between peers during bootstrap.
///
/// Carries the sender's identity, its system group record if it has
/// one, and its current non-system group records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionGroupInfo {
    /// Identity of the sending member.
    pub member_id: MemberId,
    /// The sender's system group record, if known.
    pub system_group: Option<PartitionGroupMembership>,
    /// The sender's non-system group records.
    pub groups: Vec<PartitionGroupMembership>,
}

impl PartitionGroupInfo {
    pub fn new(
        member_id: MemberId,
        system_group: Option<PartitionGroupMembership>,
        groups: Vec<PartitionGroupMembership>,
    ) -> Self {
        Self {
            member_id,
            system_group,
            groups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(name: &str, group_type: &str, members: &[&str]) -> PartitionGroupMembership {
        PartitionGroupMembership::new(
            PartitionGroupConfig::new(name, group_type),
            members.iter().map(|m| MemberId::new(*m)).collect(),
            false,
        )
    }

    #[test]
    fn test_solo_record() {
        let record = PartitionGroupMembership::solo(
            PartitionGroupConfig::new("system", "raft"),
            MemberId::new("a"),
            true,
        );
        assert_eq!(record.group, "system");
        assert_eq!(record.group_type(), "raft");
        assert!(record.system);
        assert_eq!(record.members.len(), 1);
        assert!(record.contains(&MemberId::new("a")));
    }

    #[test]
    fn test_with_members_keeps_config() {
        let record = make_record("data", "primary-backup", &["a"]);
        let grown = record.with_members(
            ["a", "b"].iter().map(|m| MemberId::new(*m)).collect(),
        );
        assert_eq!(grown.group, "data");
        assert_eq!(grown.group_type(), "primary-backup");
        assert_eq!(grown.members.len(), 2);
        // The original is untouched.
        assert_eq!(record.members.len(), 1);
    }

    #[test]
    fn test_record_equality_ignores_member_insertion_order() {
        let ab = make_record("data", "raft", &["a", "b"]);
        let ba = make_record("data", "raft", &["b", "a"]);
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_display_lists_members() {
        let record = make_record("data", "raft", &["b", "a"]);
        assert_eq!(record.to_string(), "data (type=raft, members=[a, b])");
    }
}
