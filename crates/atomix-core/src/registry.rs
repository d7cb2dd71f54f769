//! Partition-group type registry.
//!
//! A lookup table keyed by string type name. Group configurations name
//! their type; at start the manager resolves each configured type here
//! and rejects unknown ones. The type-specific configuration blob in a
//! group config is opaque to this subsystem and interpreted by the
//! protocol engine behind the type.

use std::collections::HashMap;

use atomix_proto::error::{AtomixError, AtomixResult};

/// Descriptor of one partition-group type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionGroupType {
    /// The type name groups refer to in their configuration.
    pub name: String,
    /// Human-readable description for diagnostics.
    pub description: String,
}

impl PartitionGroupType {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// The consensus-replicated group type.
    pub fn raft() -> Self {
        Self::new("raft", "strongly consistent, Raft-replicated partitions")
    }

    /// The primary-backup replicated group type.
    pub fn primary_backup() -> Self {
        Self::new(
            "primary-backup",
            "eventually consistent, primary-backup replicated partitions",
        )
    }
}

/// Registry of known partition-group types.
#[derive(Debug, Clone)]
pub struct PartitionGroupTypeRegistry {
    types: HashMap<String, PartitionGroupType>,
}

impl PartitionGroupTypeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// A registry with the built-in group types.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(PartitionGroupType::raft());
        registry.register(PartitionGroupType::primary_backup());
        registry
    }

    /// Register a type, replacing any previous entry with the same name.
    pub fn register(&mut self, group_type: PartitionGroupType) {
        self.types.insert(group_type.name.clone(), group_type);
    }

    pub fn get(&self, name: &str) -> Option<&PartitionGroupType> {
        self.types.get(name)
    }

    /// Resolve a type name, failing with `UnknownGroupType` if absent.
    pub fn require(&self, name: &str) -> AtomixResult<&PartitionGroupType> {
        self.get(name).ok_or_else(|| AtomixError::UnknownGroupType {
            group_type: name.to_string(),
        })
    }

    /// All registered type names, sorted for deterministic output.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for PartitionGroupTypeRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types() {
        let registry = PartitionGroupTypeRegistry::with_builtin();
        assert!(registry.get("raft").is_some());
        assert!(registry.get("primary-backup").is_some());
        assert_eq!(registry.names(), vec!["primary-backup", "raft"]);
    }

    #[test]
    fn test_require_unknown_type() {
        let registry = PartitionGroupTypeRegistry::with_builtin();
        let err = registry.require("log").unwrap_err();
        assert_eq!(
            err,
            AtomixError::UnknownGroupType {
                group_type: "log".to_string()
            }
        );
    }

    #[test]
    fn test_register_custom_type() {
        let mut registry = PartitionGroupTypeRegistry::new();
        registry.register(PartitionGroupType::new("log", "replicated log partitions"));
        assert!(registry.require("log").is_ok());
        assert!(registry.get("raft").is_none());
    }
}
