/// Member identity and addressing types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AtomixError;

/// Identifier of a cluster member.
///
/// An opaque string with an optional namespace. Two identifiers are
/// equal only when both the namespace and the id match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId {
    /// Optional namespace qualifying the id.
    pub namespace: Option<String>,
    /// The member id proper.
    pub id: String,
}

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            namespace: None,
            id: id.into(),
        }
    }

    pub fn namespaced(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            id: id.into(),
        }
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}.{}", ns, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Network address of a cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Address {
    type Err = AtomixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AtomixError::InvalidAddress(s.to_string()))?;
        if host.is_empty() {
            return Err(AtomixError::InvalidAddress(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| AtomixError::InvalidAddress(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

/// A cluster member node descriptor: identity plus reachable address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub address: Address,
}

impl Member {
    pub fn new(id: impl Into<MemberId>, address: Address) -> Self {
        Self {
            id: id.into(),
            address,
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}

impl PartialOrd for Member {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Member {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}
