//! Wire codec for bootstrap envelopes.
//!
//! All peer-to-peer payloads are bincode-encoded. Member sets are kept
//! sorted in the record types, so encoding two equal values always
//! produces identical bytes. Codec identity must be stable across all
//! peers of a cluster.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AtomixError, AtomixResult};

/// Encode a value for the wire.
pub fn encode<T: Serialize>(value: &T) -> AtomixResult<Vec<u8>> {
    bincode::serialize(value).map_err(|_| AtomixError::Encode)
}

/// Decode a value from the wire.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> AtomixResult<T> {
    bincode::deserialize(bytes).map_err(|_| AtomixError::Decode)
}
