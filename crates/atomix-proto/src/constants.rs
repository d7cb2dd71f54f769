/// Atomix protocol constants.

/// Messaging subject for the partition-group bootstrap exchange.
/// Must be identical on every peer in a cluster.
pub const BOOTSTRAP_SUBJECT: &str = "partition-group-bootstrap";

/// Bootstrap retry backoff schedule in seconds. Attempts beyond the
/// fifth stay at the last entry.
pub const FIBONACCI_BACKOFF_SECS: [u64; 5] = [1, 1, 2, 3, 5];

/// Number of bootstrap rounds after which a node gives up looking for
/// data partition groups. Discovery of the system group is never
/// bounded by this.
pub const MAX_PARTITION_GROUP_ATTEMPTS: usize = 5;

/// Retry interval for a single unreachable bootstrap peer (seconds).
pub const PEER_RETRY_INTERVAL_SECS: u64 = 1;
