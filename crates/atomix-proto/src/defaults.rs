//! Tunable operational defaults for the atomix platform.
//!
//! Protocol-level constants (wire subjects, retry schedules) live in
//! [`crate::constants`]. This module centralizes configurable defaults.

// ─── Messaging ──────────────────────────────────────────────────────────────

/// Default request/response timeout for cluster messaging (seconds).
pub const DEFAULT_MESSAGING_TIMEOUT_SECS: u64 = 5;

/// Maximum size of a single wire message (bytes). 8 MB.
/// Protects against corrupt length prefixes on the wire.
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 8 * 1024 * 1024;

/// Channel buffer size for a per-subject inbound request queue.
pub const DEFAULT_INBOUND_CHANNEL_SIZE: usize = 128;

// ─── Membership ─────────────────────────────────────────────────────────────

/// Capacity of the cluster member-event broadcast channel.
pub const DEFAULT_MEMBER_EVENT_CHANNEL_SIZE: usize = 256;

// ─── Partition-group manager ────────────────────────────────────────────────

/// Channel buffer size for the manager's serial command queue.
pub const DEFAULT_MANAGER_CHANNEL_SIZE: usize = 256;
