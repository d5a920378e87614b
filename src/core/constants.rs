//! Socket core constants.
//!
//! Defaults shared by servers, clients and connection wrappers.

use std::time::Duration;

// =============================================================================
// BUFFERS
// =============================================================================

/// Default buffer size for stream reads (32 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Receive buffer for a single datagram (largest UDP payload fits).
pub const DATAGRAM_BUFFER_SIZE: usize = 65535;

/// Kernel buffer size suggested for high-throughput datagram sockets (1 MiB).
pub const LARGE_SOCKET_BUFFER_SIZE: usize = 1024 * 1024;

// =============================================================================
// TIMEOUTS
// =============================================================================

/// Idle timeouts below this value disable idle tracking on servers.
pub const MIN_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Drain bound applied by `shutdown` when the caller's context has no deadline.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause after a transient accept or receive error before retrying.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(10);

// =============================================================================
// DATAGRAM FLOWS
// =============================================================================

/// Datagrams queued per peer flow before new ones are dropped.
pub const FLOW_QUEUE_DEPTH: usize = 64;

/// Peer map size above which closed flows are pruned on insert.
pub const FLOW_PRUNE_THRESHOLD: usize = 1024;

// =============================================================================
// UNIX SOCKETS
// =============================================================================

/// Highest group id accepted for unix socket files.
pub const MAX_GID: u32 = 32767;

/// Default permission bits for unix socket files.
pub const DEFAULT_UNIX_PERM: u32 = 0o770;
