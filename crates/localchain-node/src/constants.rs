use std::time::Duration;

/// How long a fresh node waits before asking peers for their chain.
pub(crate) const STARTUP_SYNC_DELAY: Duration = Duration::from_secs(1);
pub(crate) const COMMAND_BUFFER: usize = 64;
pub(crate) const PEER_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Upper bound on one inbound envelope; a full chain travels in one.
pub(crate) const MAX_ENVELOPE_BYTES: u64 = 64 * 1024 * 1024;
pub(crate) const NODE_ID_LEN: usize = 12;
