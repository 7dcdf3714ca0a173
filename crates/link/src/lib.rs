//! amphigory-link: the bidirectional persistent channel between daemon and
//! controller (spec §4.12) — message envelope, wire codec, RPC dispatch,
//! and reconnect backoff. Socket ownership (who dials, who listens) lives
//! in the daemon and controller binaries; this crate only defines the
//! protocol they speak.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod backoff;
mod message;
mod pending;
mod registry;
mod wire;

pub use backoff::Backoff;
pub use message::{DiscEventKind, Message, RpcError, RpcOutcome};
pub use pending::{PendingError, PendingRequests};
pub use registry::{MethodRegistry, RpcHandler};
pub use wire::{read_message, write_message, WireError, MAX_FRAME_SIZE};

/// Default RPC timeout (spec §4.12): a request with no matching response
/// within this long is treated as failed.
pub const DEFAULT_RPC_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
