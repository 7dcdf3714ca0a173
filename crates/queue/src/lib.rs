//! amphigory-queue: the shared-filesystem Task Directory (spec §4.1).

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod dir;

pub use dir::{QueueError, TaskDirectory};
