//! amphigory-core: domain types, state machines, and pure algorithms shared
//! by the daemon and controller processes.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod classifier;
pub mod clock;
pub mod disc;
pub mod drive;
pub mod duration;
pub mod error;
pub mod fingerprint;
pub mod id;
pub mod reconciler;
pub mod scan_result;
pub mod task;

pub use clock::{Clock, FakeClock, SystemClock};
pub use disc::{
    AudioStream, ClassificationLabel, Confidence, Disc, SubtitleStream, Track, TrackStatus,
};
pub use drive::{Drive, DriveError, DriveStateKind, ScanCache};
pub use error::{ErrorCode, TaskError};
pub use fingerprint::{fingerprint, Fingerprint, FingerprintError, MediumKind};
pub use id::{DiscId, DriveId, TaskId, TrackId};
pub use reconciler::{required_stages, required_stages_on_disk, reset_track, Stage};
pub use scan_result::{ScanResultPayload, ScanResultTrack};
pub use task::{Completion, Owner, OutcomeStatus, Task, TaskKind, TaskPayload, TaskStatus};
