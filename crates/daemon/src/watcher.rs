//! Disc insert/eject notifications (spec §4.2, §5): delivered by the OS on
//! a background thread and must be marshalled onto the daemon's reactor
//! before touching drive state, so the watcher's surface is a channel, not
//! a callback invoked from that thread.

use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscEvent {
    Inserted {
        device: String,
        volume_path: PathBuf,
        volume_name: String,
    },
    Unmounted {
        volume_path: PathBuf,
    },
}

/// Source of disc events for one or more drives. Implementations forward
/// OS notifications onto an internal channel; [`next_event`] awaits the
/// next one.
#[async_trait]
pub trait DiscWatcher: Send {
    async fn next_event(&mut self) -> Option<DiscEvent>;
}

/// Polls device mount points directly. A real implementation would prefer
/// a kernel notification source (udev, IOKit, a filesystem-change watch);
/// polling here keeps the daemon portable without extra platform crates.
pub struct PollingDiscWatcher {
    devices: Vec<PollTarget>,
    interval: tokio::time::Duration,
}

struct PollTarget {
    device: String,
    mount_point: PathBuf,
    was_present: bool,
}

impl PollingDiscWatcher {
    pub fn new(devices: Vec<(String, PathBuf)>, interval: tokio::time::Duration) -> Self {
        Self {
            devices: devices
                .into_iter()
                .map(|(device, mount_point)| PollTarget {
                    device,
                    mount_point,
                    was_present: false,
                })
                .collect(),
            interval,
        }
    }
}

#[async_trait]
impl DiscWatcher for PollingDiscWatcher {
    async fn next_event(&mut self) -> Option<DiscEvent> {
        loop {
            for target in &mut self.devices {
                let present = target.mount_point.exists();
                if present && !target.was_present {
                    target.was_present = true;
                    let volume_name = target
                        .mount_point
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    return Some(DiscEvent::Inserted {
                        device: target.device.clone(),
                        volume_path: target.mount_point.clone(),
                        volume_name,
                    });
                }
                if !present && target.was_present {
                    target.was_present = false;
                    return Some(DiscEvent::Unmounted {
                        volume_path: target.mount_point.clone(),
                    });
                }
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Scripted event source for tests: yields events from a fixed queue, then
/// returns `None` forever (connection "closed").
#[cfg(test)]
pub struct FakeDiscWatcher {
    events: std::collections::VecDeque<DiscEvent>,
}

#[cfg(test)]
impl FakeDiscWatcher {
    pub fn new(events: Vec<DiscEvent>) -> Self {
        Self {
            events: events.into(),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl DiscWatcher for FakeDiscWatcher {
    async fn next_event(&mut self) -> Option<DiscEvent> {
        self.events.pop_front()
    }
}
