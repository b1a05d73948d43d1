//! Save-in-progress detection
//!
//! Log markers are the primary signal. Disk writes observed over a short
//! window corroborate a save that has not logged its start marker yet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use super::probe::ProcessProbe;
use crate::config::SentinelSettings;

/// Marker transition caused by one log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentinelEvent {
    SaveStarted,
    SaveFinished,
}

/// Why a shutdown is being held back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockReason {
    pub save_active: bool,
    pub disk_busy: bool,
}

impl BlockReason {
    pub fn is_blocked(&self) -> bool {
        self.save_active || self.disk_busy
    }
}

#[derive(Debug, Clone)]
struct Markers {
    start: String,
    finish_a: String,
    finish_b: String,
}

impl From<&SentinelSettings> for Markers {
    fn from(s: &SentinelSettings) -> Self {
        Self {
            start: s.save_start.clone(),
            finish_a: s.save_finish_a.clone(),
            finish_b: s.save_finish_b.clone(),
        }
    }
}

pub struct SaveSentinel {
    markers: RwLock<Markers>,
    save_active: AtomicBool,
}

impl SaveSentinel {
    pub fn new(settings: &SentinelSettings) -> Self {
        Self {
            markers: RwLock::new(Markers::from(settings)),
            save_active: AtomicBool::new(false),
        }
    }

    /// Pick up new marker strings after a settings reload
    pub fn update_markers(&self, settings: &SentinelSettings) {
        if let Ok(mut markers) = self.markers.write() {
            *markers = Markers::from(settings);
        }
    }

    /// Update the save flag from one log line
    pub fn on_log_line(&self, line: &str) -> Option<SentinelEvent> {
        let markers = self.markers.read().ok()?;
        let hit = |m: &str| !m.is_empty() && line.contains(m);

        if hit(&markers.start) {
            self.save_active.store(true, Ordering::SeqCst);
            Some(SentinelEvent::SaveStarted)
        } else if hit(&markers.finish_a) || hit(&markers.finish_b) {
            self.save_active.store(false, Ordering::SeqCst);
            Some(SentinelEvent::SaveFinished)
        } else {
            None
        }
    }

    pub fn is_save_active(&self) -> bool {
        self.save_active.load(Ordering::SeqCst)
    }

    /// Force the flag (used when the owning process goes away)
    pub fn set_save_active(&self, active: bool) {
        self.save_active.store(active, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.set_save_active(false);
    }

    /// Sample the save flag and the process's disk writes over `window`
    pub async fn check(&self, pid: u32, probe: &dyn ProcessProbe, window: Duration) -> BlockReason {
        let save_active = self.is_save_active();

        let disk_busy = match probe.disk_write_bytes(pid) {
            Some(before) => {
                tokio::time::sleep(window).await;
                probe
                    .disk_write_bytes(pid)
                    .map_or(false, |after| after > before)
            }
            None => false,
        };

        BlockReason {
            save_active,
            disk_busy,
        }
    }
}
