//! Operator-facing output
//!
//! The supervisor never renders anything itself. It appends lines and
//! publishes its displayed state through [`Console`]; the daemon keeps a
//! bounded in-memory copy that `wardenctl logs` and `wardenctl status` read.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::supervisor::Status;

/// Presentation callbacks used by the supervisor and its loops
pub trait Console: Send + Sync {
    /// Append one line to the operator's log view
    fn append_log_line(&self, line: &str);

    /// Update the displayed server state
    fn set_displayed_state(&self, status: Status, pid: Option<u32>, crash_count: u32);

    /// Update the displayed restart countdown (None hides it)
    fn set_countdown(&self, _secs: Option<u64>) {}
}

/// Last state published through [`Console::set_displayed_state`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayedState {
    pub status: Status,
    pub pid: Option<u32>,
    pub crash_count: u32,
    pub countdown: Option<u64>,
}

impl Default for DisplayedState {
    fn default() -> Self {
        Self {
            status: Status::Offline,
            pid: None,
            crash_count: 0,
            countdown: None,
        }
    }
}

/// Ring buffer of recent lines plus the displayed state
pub struct BufferedConsole {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
    state: Mutex<DisplayedState>,
}

impl BufferedConsole {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            state: Mutex::new(DisplayedState::default()),
        }
    }

    /// The newest `n` lines, oldest first
    pub fn tail(&self, n: usize) -> Vec<String> {
        let Ok(lines) = self.lines.lock() else {
            return Vec::new();
        };
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }

    pub fn displayed(&self) -> DisplayedState {
        self.state.lock().map(|s| *s).unwrap_or_default()
    }
}

impl Console for BufferedConsole {
    fn append_log_line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            if lines.len() == self.capacity {
                lines.pop_front();
            }
            lines.push_back(line.to_string());
        }
    }

    fn set_displayed_state(&self, status: Status, pid: Option<u32>, crash_count: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.status = status;
            state.pid = pid;
            state.crash_count = crash_count;
        }
    }

    fn set_countdown(&self, secs: Option<u64>) {
        if let Ok(mut state) = self.state.lock() {
            state.countdown = secs;
        }
    }
}
