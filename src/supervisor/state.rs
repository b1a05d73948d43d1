//! Managed process state machine
//!
//! ```text
//!     ┌─────────┐
//!     │ Offline │◄──────────────────────────┐
//!     └────┬────┘                           │
//!          │ start / adopt                  │
//!     ┌────▼─────┐                          │
//!     │ Starting │──────────┐               │
//!     └────┬─────┘          │ died          │
//!          │ ready/alive    │               │
//!     ┌────▼───┐       ┌────▼────┐          │
//!     │ Online │──────►│ Crashed │          │
//!     └────┬───┘ died  └─────────┘          │
//!          │ stop (restart)                 │
//!     ┌────▼─────────────────────┐  killed  │
//!     │ ShuttingDown/Restarting  │──────────┘
//!     └──────────────────────────┘
//! ```

use chrono::{DateTime, Local};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Offline,
    Starting,
    Online,
    ShuttingDown,
    Restarting,
    Crashed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "OFFLINE",
            Self::Starting => "STARTING",
            Self::Online => "ONLINE",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Restarting => "RESTARTING",
            Self::Crashed => "CRASHED",
        }
    }

    /// States in which a process is owned
    pub fn holds_pid(&self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Online | Self::ShuttingDown | Self::Restarting
        )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime state of the supervised server
#[derive(Debug, Clone)]
pub struct ManagedProcessState {
    pub status: Status,
    pub pid: Option<u32>,
    /// Set by an explicit stop, cleared once the shutdown completes
    pub manual_shutdown_requested: bool,
    /// Set by an explicit restart, cleared once the next start completes
    pub restart_requested: bool,
    /// Whether a live process was observed since the last start
    pub was_running: bool,
    pub crash_count: u32,
    /// Wall-clock start of the current process (for uptime scheduling)
    pub started_at: Option<DateTime<Local>>,
    pub state_change_time: Instant,
}

impl Default for ManagedProcessState {
    fn default() -> Self {
        Self {
            status: Status::Offline,
            pid: None,
            manual_shutdown_requested: false,
            restart_requested: false,
            was_running: false,
            crash_count: 0,
            started_at: None,
            state_change_time: Instant::now(),
        }
    }
}

impl ManagedProcessState {
    pub fn new() -> Self {
        Self::default()
    }

    fn transition(&mut self, status: Status) {
        self.status = status;
        self.state_change_time = Instant::now();
    }

    /// A freshly spawned process
    pub fn set_starting(&mut self, pid: u32, started_at: DateTime<Local>) {
        self.pid = Some(pid);
        self.started_at = Some(started_at);
        self.was_running = false;
        self.transition(Status::Starting);
    }

    /// Attach to a process that is already running
    pub fn set_adopted(&mut self, pid: u32, started_at: Option<DateTime<Local>>) {
        self.pid = Some(pid);
        self.started_at = started_at.or(self.started_at);
        self.was_running = true;
        self.transition(Status::Online);
    }

    /// Liveness confirmed for the current pid
    pub fn set_online(&mut self) {
        self.was_running = true;
        if self.status != Status::Online {
            self.transition(Status::Online);
        }
    }

    /// Shutdown sequence begins; the pid stays until the kill is confirmed
    pub fn set_stopping(&mut self) {
        let next = if self.restart_requested {
            Status::Restarting
        } else {
            Status::ShuttingDown
        };
        self.transition(next);
    }

    /// Process confirmed gone
    pub fn set_offline(&mut self) {
        self.pid = None;
        self.started_at = None;
        self.was_running = false;
        self.transition(Status::Offline);
    }

    /// Unplanned death of a process that had been running
    pub fn set_crashed(&mut self) {
        self.pid = None;
        self.started_at = None;
        self.was_running = false;
        self.crash_count += 1;
        self.transition(Status::Crashed);
    }

    pub fn reset_crash_count(&mut self) {
        self.crash_count = 0;
    }

    /// Whether a live process is expected
    pub fn expects_alive(&self) -> bool {
        self.pid.is_some()
    }

    /// `pid` is set exactly when the status owns a process
    pub fn is_consistent(&self) -> bool {
        self.pid.is_some() == self.status.holds_pid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_new() {
        let state = ManagedProcessState::new();
        assert_eq!(state.status, Status::Offline);
        assert!(state.pid.is_none());
        assert!(!state.expects_alive());
        assert!(state.is_consistent());
    }

    #[test]
    fn test_state_starting_then_online() {
        let mut state = ManagedProcessState::new();
        state.set_starting(4242, Local::now());
        assert_eq!(state.status, Status::Starting);
        assert_eq!(state.pid, Some(4242));
        assert!(!state.was_running);
        assert!(state.is_consistent());

        state.set_online();
        assert_eq!(state.status, Status::Online);
        assert!(state.was_running);
        assert!(state.is_consistent());
    }

    #[test]
    fn test_state_stopping_keeps_pid() {
        let mut state = ManagedProcessState::new();
        state.set_adopted(4242, None);
        state.set_stopping();
        assert_eq!(state.status, Status::ShuttingDown);
        assert_eq!(state.pid, Some(4242));
        assert!(state.is_consistent());
    }

    #[test]
    fn test_state_restarting() {
        let mut state = ManagedProcessState::new();
        state.set_adopted(4242, None);
        state.restart_requested = true;
        state.set_stopping();
        assert_eq!(state.status, Status::Restarting);
        assert!(state.is_consistent());
    }

    #[test]
    fn test_state_offline_clears_pid() {
        let mut state = ManagedProcessState::new();
        state.set_adopted(4242, Some(Local::now()));
        state.set_offline();
        assert_eq!(state.status, Status::Offline);
        assert!(state.pid.is_none());
        assert!(state.started_at.is_none());
        assert!(!state.was_running);
        assert!(state.is_consistent());
    }

    #[test]
    fn test_state_crashed() {
        let mut state = ManagedProcessState::new();
        state.set_adopted(4242, None);
        state.set_crashed();
        assert_eq!(state.status, Status::Crashed);
        assert_eq!(state.crash_count, 1);
        assert!(state.pid.is_none());
        assert!(state.is_consistent());

        state.reset_crash_count();
        assert_eq!(state.crash_count, 0);
    }

    #[test]
    fn test_status_as_str() {
        assert_eq!(Status::Offline.as_str(), "OFFLINE");
        assert_eq!(Status::Starting.as_str(), "STARTING");
        assert_eq!(Status::Online.as_str(), "ONLINE");
        assert_eq!(Status::ShuttingDown.as_str(), "SHUTTING_DOWN");
        assert_eq!(Status::Restarting.as_str(), "RESTARTING");
        assert_eq!(Status::Crashed.as_str(), "CRASHED");
    }
}
