//! Append-only audit trail of manager events

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;

/// Event categories written in the second bracket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    User,
    Watchdog,
    Crash,
    Scheduler,
    Updater,
    Sentinel,
    System,
    Backup,
    Error,
    Restart,
    Guard,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Watchdog => "WATCHDOG",
            Self::Crash => "CRASH",
            Self::Scheduler => "SCHEDULER",
            Self::Updater => "UPDATER",
            Self::Sentinel => "SENTINEL",
            Self::System => "SYSTEM",
            Self::Backup => "BACKUP",
            Self::Error => "ERROR",
            Self::Restart => "RESTART",
            Self::Guard => "GUARD",
        }
    }
}

pub struct EventLog {
    path: Mutex<Option<PathBuf>>,
}

impl EventLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path: Mutex::new(path),
        }
    }

    /// Event log that only mirrors to the debug log
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn set_path(&self, path: Option<PathBuf>) {
        if let Ok(mut current) = self.path.lock() {
            *current = path;
        }
    }

    /// Record one event; write failures are logged and otherwise ignored
    pub fn event(&self, category: Category, message: &str) {
        let line = format_line(&Local::now().format("%Y-%m-%d %H:%M:%S").to_string(), category, message);
        log::debug!("event: {}", line);

        let Ok(path) = self.path.lock() else {
            return;
        };
        if let Some(path) = path.as_deref() {
            if let Err(e) = append(path, &line) {
                log::warn!("Failed to write event log {}: {}", path.display(), e);
            }
        }
    }
}

fn format_line(timestamp: &str, category: Category, message: &str) -> String {
    format!("[{}] [{}] {}", timestamp, category.as_str(), message)
}

fn append(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{}", line)
}
