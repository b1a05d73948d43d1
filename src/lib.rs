//! warden - headless supervisor for a dedicated game server
//!
//! Keeps one server process alive: starts it, stops it without cutting a
//! save in half, restarts it on a schedule and recovers it after crashes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          wardend (control socket, signals)           │
//! ├──────────────────────────────────────────────────────┤
//! │  Supervisor  │  Watchdog  │  Scheduler  │  Tailer    │
//! ├──────────────────────────────────────────────────────┤
//! │  ProcessProbe │ ProcessLauncher │ SaveSentinel       │
//! ├──────────────────────────────────────────────────────┤
//! │  Console │ Notifications │ Event log │ Backups       │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod backup;
pub mod config;
pub mod console;
pub mod eventlog;
pub mod history;
pub mod notify;
pub mod protocol;
pub mod signals;
pub mod supervisor;

pub use config::Settings;
pub use supervisor::{Status, Supervisor, Trigger};
