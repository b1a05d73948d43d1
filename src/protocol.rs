//! IPC protocol between wardend and wardenctl
//!
//! MessagePack-encoded requests and responses over the peer-credential
//! unix socket.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

const SOCKET_NAME: &str = "warden.sock";

/// Control socket path: `$XDG_RUNTIME_DIR/warden.sock`, else `/tmp/warden-<uid>.sock`
pub fn socket_path() -> String {
    let path = match dirs::runtime_dir() {
        Some(dir) => dir.join(SOCKET_NAME),
        None => PathBuf::from(format!("/tmp/warden-{}.sock", nix::unistd::getuid())),
    };
    path.to_string_lossy().into_owned()
}

/// Request from CLI to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Health check
    Ping,
    /// Current server state
    Status,
    Start,
    /// Save-gated stop
    Stop,
    Restart,
    /// Zero the crash counter
    ResetCrashes,
    /// Archive the save directory now
    Backup,
    /// Recent console lines
    Logs { lines: usize },
}

/// Server state as shown to the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub status: String,
    pub pid: Option<u32>,
    pub crash_count: u32,
    pub uptime_secs: Option<u64>,
    /// Seconds until the next scheduled restart
    pub countdown: Option<u64>,
}

/// Response from daemon to CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// Success with no data
    Ok,
    Pong,
    Status(StatusInfo),
    /// Success, with something the operator should read
    Notice(String),
    Logs(Vec<String>),
    Error(String),
}
