//! Process discovery and liveness
//!
//! A server is identified by executable name AND by its resolved executable
//! path lying under the installation directory, so two installations of the
//! same binary on one host never attach to each other's process.

use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

/// Snapshot of one OS process
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub exe: Option<PathBuf>,
    pub zombie: bool,
}

/// Read-only view of the host's process table
pub trait ProcessProbe: Send + Sync {
    /// All processes currently visible
    fn processes(&self) -> Vec<ProcessInfo>;

    /// Process exists and is not a zombie
    fn is_alive(&self, pid: u32) -> bool;

    /// Cumulative bytes written to disk by the process
    fn disk_write_bytes(&self, pid: u32) -> Option<u64>;

    /// Process start time, seconds since the epoch
    fn start_time(&self, pid: u32) -> Option<u64>;

    /// First live process named `name` whose executable lies under `install`
    fn find_pid(&self, install: &Path, name: &str) -> Option<u32> {
        let install = install
            .canonicalize()
            .unwrap_or_else(|_| normalize(install));
        find_matching(&self.processes(), &install, name)
    }
}

/// Path-scoped match over a process snapshot
pub fn find_matching(procs: &[ProcessInfo], install: &Path, name: &str) -> Option<u32> {
    let install = fold_case(&normalize(install));
    if install.components().next().is_none() {
        return None;
    }

    procs
        .iter()
        .filter(|p| !p.zombie)
        .filter(|p| name_matches(p, name))
        .find(|p| {
            p.exe
                .as_deref()
                .map(|exe| fold_case(&normalize(exe)).starts_with(&install))
                .unwrap_or(false)
        })
        .map(|p| p.pid)
}

/// Reported names are truncated on some platforms; fall back to the exe file name
fn name_matches(proc: &ProcessInfo, name: &str) -> bool {
    if eq_name(&proc.name, name) {
        return true;
    }
    proc.exe
        .as_deref()
        .and_then(Path::file_name)
        .map(|f| eq_name(&f.to_string_lossy(), name))
        .unwrap_or(false)
}

#[cfg(windows)]
fn eq_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(not(windows))]
fn eq_name(a: &str, b: &str) -> bool {
    a == b
}

#[cfg(windows)]
fn fold_case(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().to_lowercase())
}

#[cfg(not(windows))]
fn fold_case(path: &Path) -> PathBuf {
    path.to_path_buf()
}

/// Lexical normalization: drop `.` and resolve `..` without touching the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Probe backed by the `sysinfo` process table
pub struct SystemProbe {
    system: Mutex<System>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn with_process<T>(&self, pid: u32, f: impl FnOnce(&sysinfo::Process) -> T) -> Option<T> {
        let mut system = self.system.lock().ok()?;
        let pid = Pid::from_u32(pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system
            .process(pid)
            .filter(|p| p.thread_kind().is_none())
            .map(f)
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SystemProbe {
    fn processes(&self) -> Vec<ProcessInfo> {
        let Ok(mut system) = self.system.lock() else {
            return Vec::new();
        };
        system.refresh_processes(ProcessesToUpdate::All, true);
        system
            .processes()
            .iter()
            // Linux threads show up as entries sharing the process's exe
            .filter(|(_, proc)| proc.thread_kind().is_none())
            .map(|(pid, proc)| ProcessInfo {
                pid: pid.as_u32(),
                name: proc.name().to_string_lossy().into_owned(),
                exe: proc.exe().map(Path::to_path_buf),
                zombie: proc.status() == ProcessStatus::Zombie,
            })
            .collect()
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.with_process(pid, |p| p.status() != ProcessStatus::Zombie)
            .unwrap_or(false)
    }

    fn disk_write_bytes(&self, pid: u32) -> Option<u64> {
        self.with_process(pid, |p| p.disk_usage().total_written_bytes)
    }

    fn start_time(&self, pid: u32) -> Option<u64> {
        self.with_process(pid, |p| p.start_time())
    }
}
