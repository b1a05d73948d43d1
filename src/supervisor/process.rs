//! Server process spawning and termination

use std::path::{Path, PathBuf};
use std::process::Stdio;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Command;

use crate::config::Settings;

/// Fully resolved command line for the server binary
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl LaunchCommand {
    /// Build the launch command from the current settings
    pub fn from_settings(settings: &Settings) -> Self {
        let launch = &settings.launch;
        let mut args = Vec::new();

        let mut map = launch.map.clone();
        if let Some(name) = &launch.session_name {
            map.push_str("?SessionName=");
            map.push_str(name);
        }
        args.push(map);

        if let Some(port) = launch.port {
            args.push(format!("-Port={}", port));
        }
        if let Some(port) = launch.query_port {
            args.push(format!("-QueryPort={}", port));
        }
        if let Some(max) = launch.max_players {
            args.push(format!("-MaxPlayers={}", max));
        }
        if launch.rcon_enabled {
            args.push("-RconEnabled=true".to_string());
            args.push(format!("-RconPort={}", launch.rcon_port));
            if !launch.rcon_password.is_empty() {
                args.push(format!("-RconPassword={}", launch.rcon_password));
            }
        }
        args.extend(launch.extra_args.iter().cloned());
        args.push("-log".to_string());

        Self {
            program: settings.executable_path(),
            args,
            working_dir: settings.manager.install_dir.clone(),
        }
    }

    /// Command line for display, with the RCON password masked
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|a| {
            if a.starts_with("-RconPassword=") {
                "-RconPassword=****".to_string()
            } else {
                a.clone()
            }
        }));
        parts.join(" ")
    }
}

/// Spawns and signals server processes
pub trait ProcessLauncher: Send + Sync {
    /// Start the server, returning its pid
    fn spawn(&self, cmd: &LaunchCommand) -> Result<u32, SpawnError>;

    /// Ask the process to exit
    fn terminate(&self, pid: u32) -> Result<(), SpawnError>;

    /// Kill the process outright
    fn force_kill(&self, pid: u32) -> Result<(), SpawnError>;
}

/// Launcher for real OS processes
#[derive(Debug, Default)]
pub struct OsLauncher;

impl OsLauncher {
    pub fn new() -> Self {
        Self
    }

    fn signal(pid: u32, sig: Signal) -> Result<(), SpawnError> {
        let raw = i32::try_from(pid).map_err(|_| SpawnError::Signal {
            pid,
            source: Errno::EINVAL,
        })?;
        match signal::kill(Pid::from_raw(raw), sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(source) => Err(SpawnError::Signal { pid, source }),
        }
    }
}

impl ProcessLauncher for OsLauncher {
    fn spawn(&self, cmd: &LaunchCommand) -> Result<u32, SpawnError> {
        if !cmd.program.is_file() {
            return Err(SpawnError::NotFound(cmd.program.clone()));
        }

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        if is_dir(&cmd.working_dir) {
            command.current_dir(&cmd.working_dir);
        }
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
        command.stderr(Stdio::null());
        // Own process group: a Ctrl-C aimed at the daemon must not reach the server
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| SpawnError::Spawn(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| SpawnError::Spawn("process exited before reporting a pid".into()))?;

        // Reap on exit so liveness probes never see a lingering zombie
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => log::debug!("Server process {} exited: {}", pid, status),
                Err(e) => log::debug!("Failed to wait for server process {}: {}", pid, e),
            }
        });

        Ok(pid)
    }

    fn terminate(&self, pid: u32) -> Result<(), SpawnError> {
        Self::signal(pid, Signal::SIGTERM)
    }

    fn force_kill(&self, pid: u32) -> Result<(), SpawnError> {
        Self::signal(pid, Signal::SIGKILL)
    }
}

fn is_dir(path: &Path) -> bool {
    !path.as_os_str().is_empty() && path.is_dir()
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Server executable not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("Failed to signal process {pid}: {source}")]
    Signal { pid: u32, source: Errno },
}
