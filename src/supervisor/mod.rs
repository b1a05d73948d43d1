//! Server lifecycle supervision
//!
//! [`Supervisor`] owns the one [`ManagedProcessState`] for an installation.
//! User actions, the watchdog, the scheduler and the log tailer all go
//! through it:
//!
//! ```text
//!  wardenctl ──► start/stop/restart ──┐
//!  scheduler ──► restart ─────────────┤   ops lock (one operation at a time)
//!  watchdog  ──► poll_liveness ───────┤──► ManagedProcessState ──► Console
//!  tailer    ──► handle_log_line ─────┘           │
//!                                                 └──► NotificationSink, EventLog
//! ```
//!
//! Operations are serialized by an async lock, so a stop or restart always
//! finishes its shutdown (kill confirmed) before any later start runs. The
//! watchdog never queues behind an operation: it skips the tick instead.

pub mod probe;
pub mod process;
pub mod scheduler;
pub mod sentinel;
pub mod state;
mod tailer;
#[cfg(test)]
pub(crate) mod testing;
pub mod watchdog;

pub use probe::{ProcessInfo, ProcessProbe, SystemProbe};
pub use process::{LaunchCommand, OsLauncher, ProcessLauncher, SpawnError};
pub use sentinel::{BlockReason, SaveSentinel, SentinelEvent};
pub use state::{ManagedProcessState, Status};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{Local, TimeZone};
use tokio::time::Instant;

use crate::backup::{self, BackupError};
use crate::config::Settings;
use crate::console::{BufferedConsole, Console};
use crate::eventlog::{Category, EventLog};
use crate::history::PlayerHistory;
use crate::notify::{NotificationSink, NotifyEvent, NullSink};

/// Poll step while waiting for a signalled process to exit
const EXIT_POLL: Duration = Duration::from_millis(250);
/// How long to wait for a force-killed process to disappear
const KILL_SETTLE: Duration = Duration::from_secs(2);
/// Server logs kept when rotating before a launch
const LOGS_KEPT: usize = 50;

/// Who asked for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    User,
    Watchdog,
    Scheduler,
    /// An external updater restarting the server around a game update
    Updater,
    Restart,
    /// The daemon itself (startup attach, shutdown)
    System,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Watchdog => "WATCHDOG",
            Self::Scheduler => "SCHEDULER",
            Self::Updater => "UPDATER",
            Self::Restart => "RESTART",
            Self::System => "SYSTEM",
        }
    }

    fn category(&self) -> Category {
        match self {
            Self::User => Category::User,
            Self::Watchdog => Category::Watchdog,
            Self::Scheduler => Category::Scheduler,
            Self::Updater => Category::Updater,
            Self::Restart => Category::Restart,
            Self::System => Category::System,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new process was launched
    Spawned(u32),
    /// A matching process was already running and is now tracked
    AlreadyRunning(u32),
}

impl StartOutcome {
    pub fn pid(&self) -> u32 {
        match self {
            Self::Spawned(pid) | Self::AlreadyRunning(pid) => *pid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

/// What a liveness observation changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Unchanged,
    Adopted(u32),
    /// STARTING confirmed alive, now ONLINE
    Promoted,
    /// Exit after a stop or restart request
    ExpectedExit { restarted: bool },
    Crashed { restarted: bool },
    /// Exited before it was ever confirmed alive
    DiedDuringStartup,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Launch failed: {0}")]
    Launch(#[from] SpawnError),

    #[error("Backup failed: {0}")]
    Backup(#[from] BackupError),

    #[error("A backup is already running")]
    BackupRunning,

    #[error("Backup task failed: {0}")]
    BackupTask(String),

    #[error("Another operation is in progress")]
    Busy,
}

/// Holds an atomic flag for the lifetime of the guard
struct BusyFlag<'a>(&'a AtomicBool);

impl<'a> BusyFlag<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for BusyFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Inner {
    settings: RwLock<Arc<Settings>>,
    state: Mutex<ManagedProcessState>,
    sentinel: SaveSentinel,
    probe: Arc<dyn ProcessProbe>,
    launcher: Arc<dyn ProcessLauncher>,
    console: Arc<dyn Console>,
    notifier: RwLock<Arc<dyn NotificationSink>>,
    events: EventLog,
    history: Mutex<Option<PlayerHistory>>,
    /// Serializes start/stop/restart/reconcile
    ops: tokio::sync::Mutex<()>,
    backup_running: AtomicBool,
    reactive_pending: AtomicBool,
    tail_active: AtomicBool,
    tail_logs: bool,
}

pub struct SupervisorBuilder {
    settings: Settings,
    probe: Option<Arc<dyn ProcessProbe>>,
    launcher: Option<Arc<dyn ProcessLauncher>>,
    console: Option<Arc<dyn Console>>,
    notifier: Option<Arc<dyn NotificationSink>>,
    tail_logs: bool,
}

impl SupervisorBuilder {
    pub fn probe(mut self, probe: Arc<dyn ProcessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Follow the server log after each start (on by default)
    pub fn tail_logs(mut self, enabled: bool) -> Self {
        self.tail_logs = enabled;
        self
    }

    pub fn build(self) -> Supervisor {
        let settings = self.settings;
        let history = settings
            .manager
            .history_file
            .as_deref()
            .map(PlayerHistory::load_or_empty);

        Supervisor {
            inner: Arc::new(Inner {
                sentinel: SaveSentinel::new(&settings.sentinel),
                events: EventLog::new(settings.manager.event_log.clone()),
                settings: RwLock::new(Arc::new(settings)),
                state: Mutex::new(ManagedProcessState::new()),
                probe: self.probe.unwrap_or_else(|| Arc::new(SystemProbe::new())),
                launcher: self.launcher.unwrap_or_else(|| Arc::new(OsLauncher::new())),
                console: self
                    .console
                    .unwrap_or_else(|| Arc::new(BufferedConsole::new(1000))),
                notifier: RwLock::new(self.notifier.unwrap_or_else(|| Arc::new(NullSink))),
                history: Mutex::new(history),
                ops: tokio::sync::Mutex::new(()),
                backup_running: AtomicBool::new(false),
                reactive_pending: AtomicBool::new(false),
                tail_active: AtomicBool::new(false),
                tail_logs: self.tail_logs,
            }),
        }
    }
}

/// Cloneable handle to the lifecycle controller
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn builder(settings: Settings) -> SupervisorBuilder {
        SupervisorBuilder {
            settings,
            probe: None,
            launcher: None,
            console: None,
            notifier: None,
            tail_logs: true,
        }
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.inner
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in reloaded settings; takes effect at the next operation
    pub fn update_settings(&self, settings: Settings) {
        self.inner.sentinel.update_markers(&settings.sentinel);
        self.inner.events.set_path(settings.manager.event_log.clone());

        if self.settings().manager.history_file != settings.manager.history_file {
            let history = settings
                .manager
                .history_file
                .as_deref()
                .map(PlayerHistory::load_or_empty);
            *self.inner.history.lock().unwrap_or_else(PoisonError::into_inner) = history;
        }

        *self
            .inner
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
    }

    pub fn set_notifier(&self, notifier: Arc<dyn NotificationSink>) {
        *self
            .inner
            .notifier
            .write()
            .unwrap_or_else(PoisonError::into_inner) = notifier;
    }

    pub fn console(&self) -> Arc<dyn Console> {
        Arc::clone(&self.inner.console)
    }

    pub fn events(&self) -> &EventLog {
        &self.inner.events
    }

    pub fn sentinel(&self) -> &SaveSentinel {
        &self.inner.sentinel
    }

    fn lock_state(&self) -> MutexGuard<'_, ManagedProcessState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate the state and publish the result to the console
    fn with_state<R>(&self, f: impl FnOnce(&mut ManagedProcessState) -> R) -> R {
        let (result, status, pid, crashes) = {
            let mut state = self.lock_state();
            let result = f(&mut state);
            debug_assert!(state.is_consistent(), "inconsistent state: {:?}", *state);
            (result, state.status, state.pid, state.crash_count)
        };
        self.inner.console.set_displayed_state(status, pid, crashes);
        result
    }

    pub fn snapshot(&self) -> ManagedProcessState {
        self.lock_state().clone()
    }

    pub fn current_pid(&self) -> Option<u32> {
        self.lock_state().pid
    }

    /// Uptime of the tracked process
    pub fn uptime(&self) -> Option<Duration> {
        let started = self.lock_state().started_at?;
        (Local::now() - started).to_std().ok()
    }

    /// Whether a start/stop/restart is currently running
    pub fn is_busy(&self) -> bool {
        self.inner.ops.try_lock().is_err()
    }

    fn say(&self, line: &str) {
        log::info!("{}", line);
        self.inner.console.append_log_line(line);
    }

    fn notify(&self, event: NotifyEvent, message: &str) {
        let notifier = self
            .inner
            .notifier
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        notifier.notify(event, message);
    }

    // ---- start ----

    /// Launch the server unless a matching process is already running
    pub async fn start(&self, trigger: Trigger) -> Result<StartOutcome, SupervisorError> {
        let _ops = self.inner.ops.lock().await;
        self.start_locked(trigger)
    }

    fn start_locked(&self, trigger: Trigger) -> Result<StartOutcome, SupervisorError> {
        let settings = self.settings();

        if let Some(pid) = self.find_running(&settings) {
            if self.current_pid() != Some(pid) {
                self.adopt(pid);
            }
            self.say(&format!(">>> Server is already running (PID {})", pid));
            return Ok(StartOutcome::AlreadyRunning(pid));
        }

        let cmd = LaunchCommand::from_settings(&settings);
        if !cmd.program.is_file() {
            return Err(self.launch_failed(SpawnError::NotFound(cmd.program.clone())));
        }

        self.rotate_logs(&settings);
        self.say(&format!(
            "=== SERVER START [{}] ===",
            Local::now().format("%H:%M:%S")
        ));
        log::info!("Launching ({}): {}", trigger.as_str(), cmd.display());

        let pid = self
            .inner
            .launcher
            .spawn(&cmd)
            .map_err(|e| self.launch_failed(e))?;

        self.inner.sentinel.reset();
        self.with_state(|s| s.set_starting(pid, Local::now()));
        self.inner.events.event(
            trigger.category(),
            &format!("Server started by {} (PID {})", trigger.as_str(), pid),
        );
        self.say(&format!("Server process launched (PID {})", pid));
        self.notify(NotifyEvent::Start, "Server Started.");

        self.spawn_stability_check(pid, settings.timing.stability_check);
        self.ensure_tailer();
        Ok(StartOutcome::Spawned(pid))
    }

    fn find_running(&self, settings: &Settings) -> Option<u32> {
        let probe = &self.inner.probe;
        self.current_pid()
            .filter(|pid| probe.is_alive(*pid))
            .or_else(|| probe.find_pid(&settings.manager.install_dir, &settings.process_name()))
    }

    fn launch_failed(&self, err: SpawnError) -> SupervisorError {
        log::error!("{}", err);
        self.inner.console.append_log_line(&format!("!!! Launch failed: {}", err));
        self.inner.events.event(Category::Error, &err.to_string());
        SupervisorError::Launch(err)
    }

    fn rotate_logs(&self, settings: &Settings) {
        let log_path = settings.log_path();
        let Some(dir) = log_path.parent().filter(|d| d.is_dir()) else {
            return;
        };
        match backup::rotate_logs(dir, LOGS_KEPT) {
            Ok(0) => {}
            Ok(n) => log::debug!("Removed {} old server log(s)", n),
            Err(e) => log::debug!("Log rotation failed: {}", e),
        }
    }

    fn spawn_stability_check(&self, pid: u32, delay: Duration) {
        let sup = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if sup.current_pid() == Some(pid) && !sup.inner.probe.is_alive(pid) {
                sup.say(&format!(
                    "!!! Server process {} died immediately after launch",
                    pid
                ));
                sup.inner.events.event(
                    Category::Crash,
                    &format!("Process {} died within {}s of launch", pid, delay.as_secs()),
                );
            }
        });
    }

    fn adopt(&self, pid: u32) {
        let started = self
            .inner
            .probe
            .start_time(pid)
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| Local.timestamp_opt(secs, 0).single());
        self.with_state(|s| s.set_adopted(pid, started));
        self.say(&format!(">>> Attached to running server (PID {})", pid));
        self.inner
            .events
            .event(Category::Guard, &format!("Attached to existing process: {}", pid));
        self.ensure_tailer();
    }

    pub(crate) fn ensure_tailer(&self) {
        if !self.inner.tail_logs || self.inner.tail_active.load(Ordering::SeqCst) {
            return;
        }
        tokio::spawn(tailer::tail(self.clone()));
    }

    // ---- stop ----

    /// Stop the server through the save-gated shutdown sequence
    pub async fn stop(&self, trigger: Trigger) -> StopOutcome {
        let _ops = self.inner.ops.lock().await;
        self.stop_locked(trigger).await
    }

    async fn stop_locked(&self, trigger: Trigger) -> StopOutcome {
        let Some(pid) = self.current_pid() else {
            self.with_state(|s| s.manual_shutdown_requested = false);
            self.say("Server is not running.");
            return StopOutcome::NotRunning;
        };

        let restarting = self.with_state(|s| {
            s.manual_shutdown_requested = true;
            s.set_stopping();
            s.restart_requested
        });
        let (category, what) = if restarting {
            (Category::Restart, "Restart")
        } else {
            (trigger.category(), "Stop")
        };
        self.inner.events.event(
            category,
            &format!("{} requested by {} (PID {})", what, trigger.as_str(), pid),
        );
        self.say(&format!(">>> Stopping server (PID {})...", pid));

        if self.settings().backup.on_stop {
            self.say("Creating backup before shutdown...");
            if let Err(e) = self.backup().await {
                log::warn!("Backup before shutdown failed: {}", e);
            }
        }

        self.shutdown_sequence(pid).await;
        StopOutcome::Stopped
    }

    /// Wait for the save sentinel, then terminate `pid`. Never fails.
    async fn shutdown_sequence(&self, pid: u32) {
        let settings = self.settings();
        let sentinel = &settings.sentinel;
        let began = Instant::now();

        loop {
            if !self.inner.probe.is_alive(pid) {
                break;
            }
            let reason = self
                .inner
                .sentinel
                .check(pid, self.inner.probe.as_ref(), sentinel.disk_sample)
                .await;
            if !reason.is_blocked() {
                break;
            }

            let waited = began.elapsed();
            if waited >= sentinel.timeout {
                let msg = format!(
                    "SENTINEL: Timeout after {}s, forcing shutdown (Log: {} | Disk: {})",
                    sentinel.timeout.as_secs(),
                    reason.save_active,
                    reason.disk_busy
                );
                log::warn!("{}", msg);
                self.inner.console.append_log_line(&msg);
                self.inner.events.event(
                    Category::Sentinel,
                    &format!(
                        "Save did not finish within {}s, shutdown forced",
                        sentinel.timeout.as_secs()
                    ),
                );
                break;
            }

            self.inner.console.append_log_line(&format!(
                "SENTINEL: Waiting for Save... (Log: {} | Disk: {}) - {}s",
                reason.save_active,
                reason.disk_busy,
                waited.as_secs()
            ));
            tokio::time::sleep(sentinel.poll_interval).await;
        }

        if self.inner.probe.is_alive(pid) {
            if let Err(e) = self.inner.launcher.terminate(pid) {
                log::warn!("{}", e);
            }
        }
        if !self.wait_for_exit(pid, settings.timing.terminate_grace).await {
            self.say(&format!("Process {} ignored termination, killing", pid));
            if let Err(e) = self.inner.launcher.force_kill(pid) {
                log::warn!("{}", e);
            }
            if !self.wait_for_exit(pid, KILL_SETTLE).await {
                log::warn!("Process {} still visible after kill", pid);
            }
        }

        self.inner.sentinel.reset();
        self.with_state(|s| {
            s.set_offline();
            s.manual_shutdown_requested = false;
        });
        self.say("Server Stopped.");
        self.notify(NotifyEvent::Stop, "Server Stopped.");
    }

    async fn wait_for_exit(&self, pid: u32, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        loop {
            if !self.inner.probe.is_alive(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
    }

    // ---- restart ----

    /// Stop (if running), wait the restart delay, then start again
    pub async fn restart(&self, trigger: Trigger) -> Result<StartOutcome, SupervisorError> {
        let _ops = self.inner.ops.lock().await;

        if self.current_pid().is_some() {
            self.with_state(|s| s.restart_requested = true);
            self.stop_locked(trigger).await;

            let delay = self.settings().timing.restart_delay;
            self.say(&format!("Restarting in {}s...", delay.as_secs()));
            tokio::time::sleep(delay).await;
        }

        let result = self.start_locked(Trigger::Restart);
        self.with_state(|s| s.restart_requested = false);
        result
    }

    // ---- watchdog ----

    /// Apply one liveness observation, waiting for any running operation
    pub async fn reconcile(&self, observed: Option<u32>) -> ReconcileOutcome {
        let _ops = self.inner.ops.lock().await;
        self.reconcile_locked(observed)
    }

    /// One watchdog tick; `None` if an operation is in progress
    pub fn poll_liveness(&self) -> Option<ReconcileOutcome> {
        let Ok(_ops) = self.inner.ops.try_lock() else {
            log::debug!("Operation in progress, skipping liveness check");
            return None;
        };
        let observed = self.observe();
        let outcome = self.reconcile_locked(observed);
        if self.current_pid().is_some() {
            self.ensure_tailer();
        }
        Some(outcome)
    }

    /// Live pid: the tracked one, or a rediscovered match for the install
    fn observe(&self) -> Option<u32> {
        match self.current_pid() {
            Some(pid) => self.inner.probe.is_alive(pid).then_some(pid),
            None => {
                let settings = self.settings();
                self.inner
                    .probe
                    .find_pid(&settings.manager.install_dir, &settings.process_name())
            }
        }
    }

    fn reconcile_locked(&self, observed: Option<u32>) -> ReconcileOutcome {
        let current = self.snapshot();

        match (current.pid, observed) {
            (None, None) => ReconcileOutcome::Unchanged,
            (None, Some(pid)) => {
                self.adopt(pid);
                ReconcileOutcome::Adopted(pid)
            }
            (Some(expected), Some(pid)) if expected != pid => {
                self.adopt(pid);
                ReconcileOutcome::Adopted(pid)
            }
            (Some(_), Some(_)) if current.status == Status::Starting => {
                self.with_state(|s| s.set_online());
                self.say("Server process is up.");
                ReconcileOutcome::Promoted
            }
            (Some(_), Some(_)) => {
                self.with_state(|s| s.was_running = true);
                ReconcileOutcome::Unchanged
            }
            (Some(pid), None) => self.handle_exit(pid, &current),
        }
    }

    fn handle_exit(&self, pid: u32, current: &ManagedProcessState) -> ReconcileOutcome {
        self.inner.sentinel.reset();

        if current.manual_shutdown_requested || current.restart_requested {
            self.with_state(|s| {
                s.set_offline();
                s.manual_shutdown_requested = false;
                s.restart_requested = false;
            });
            self.say(&format!("Server process {} exited.", pid));

            let restarted = current.restart_requested
                && match self.start_locked(Trigger::Restart) {
                    Ok(_) => true,
                    Err(e) => {
                        log::error!("Restart after exit failed: {}", e);
                        false
                    }
                };
            return ReconcileOutcome::ExpectedExit { restarted };
        }

        if !current.was_running {
            self.with_state(|s| s.set_offline());
            self.say(&format!("!!! Server process {} exited during startup", pid));
            self.inner
                .events
                .event(Category::Error, &format!("Process {} exited during startup", pid));
            return ReconcileOutcome::DiedDuringStartup;
        }

        let count = self.with_state(|s| {
            s.set_crashed();
            s.crash_count
        });
        self.say(&format!(
            "!!! CRASH DETECTED: server process {} is gone (crash #{})",
            pid, count
        ));
        self.inner.events.event(
            Category::Watchdog,
            &format!("Crash detected (PID {}), crash count {}", pid, count),
        );
        self.notify(
            NotifyEvent::Crash,
            &format!("Server crashed unexpectedly! Crash count: {}", count),
        );

        let restarted = self.settings().manager.keep_alive && {
            self.say("Keep-alive: restarting server...");
            match self.start_locked(Trigger::Watchdog) {
                Ok(_) => true,
                Err(e) => {
                    log::error!("Keep-alive restart failed: {}", e);
                    false
                }
            }
        };
        ReconcileOutcome::Crashed { restarted }
    }

    // ---- log-driven events ----

    /// The server logged its ready marker
    pub fn mark_ready(&self) -> bool {
        let promoted = self.with_state(|s| {
            if s.status == Status::Starting {
                s.set_online();
                true
            } else {
                false
            }
        });
        if promoted {
            self.say("--- Server is ONLINE ---");
            self.inner.events.event(Category::System, "Server reported ready");
        }
        promoted
    }

    /// One line from the server log
    pub fn handle_log_line(&self, line: &str) {
        self.inner.console.append_log_line(line);

        match self.inner.sentinel.on_log_line(line) {
            Some(SentinelEvent::SaveStarted) => log::debug!("Save started"),
            Some(SentinelEvent::SaveFinished) => {
                log::debug!("Save finished");
                if self.settings().backup.reactive {
                    self.schedule_reactive_backup();
                }
            }
            None => {}
        }

        self.record_players(line);
    }

    fn record_players(&self, line: &str) {
        let mut guard = self
            .inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(history) = guard.as_mut() else {
            return;
        };
        if history.observe_line(line, Local::now()) {
            if let Err(e) = history.save() {
                log::warn!("Failed to save player history: {}", e);
            }
        }
    }

    fn schedule_reactive_backup(&self) {
        if self.inner.backup_running.load(Ordering::SeqCst)
            || self.inner.reactive_pending.swap(true, Ordering::SeqCst)
        {
            return;
        }
        let sup = self.clone();
        let delay = self.settings().timing.reactive_backup_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sup.inner.reactive_pending.store(false, Ordering::SeqCst);
            match sup.backup().await {
                Ok(_) => {}
                Err(SupervisorError::BackupRunning) => log::debug!("Reactive backup skipped"),
                Err(e) => log::warn!("Reactive backup failed: {}", e),
            }
        });
    }

    // ---- misc operations ----

    /// Archive the save directory; only one backup runs at a time
    pub async fn backup(&self) -> Result<PathBuf, SupervisorError> {
        let Some(_running) = BusyFlag::acquire(&self.inner.backup_running) else {
            return Err(SupervisorError::BackupRunning);
        };

        let settings = self.settings();
        let result = tokio::task::spawn_blocking(move || {
            backup::create_backup(&settings.backup, &settings.manager.install_dir, Local::now())
        })
        .await
        .map_err(|e| SupervisorError::BackupTask(e.to_string()))?;

        match result {
            Ok(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.inner
                    .events
                    .event(Category::Backup, &format!("Created backup: {}", name));
                self.say(&format!("Backup created: {}", name));
                Ok(path)
            }
            Err(e) => {
                self.inner.console.append_log_line(&format!("!!! Backup failed: {}", e));
                self.inner.events.event(Category::Error, &format!("Backup failed: {}", e));
                Err(e.into())
            }
        }
    }

    pub fn reset_crash_count(&self) {
        self.with_state(|s| s.reset_crash_count());
        self.inner.events.event(Category::User, "Crash counter reset");
        self.say("Crash counter reset.");
    }
}
