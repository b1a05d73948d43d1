//! In-memory process host and recording sinks for lifecycle tests

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use super::{
    LaunchCommand, ProcessInfo, ProcessLauncher, ProcessProbe, ReconcileOutcome, SpawnError,
    Supervisor, Trigger,
};
use crate::config::Settings;
use crate::console::BufferedConsole;
use crate::notify::{NotificationSink, NotifyEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HostEvent {
    Spawn(u32),
    Terminate(u32),
    Kill(u32),
}

#[derive(Default)]
struct FakeState {
    next_pid: u32,
    alive: HashMap<u32, PathBuf>,
    log: Vec<(HostEvent, Instant)>,
    ignore_terminate: bool,
}

/// In-memory process table acting as both probe and launcher
#[derive(Default)]
pub(crate) struct FakeHost {
    state: Mutex<FakeState>,
}

impl FakeHost {
    pub(crate) fn add_external(&self, pid: u32, exe: &Path) {
        self.state.lock().unwrap().alive.insert(pid, exe.to_path_buf());
    }

    pub(crate) fn exit(&self, pid: u32) {
        self.state.lock().unwrap().alive.remove(&pid);
    }

    pub(crate) fn ignore_terminate(&self) {
        self.state.lock().unwrap().ignore_terminate = true;
    }

    pub(crate) fn log(&self) -> Vec<(HostEvent, Instant)> {
        self.state.lock().unwrap().log.clone()
    }

    pub(crate) fn events(&self) -> Vec<HostEvent> {
        self.log().into_iter().map(|(e, _)| e).collect()
    }

    pub(crate) fn spawn_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, HostEvent::Spawn(_)))
            .count()
    }

    pub(crate) fn time_of(&self, event: HostEvent) -> Instant {
        self.log()
            .into_iter()
            .find(|(e, _)| *e == event)
            .map(|(_, t)| t)
            .unwrap()
    }
}

impl ProcessProbe for FakeHost {
    fn processes(&self) -> Vec<ProcessInfo> {
        let state = self.state.lock().unwrap();
        state
            .alive
            .iter()
            .map(|(pid, exe)| ProcessInfo {
                pid: *pid,
                name: exe.file_name().unwrap().to_string_lossy().into_owned(),
                exe: Some(exe.clone()),
                zombie: false,
            })
            .collect()
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.state.lock().unwrap().alive.contains_key(&pid)
    }

    fn disk_write_bytes(&self, _pid: u32) -> Option<u64> {
        None
    }

    fn start_time(&self, _pid: u32) -> Option<u64> {
        None
    }
}

impl ProcessLauncher for FakeHost {
    fn spawn(&self, cmd: &LaunchCommand) -> Result<u32, SpawnError> {
        let mut state = self.state.lock().unwrap();
        state.next_pid += 1;
        let pid = 1000 + state.next_pid;
        state.alive.insert(pid, cmd.program.clone());
        state.log.push((HostEvent::Spawn(pid), Instant::now()));
        Ok(pid)
    }

    fn terminate(&self, pid: u32) -> Result<(), SpawnError> {
        let mut state = self.state.lock().unwrap();
        state.log.push((HostEvent::Terminate(pid), Instant::now()));
        if !state.ignore_terminate {
            state.alive.remove(&pid);
        }
        Ok(())
    }

    fn force_kill(&self, pid: u32) -> Result<(), SpawnError> {
        let mut state = self.state.lock().unwrap();
        state.log.push((HostEvent::Kill(pid), Instant::now()));
        state.alive.remove(&pid);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    sent: Mutex<Vec<(NotifyEvent, String)>>,
}

impl RecordingSink {
    pub(crate) fn count(&self, event: NotifyEvent) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == event)
            .count()
    }

    pub(crate) fn messages(&self, event: NotifyEvent) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: NotifyEvent, message: &str) {
        self.sent.lock().unwrap().push((event, message.to_string()));
    }
}

pub(crate) struct Fixture {
    pub(crate) _dir: tempfile::TempDir,
    pub(crate) host: Arc<FakeHost>,
    pub(crate) console: Arc<BufferedConsole>,
    pub(crate) sink: Arc<RecordingSink>,
    pub(crate) sup: Supervisor,
}

impl Fixture {
    pub(crate) fn exe(&self) -> PathBuf {
        self.sup.settings().executable_path()
    }

    pub(crate) fn console_count(&self, needle: &str) -> usize {
        self.console
            .tail(usize::MAX)
            .iter()
            .filter(|l| l.contains(needle))
            .count()
    }

    pub(crate) fn assert_consistent(&self) {
        let state = self.sup.snapshot();
        assert!(state.is_consistent(), "inconsistent: {:?}", state);
    }
}

pub(crate) fn fixture(configure: impl FnOnce(&mut Settings)) -> Fixture {
    build_fixture(configure, false)
}

/// Like [`fixture`], with the log tailer enabled and an empty server log
pub(crate) fn tailing_fixture(configure: impl FnOnce(&mut Settings)) -> Fixture {
    let f = build_fixture(configure, true);
    let log = f.sup.settings().log_path();
    std::fs::create_dir_all(log.parent().unwrap()).unwrap();
    std::fs::write(&log, b"").unwrap();
    f
}

fn build_fixture(configure: impl FnOnce(&mut Settings), tail_logs: bool) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = Settings::default();
    settings.manager.install_dir = dir.path().canonicalize().unwrap();
    settings.manager.event_log = Some(dir.path().join("events.log"));
    let exe = settings.executable_path();
    std::fs::create_dir_all(exe.parent().unwrap()).unwrap();
    std::fs::write(&exe, b"").unwrap();
    configure(&mut settings);

    let host = Arc::new(FakeHost::default());
    let console = Arc::new(BufferedConsole::new(10_000));
    let sink = Arc::new(RecordingSink::default());
    let sup = Supervisor::builder(settings)
        .probe(host.clone())
        .launcher(host.clone())
        .console(console.clone())
        .notifier(sink.clone())
        .tail_logs(tail_logs)
        .build();

    Fixture {
        _dir: dir,
        host,
        console,
        sink,
        sup,
    }
}

/// Start and confirm liveness, leaving the server ONLINE
pub(crate) async fn start_online(f: &Fixture) -> u32 {
    let pid = f.sup.start(Trigger::User).await.unwrap().pid();
    assert_eq!(f.sup.poll_liveness(), Some(ReconcileOutcome::Promoted));
    pid
}
