//! Manager settings
//!
//! Loads `manager_config.ini` into typed settings. Every key has a default,
//! so a missing file or a partial file still yields usable settings.

mod parser;
mod schedule;

pub use parser::{parse_file, parse_settings_file, string_to_bool, ParseError, ParsedFile};
pub use schedule::{parse_days, parse_times, ScheduleConfig, MAX_INTERVAL_HOURS};

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default executable, relative to the install directory
pub const DEFAULT_EXECUTABLE: &str = "Vein/Binaries/Win64/VeinServer-Win64-Test.exe";
/// Default live log, relative to the install directory
pub const DEFAULT_LOG_FILE: &str = "Vein/Saved/Logs/Vein.log";

/// `[Manager]` section
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerSettings {
    pub install_dir: PathBuf,
    /// Executable path; relative paths resolve against `install_dir`
    pub executable: PathBuf,
    /// Name reported by the OS for the running server (defaults to the executable's file name)
    pub process_name: Option<String>,
    pub log_file: PathBuf,
    pub keep_alive: bool,
    pub event_log: Option<PathBuf>,
    pub debug_log: Option<PathBuf>,
    pub history_file: Option<PathBuf>,
    pub test_environment: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::new(),
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            process_name: None,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            keep_alive: false,
            event_log: None,
            debug_log: None,
            history_file: None,
            test_environment: false,
        }
    }
}

/// `[Startup]` and `[RCON]` sections
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSettings {
    pub map: String,
    pub session_name: Option<String>,
    pub port: Option<u16>,
    pub query_port: Option<u16>,
    pub max_players: Option<u32>,
    pub rcon_enabled: bool,
    pub rcon_port: u16,
    pub rcon_password: String,
    /// Extra arguments appended before `-log`, shell-quoted
    pub extra_args: Vec<String>,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            map: "/Game/Vein/Maps/ChamplainValley?listen".to_string(),
            session_name: Some("Server".to_string()),
            port: Some(7779),
            query_port: Some(27015),
            max_players: Some(20),
            rcon_enabled: false,
            rcon_port: 27020,
            rcon_password: String::new(),
            extra_args: Vec::new(),
        }
    }
}

/// `[Backups]` section
#[derive(Debug, Clone, PartialEq)]
pub struct BackupSettings {
    pub on_stop: bool,
    /// Back up shortly after the server reports a finished save
    pub reactive: bool,
    /// strftime pattern for archive names
    pub format: String,
    /// Number of archives to keep, 0 = unlimited
    pub retention: usize,
    pub save_dir: PathBuf,
    pub backup_dir: PathBuf,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            on_stop: false,
            reactive: false,
            format: "Server_Backup_%Y-%m-%d_%H-%M-%S".to_string(),
            retention: 6,
            save_dir: PathBuf::from("Vein/Saved"),
            backup_dir: PathBuf::from("Backups"),
        }
    }
}

/// `[Discord]` section
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotifySettings {
    pub enabled: bool,
    pub webhook_url: String,
}

/// `[Sentinel]` section: log markers and the shutdown wait bound
#[derive(Debug, Clone, PartialEq)]
pub struct SentinelSettings {
    pub save_start: String,
    pub save_finish_a: String,
    pub save_finish_b: String,
    /// All of these substrings must appear on one line for the server to count as ready
    pub ready_markers: Vec<String>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Sampling window for the disk-write check
    pub disk_sample: Duration,
}

impl Default for SentinelSettings {
    fn default() -> Self {
        Self {
            save_start: "SaveGame: Starting save".to_string(),
            save_finish_a: "Saved to slot".to_string(),
            save_finish_b: "Autosave complete".to_string(),
            ready_markers: vec!["avail=OK".to_string(), "config=OK".to_string()],
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            disk_sample: Duration::from_millis(100),
        }
    }
}

/// `[Timing]` section
#[derive(Debug, Clone, PartialEq)]
pub struct TimingSettings {
    pub watchdog_interval: Duration,
    pub scheduler_interval: Duration,
    pub restart_delay: Duration,
    pub terminate_grace: Duration,
    pub stability_check: Duration,
    pub log_poll: Duration,
    pub log_appear_attempts: u32,
    pub reactive_backup_delay: Duration,
    pub warn_first: Duration,
    pub warn_second: Duration,
    pub restart_trigger: Duration,
    pub post_trigger_sleep: Duration,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            watchdog_interval: Duration::from_secs(5),
            scheduler_interval: Duration::from_secs(10),
            restart_delay: Duration::from_secs(3),
            terminate_grace: Duration::from_secs(5),
            stability_check: Duration::from_secs(3),
            log_poll: Duration::from_millis(500),
            log_appear_attempts: 10,
            reactive_backup_delay: Duration::from_secs(15),
            warn_first: Duration::from_secs(600),
            warn_second: Duration::from_secs(300),
            restart_trigger: Duration::from_secs(30),
            post_trigger_sleep: Duration::from_secs(60),
        }
    }
}

/// Complete manager settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub manager: ManagerSettings,
    pub launch: LaunchSettings,
    pub backup: BackupSettings,
    pub schedule: ScheduleConfig,
    pub notify: NotifySettings,
    pub sentinel: SentinelSettings,
    pub timing: TimingSettings,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] ParseError),

    #[error("Invalid value for [{section}] {key}: {value:?}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

impl Settings {
    /// Load settings from disk; a missing file yields defaults
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let parsed = parse_settings_file(path).await?;
        Self::from_parsed(&parsed)
    }

    /// Parse settings from file contents
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let parsed = parse_file(content)?;
        Self::from_parsed(&parsed)
    }

    /// Convert parsed INI data into typed settings
    pub fn from_parsed(parsed: &ParsedFile) -> Result<Self, ConfigError> {
        let r = Reader { parsed };
        let mut s = Settings::default();

        // [Manager]
        if let Some(v) = r.get("MANAGER", "SERVERPATH") {
            s.manager.install_dir = PathBuf::from(v);
        }
        if let Some(v) = r.get("MANAGER", "EXECUTABLE") {
            s.manager.executable = PathBuf::from(v);
        }
        s.manager.process_name = r.get("MANAGER", "PROCESSNAME").map(str::to_string);
        if let Some(v) = r.get("MANAGER", "LOGFILE") {
            s.manager.log_file = PathBuf::from(v);
        }
        s.manager.keep_alive = r.bool("MANAGER", "KEEPALIVE", false);
        s.manager.event_log = r.get("MANAGER", "EVENTLOG").map(PathBuf::from);
        s.manager.debug_log = r.get("MANAGER", "DEBUGLOG").map(PathBuf::from);
        s.manager.history_file = r.get("MANAGER", "HISTORYFILE").map(PathBuf::from);
        s.manager.test_environment = r.bool("MANAGER", "TESTENVIRONMENT", false);

        // [Startup]
        if let Some(v) = r.get("STARTUP", "MAP") {
            s.launch.map = v.to_string();
        }
        if r.has("STARTUP", "SESSIONNAME") {
            s.launch.session_name = r.get("STARTUP", "SESSIONNAME").map(str::to_string);
        }
        if r.has("STARTUP", "PORT") {
            s.launch.port = r.opt_num("STARTUP", "PORT")?;
        }
        if r.has("STARTUP", "QUERYPORT") {
            s.launch.query_port = r.opt_num("STARTUP", "QUERYPORT")?;
        }
        if r.has("STARTUP", "MAXPLAYERS") {
            s.launch.max_players = r.opt_num("STARTUP", "MAXPLAYERS")?;
        }
        if let Some(v) = r.get("STARTUP", "EXTRAARGS") {
            s.launch.extra_args = shlex::split(v).ok_or_else(|| r.invalid("STARTUP", "EXTRAARGS"))?;
        }

        // [RCON]
        s.launch.rcon_enabled = r.bool("RCON", "ENABLED", false);
        s.launch.rcon_port = r.num("RCON", "PORT", s.launch.rcon_port)?;
        if let Some(v) = r.get("RCON", "PASSWORD") {
            s.launch.rcon_password = v.to_string();
        }

        // [Backups]
        s.backup.on_stop = r.bool("BACKUPS", "BACKUPONSTOP", false);
        s.backup.reactive = r.bool("BACKUPS", "REACTIVEBACKUP", false);
        if let Some(v) = r.get("BACKUPS", "FORMAT") {
            s.backup.format = v.to_string();
        }
        s.backup.retention = r.num("BACKUPS", "RETENTION", s.backup.retention)?;
        if let Some(v) = r.get("BACKUPS", "SAVEDIR") {
            s.backup.save_dir = PathBuf::from(v);
        }
        if let Some(v) = r.get("BACKUPS", "BACKUPDIR") {
            s.backup.backup_dir = PathBuf::from(v);
        }

        // [Scheduler]
        s.schedule.daily_enabled = r.bool("SCHEDULER", "DAILYENABLED", false);
        if r.has("SCHEDULER", "DAILYTIME") {
            s.schedule.times = parse_times(r.get("SCHEDULER", "DAILYTIME").unwrap_or_default());
        }
        if r.has("SCHEDULER", "DAILYDAYS") {
            s.schedule.days_of_week = parse_days(r.get("SCHEDULER", "DAILYDAYS").unwrap_or_default());
        }
        s.schedule.interval_enabled = r.bool("SCHEDULER", "INTERVALENABLED", false);
        s.schedule.interval_hours = r.num("SCHEDULER", "INTERVALHOURS", s.schedule.interval_hours)?;
        if !(s.schedule.interval_hours > 0.0 && s.schedule.interval_hours <= MAX_INTERVAL_HOURS) {
            return Err(r.invalid("SCHEDULER", "INTERVALHOURS"));
        }

        // [Discord]
        s.notify.enabled = r.bool("DISCORD", "ENABLED", false);
        if let Some(v) = r.get("DISCORD", "WEBHOOKURL") {
            s.notify.webhook_url = v.to_string();
        }

        // [Sentinel]
        if let Some(v) = r.get("SENTINEL", "SAVESTART") {
            s.sentinel.save_start = v.to_string();
        }
        if let Some(v) = r.get("SENTINEL", "SAVEFINISHA") {
            s.sentinel.save_finish_a = v.to_string();
        }
        if let Some(v) = r.get("SENTINEL", "SAVEFINISHB") {
            s.sentinel.save_finish_b = v.to_string();
        }
        if let Some(v) = r.get("SENTINEL", "READYMARKER") {
            s.sentinel.ready_markers = v
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
        }
        s.sentinel.timeout = r.secs("SENTINEL", "TIMEOUT", s.sentinel.timeout)?;
        s.sentinel.poll_interval = r.positive_secs("SENTINEL", "POLLINTERVAL", s.sentinel.poll_interval)?;

        // [Timing]
        let t = &mut s.timing;
        t.watchdog_interval = r.positive_secs("TIMING", "WATCHDOGINTERVAL", t.watchdog_interval)?;
        t.scheduler_interval = r.positive_secs("TIMING", "SCHEDULERINTERVAL", t.scheduler_interval)?;
        t.restart_delay = r.secs("TIMING", "RESTARTDELAY", t.restart_delay)?;
        t.terminate_grace = r.secs("TIMING", "TERMINATEGRACE", t.terminate_grace)?;
        t.log_poll = Duration::from_millis(r.num("TIMING", "LOGPOLLMS", t.log_poll.as_millis() as u64)?);
        if t.log_poll.is_zero() {
            return Err(r.invalid("TIMING", "LOGPOLLMS"));
        }
        t.log_appear_attempts = r.num("TIMING", "LOGAPPEARATTEMPTS", t.log_appear_attempts)?;

        Ok(s)
    }

    /// Absolute path of the server executable
    pub fn executable_path(&self) -> PathBuf {
        self.manager.install_dir.join(&self.manager.executable)
    }

    /// Process name to match when probing for a running server
    pub fn process_name(&self) -> String {
        self.manager.process_name.clone().unwrap_or_else(|| {
            self.manager
                .executable
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
    }

    /// Absolute path of the server's live log
    pub fn log_path(&self) -> PathBuf {
        self.manager.install_dir.join(&self.manager.log_file)
    }
}

/// Typed lookups over a parsed file
struct Reader<'a> {
    parsed: &'a ParsedFile,
}

impl Reader<'_> {
    fn has(&self, section: &str, key: &str) -> bool {
        self.parsed
            .get(section)
            .map_or(false, |s| s.contains_key(key))
    }

    /// Non-empty value of a key
    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.parsed
            .get(section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.get(section, key).map(string_to_bool).unwrap_or(default)
    }

    fn num<T: FromStr>(&self, section: &str, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.opt_num(section, key)?.unwrap_or(default))
    }

    /// Empty value means "not set"
    fn opt_num<T: FromStr>(&self, section: &str, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get(section, key) {
            None => Ok(None),
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(section, key)),
        }
    }

    fn secs(&self, section: &str, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let secs: f64 = self.num(section, key, default.as_secs_f64())?;
        Duration::try_from_secs_f64(secs).map_err(|_| self.invalid(section, key))
    }

    /// Period for a loop; zero is rejected
    fn positive_secs(&self, section: &str, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let secs = self.secs(section, key, default)?;
        if secs.is_zero() {
            return Err(self.invalid(section, key));
        }
        Ok(secs)
    }

    fn invalid(&self, section: &str, key: &str) -> ConfigError {
        ConfigError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: self.get(section, key).unwrap_or_default().to_string(),
        }
    }
}
