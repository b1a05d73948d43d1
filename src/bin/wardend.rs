//! wardend - game server supervisor daemon
//!
//! Listens on $XDG_RUNTIME_DIR/warden.sock for commands from wardenctl.
//!
//! - Attaches to an already running server on startup
//! - Runs the watchdog and restart scheduler
//! - SIGHUP reloads the settings file
//! - SIGTERM/SIGINT exit; the server keeps running unless --stop-on-exit

use clap::Parser;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use peercred_ipc::{CallerInfo, Client, Connection, Server};
use warden::config::Settings;
use warden::console::BufferedConsole;
use warden::notify::{NotificationSink, NullSink, WebhookSink};
use warden::protocol::{socket_path, Request, Response, StatusInfo};
use warden::signals::{DaemonSignal, DaemonSignals};
use warden::supervisor::{
    scheduler, watchdog, StartOutcome, StopOutcome, Supervisor, SupervisorError, Trigger,
};

/// Console lines kept for `wardenctl logs`
const CONSOLE_LINES: usize = 2000;

#[derive(Parser)]
#[command(name = "wardend")]
#[command(about = "Game server supervisor daemon")]
#[command(
    long_about = "wardend keeps a dedicated game server running: it starts and stops it, \
    waits for saves before shutting down, restarts it on a schedule and after crashes. \
    It listens on a unix socket for commands from wardenctl."
)]
struct Args {
    /// Settings file
    #[arg(long, short = 'c', default_value = "manager_config.ini")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace); defaults to RUST_LOG or info
    #[arg(long)]
    log_level: Option<String>,

    /// Stop the server before the daemon exits
    #[arg(long)]
    stop_on_exit: bool,

    /// Start the server if it is not already running
    #[arg(long)]
    start: bool,
}

struct Daemon {
    supervisor: Supervisor,
    console: Arc<BufferedConsole>,
    config_path: PathBuf,
}

type SharedDaemon = Arc<Daemon>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let settings = match Settings::load(&args.config).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("wardend: {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };

    let level = log_level(args.log_level.as_deref());
    init_logging(level, settings.manager.debug_log.as_deref())?;

    let sock_path = socket_path();
    if matches!(Client::call(&sock_path, &Request::Ping), Ok(Response::Pong)) {
        log::error!("Another wardend is already listening on {}", sock_path);
        std::process::exit(1);
    }
    let _ = std::fs::remove_file(&sock_path);

    info!(
        "Supervising {} (config {})",
        settings.executable_path().display(),
        args.config.display()
    );

    let console = Arc::new(BufferedConsole::new(CONSOLE_LINES));
    let notifier = build_notifier(&settings);
    let supervisor = Supervisor::builder(settings)
        .console(console.clone())
        .notifier(notifier)
        .build();

    // Pick up a server left running by a previous daemon
    watchdog::tick(&supervisor);
    if args.start {
        if let Err(e) = supervisor.start(Trigger::System).await {
            log::error!("{}", e);
        }
    }

    tokio::spawn(watchdog::run(supervisor.clone()));
    tokio::spawn(scheduler::run(supervisor.clone()));

    let mut signals = DaemonSignals::install();

    let daemon: SharedDaemon = Arc::new(Daemon {
        supervisor,
        console,
        config_path: args.config,
    });

    let server = Server::bind(&sock_path)?;
    info!("wardend listening on {}", sock_path);

    loop {
        tokio::select! {
            accepted = server.accept() => match accepted {
                Ok((conn, caller)) => {
                    tokio::spawn(handle_connection(conn, caller, Arc::clone(&daemon)));
                }
                Err(e) => log::error!("accept error: {}", e),
            },
            sig = signals.recv() => match sig {
                DaemonSignal::Shutdown(name) => {
                    info!("Received {}, shutting down", name);
                    break;
                }
                DaemonSignal::Reload => reload(&daemon).await,
            },
        }
    }

    if args.stop_on_exit {
        daemon.supervisor.stop(Trigger::System).await;
    }
    let _ = std::fs::remove_file(&sock_path);
    Ok(())
}

fn log_level(flag: Option<&str>) -> log::LevelFilter {
    flag.map(str::to_string)
        .or_else(|| std::env::var("RUST_LOG").ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(log::LevelFilter::Info)
}

fn init_logging(level: log::LevelFilter, debug_log: Option<&Path>) -> Result<(), fern::InitError> {
    let stderr = fern::Dispatch::new().level(level).chain(std::io::stderr());

    let mut root = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level.max(if debug_log.is_some() {
            log::LevelFilter::Debug
        } else {
            level
        }))
        .level_for("hyper_util", log::LevelFilter::Warn)
        .level_for("rustls", log::LevelFilter::Warn)
        .chain(stderr);

    if let Some(path) = debug_log {
        root = root.chain(
            fern::Dispatch::new()
                .level(log::LevelFilter::Debug)
                .chain(fern::log_file(path)?),
        );
    }

    root.apply()?;
    Ok(())
}

fn build_notifier(settings: &Settings) -> Arc<dyn NotificationSink> {
    let notify = &settings.notify;
    if notify.enabled && !notify.webhook_url.is_empty() {
        Arc::new(WebhookSink::new(
            notify.webhook_url.clone(),
            settings.manager.test_environment,
        ))
    } else {
        Arc::new(NullSink)
    }
}

async fn reload(daemon: &Daemon) {
    match Settings::load(&daemon.config_path).await {
        Ok(settings) => {
            daemon.supervisor.set_notifier(build_notifier(&settings));
            daemon.supervisor.update_settings(settings);
            info!("Reloaded {}", daemon.config_path.display());
        }
        Err(e) => log::error!("Reload failed, keeping current settings: {}", e),
    }
}

async fn handle_connection(mut conn: Connection, caller: CallerInfo, daemon: SharedDaemon) {
    log::debug!(
        "connection from uid={} pid={} exe={:?}",
        caller.uid, caller.pid, caller.exe
    );

    let request: Request = match conn.read().await {
        Ok(r) => r,
        Err(e) => {
            log::error!("read error: {}", e);
            let _ = conn.write(&Response::Error("invalid request".into())).await;
            return;
        }
    };

    let response = handle_request(request, &daemon).await;
    if let Err(e) = conn.write(&response).await {
        log::error!("write error: {}", e);
    }
}

async fn handle_request(request: Request, daemon: &SharedDaemon) -> Response {
    let sup = &daemon.supervisor;

    match request {
        Request::Ping => Response::Pong,

        Request::Status => Response::Status(status_info(daemon)),

        Request::Start => {
            if sup.is_busy() {
                return Response::Error(SupervisorError::Busy.to_string());
            }
            match sup.start(Trigger::User).await {
                Ok(StartOutcome::Spawned(pid)) => {
                    Response::Notice(format!("Server started (PID {})", pid))
                }
                Ok(StartOutcome::AlreadyRunning(pid)) => {
                    Response::Notice(format!("Server is already running (PID {})", pid))
                }
                Err(e) => Response::Error(e.to_string()),
            }
        }

        // Stop and restart wait on the save sentinel; run them detached
        Request::Stop => {
            if sup.is_busy() {
                return Response::Error(SupervisorError::Busy.to_string());
            }
            let Some(pid) = sup.current_pid() else {
                return Response::Notice("Server is not running".into());
            };
            let sup = sup.clone();
            tokio::spawn(async move {
                if sup.stop(Trigger::User).await == StopOutcome::NotRunning {
                    log::debug!("Server exited before the stop ran");
                }
            });
            Response::Notice(format!("Stopping server (PID {})", pid))
        }

        Request::Restart => {
            if sup.is_busy() {
                return Response::Error(SupervisorError::Busy.to_string());
            }
            let sup = sup.clone();
            tokio::spawn(async move {
                if let Err(e) = sup.restart(Trigger::User).await {
                    log::error!("Restart failed: {}", e);
                }
            });
            Response::Notice("Restart requested".into())
        }

        Request::ResetCrashes => {
            sup.reset_crash_count();
            Response::Ok
        }

        Request::Backup => match sup.backup().await {
            Ok(path) => Response::Notice(format!("Backup created: {}", path.display())),
            Err(e) => Response::Error(e.to_string()),
        },

        Request::Logs { lines } => Response::Logs(daemon.console.tail(lines)),
    }
}

fn status_info(daemon: &Daemon) -> StatusInfo {
    let state = daemon.supervisor.snapshot();
    StatusInfo {
        status: state.status.as_str().to_string(),
        pid: state.pid,
        crash_count: state.crash_count,
        uptime_secs: daemon.supervisor.uptime().map(|d| d.as_secs()),
        countdown: daemon.console.displayed().countdown,
    }
}
