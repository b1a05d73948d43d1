//! wardenctl - CLI for wardend
//!
//! Sends one request over the control socket and prints the response.

use clap::{Parser, Subcommand};
use peercred_ipc::Client;
use warden::protocol::{socket_path, Request, Response, StatusInfo};

#[derive(Parser)]
#[command(name = "wardenctl")]
#[command(about = "Control the wardend game server supervisor")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show server state
    Status,

    /// Start the server
    Start,

    /// Stop the server (waits for a running save first)
    Stop,

    /// Stop, then start the server
    Restart,

    /// Reset the crash counter
    ResetCrashes,

    /// Back up the save directory now
    Backup,

    /// Show recent console output
    Logs {
        /// Number of lines
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },

    /// Ping the daemon
    Ping,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let request = match args.command {
        Command::Status => Request::Status,
        Command::Start => Request::Start,
        Command::Stop => Request::Stop,
        Command::Restart => Request::Restart,
        Command::ResetCrashes => Request::ResetCrashes,
        Command::Backup => Request::Backup,
        Command::Logs { lines } => Request::Logs { lines },
        Command::Ping => Request::Ping,
    };

    let sock_path = socket_path();
    log::debug!("connecting to {}", sock_path);

    match Client::call(&sock_path, &request) {
        Ok(response) => print_response(response),
        Err(e) => {
            if e.to_string().contains("connect") || e.to_string().contains("No such file") {
                eprintln!("wardenctl: daemon not running");
                eprintln!("  start with: wardend --config manager_config.ini");
            } else {
                eprintln!("wardenctl: {}", e);
            }
            std::process::exit(1);
        }
    }
}

fn print_response(response: Response) {
    match response {
        Response::Ok => {}
        Response::Pong => println!("pong"),
        Response::Notice(msg) => println!("{}", msg),
        Response::Error(msg) => {
            eprintln!("error: {}", msg);
            std::process::exit(1);
        }
        Response::Status(info) => print_status(&info),
        Response::Logs(lines) => {
            for line in lines {
                println!("{}", line);
            }
        }
    }
}

fn print_status(info: &StatusInfo) {
    println!("● Server: {}", info.status);
    if let Some(pid) = info.pid {
        println!("      PID: {}", pid);
    }
    if let Some(uptime) = info.uptime_secs {
        println!("   Uptime: {}", format_duration(uptime));
    }
    println!("  Crashes: {}", info.crash_count);
    if let Some(secs) = info.countdown {
        println!("  Restart: in {}", format_duration(secs));
    }
}

fn format_duration(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {}m {}s", h, m, s)
    } else {
        format!("{}m {}s", m, s)
    }
}
