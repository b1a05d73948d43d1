//! Server log follower
//!
//! Reads the live log from its end, hands complete lines to the supervisor
//! and reopens the file when the server rotates it. Exits once the
//! supervisor no longer tracks a process.

use std::io::SeekFrom;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use super::{BusyFlag, Supervisor};

const APPEAR_POLL: Duration = Duration::from_secs(1);

struct OpenLog {
    reader: BufReader<File>,
    inode: u64,
    consumed: u64,
}

async fn open_log(path: &Path, from: SeekFrom) -> std::io::Result<OpenLog> {
    let mut file = File::open(path).await?;
    let inode = file.metadata().await?.ino();
    let consumed = file.seek(from).await?;
    Ok(OpenLog {
        reader: BufReader::new(file),
        inode,
        consumed,
    })
}

pub(super) async fn tail(sup: Supervisor) {
    let Some(active) = BusyFlag::acquire(&sup.inner.tail_active) else {
        return;
    };
    let server_gone = follow(&sup).await;
    drop(active);

    // A new launch may have found the flag still held
    if server_gone && sup.current_pid().is_some() {
        sup.ensure_tailer();
    }
}

/// Follow the log; `true` once the supervisor stops tracking a process
async fn follow(sup: &Supervisor) -> bool {
    let settings = sup.settings();
    let path = settings.log_path();
    if !wait_for_file(sup, &path, settings.timing.log_appear_attempts).await {
        log::debug!("Server log {} did not appear", path.display());
        return sup.current_pid().is_none();
    }

    let mut log = match open_log(&path, SeekFrom::End(0)).await {
        Ok(log) => log,
        Err(e) => {
            log::warn!("Failed to open server log {}: {}", path.display(), e);
            return false;
        }
    };
    log::debug!("Following {}", path.display());

    let mut buf = Vec::new();
    loop {
        match log.reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {}
            Ok(n) => {
                log.consumed += n as u64;
                if buf.ends_with(b"\n") {
                    let line = decode_line(&buf);
                    buf.clear();
                    dispatch(sup, &line);
                }
                continue;
            }
            Err(e) => {
                log::warn!("Error reading server log: {}", e);
                return false;
            }
        }

        if sup.current_pid().is_none() {
            log::debug!("Stopped following {}", path.display());
            return true;
        }

        let rotated = tokio::fs::metadata(&path)
            .await
            .is_ok_and(|meta| meta.ino() != log.inode || meta.len() < log.consumed);
        if rotated {
            log::debug!("Server log rotated, reopening");
            match open_log(&path, SeekFrom::Start(0)).await {
                Ok(reopened) => {
                    log = reopened;
                    buf.clear();
                    continue;
                }
                Err(e) => {
                    log::warn!("Failed to reopen server log: {}", e);
                    return false;
                }
            }
        }

        tokio::time::sleep(sup.settings().timing.log_poll).await;
    }
}

async fn wait_for_file(sup: &Supervisor, path: &Path, attempts: u32) -> bool {
    for _ in 0..attempts.max(1) {
        if path.is_file() {
            return true;
        }
        if sup.current_pid().is_none() {
            return false;
        }
        tokio::time::sleep(APPEAR_POLL).await;
    }
    path.is_file()
}

fn dispatch(sup: &Supervisor, line: &str) {
    sup.handle_log_line(line);
    if is_ready_line(line, &sup.settings().sentinel.ready_markers) {
        sup.mark_ready();
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

/// Every ready marker appears on the line
fn is_ready_line(line: &str, markers: &[String]) -> bool {
    !markers.is_empty() && markers.iter().all(|m| line.contains(m.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"LogInit: ready\r\n"), "LogInit: ready");
        assert_eq!(decode_line(b"plain\n"), "plain");
        assert_eq!(decode_line(b"bad \xff byte\n"), "bad \u{fffd} byte");
    }

    #[test]
    fn test_ready_line() {
        let markers = vec!["avail=OK".to_string(), "config=OK".to_string()];
        assert!(is_ready_line(
            "LogOnlineSession: Session check avail=OK config=OK",
            &markers
        ));
        assert!(!is_ready_line("LogOnlineSession: avail=OK", &markers));
        assert!(!is_ready_line("avail=OK config=OK", &[]));
    }

    #[tokio::test]
    async fn test_open_log_from_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Vein.log");
        std::fs::write(&path, "old line\n").unwrap();

        let log = open_log(&path, SeekFrom::End(0)).await.unwrap();
        assert_eq!(log.consumed, 9);
        assert_eq!(log.inode, std::fs::metadata(&path).unwrap().ino());
    }
}
