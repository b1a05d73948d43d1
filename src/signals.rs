//! Signals wardend reacts to
//!
//! SIGTERM and SIGINT end the daemon; SIGHUP re-reads the settings file
//! without touching the running server.

use std::future::poll_fn;
use std::task::Poll;

use tokio::signal::unix::{signal, Signal, SignalKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// Exit the daemon; carries the signal name for the log
    Shutdown(&'static str),
    Reload,
}

pub struct DaemonSignals {
    listeners: Vec<(Signal, DaemonSignal)>,
}

impl DaemonSignals {
    /// Register listeners. One that cannot be registered is logged and skipped.
    pub fn install() -> Self {
        let wanted = [
            (SignalKind::terminate(), DaemonSignal::Shutdown("SIGTERM")),
            (SignalKind::interrupt(), DaemonSignal::Shutdown("SIGINT")),
            (SignalKind::hangup(), DaemonSignal::Reload),
        ];

        let mut listeners = Vec::with_capacity(wanted.len());
        for (kind, meaning) in wanted {
            match signal(kind) {
                Ok(stream) => listeners.push((stream, meaning)),
                Err(e) => log::error!("Cannot listen for {:?}: {}", meaning, e),
            }
        }
        Self { listeners }
    }

    /// Next signal received; never resolves if nothing is registered
    pub async fn recv(&mut self) -> DaemonSignal {
        poll_fn(|cx| {
            for (stream, meaning) in self.listeners.iter_mut() {
                if let Poll::Ready(Some(())) = stream.poll_recv(cx) {
                    return Poll::Ready(*meaning);
                }
            }
            Poll::Pending
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_hangup_means_reload() {
        let mut signals = DaemonSignals::install();
        assert_eq!(signals.listeners.len(), 3);

        nix::sys::signal::raise(nix::sys::signal::Signal::SIGHUP).unwrap();
        let got = tokio::time::timeout(Duration::from_secs(5), signals.recv())
            .await
            .unwrap();
        assert_eq!(got, DaemonSignal::Reload);
    }

    #[tokio::test]
    async fn test_nothing_registered_stays_pending() {
        let mut signals = DaemonSignals {
            listeners: Vec::new(),
        };
        let waited = tokio::time::timeout(Duration::from_millis(50), signals.recv()).await;
        assert!(waited.is_err());
    }
}
