//! Lifecycle notifications
//!
//! Delivery is fire-and-forget: the caller never waits on the network and
//! failures only reach the debug log.

use serde_json::{json, Value};

/// Kinds of notification the supervisor emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyEvent {
    Start,
    Stop,
    Crash,
    Warn,
    /// Sent by an external updater around a server update
    Update,
}

impl NotifyEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
            Self::Crash => "CRASH",
            Self::Warn => "WARN",
            Self::Update => "UPDATE",
        }
    }

    /// Embed colour
    pub fn colour(&self) -> u32 {
        match self {
            Self::Start => 5763719,
            Self::Stop => 15548997,
            Self::Crash => 15158332,
            Self::Update => 3447003,
            Self::Warn => 16776960,
        }
    }
}

/// Receives lifecycle notifications
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: NotifyEvent, message: &str);
}

/// Sink that drops everything (notifications disabled)
#[derive(Debug, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, event: NotifyEvent, message: &str) {
        log::debug!("Notification ({}) not sent: {}", event.as_str(), message);
    }
}

/// Posts Discord-style embeds to a webhook URL
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    test_environment: bool,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, test_environment: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            test_environment,
        }
    }
}

impl NotificationSink for WebhookSink {
    fn notify(&self, event: NotifyEvent, message: &str) {
        if self.url.is_empty() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::debug!("No runtime, dropping {} notification", event.as_str());
            return;
        };

        let payload = build_payload(
            event,
            message,
            self.test_environment,
            &chrono::Utc::now().to_rfc3339(),
        );
        let request = self
            .client
            .post(&self.url)
            .header(
                reqwest::header::USER_AGENT,
                concat!("warden/", env!("CARGO_PKG_VERSION")),
            )
            .json(&payload);

        handle.spawn(async move {
            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => log::debug!("Webhook delivered ({})", event.as_str()),
                Err(e) => log::debug!("Webhook failed ({}): {}", event.as_str(), e),
            }
        });
    }
}

/// Webhook body for one event
pub fn build_payload(event: NotifyEvent, message: &str, test_environment: bool, timestamp: &str) -> Value {
    let description = if test_environment {
        format!("**[TEST ENV]** {}", message)
    } else {
        message.to_string()
    };

    let mut footer = format!("v{}", env!("CARGO_PKG_VERSION"));
    if event == NotifyEvent::Crash {
        footer.push_str(" | Server Watchdog Active");
    }

    json!({
        "embeds": [{
            "title": format!("Vein Server - {}", event.as_str()),
            "description": description,
            "color": event.colour(),
            "footer": { "text": footer },
            "timestamp": timestamp,
        }]
    })
}
