pub mod format;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::config::NotificationConfig;
use crate::core::{Network, ScanKind};
use crate::error::NotifyError;

/// An interactive button: a label and the opaque action it triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub label: String,
    pub action: String,
}

impl Control {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
        }
    }
}

/// What an alert was about, for collaborators that handle follow-up
/// actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertContext {
    pub kind: ScanKind,
    pub contract: String,
    pub network: Network,
    pub symbol: String,
}

/// One outbound message. `controls` is a list of button rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Broadcast {
    pub text: String,
    pub controls: Vec<Vec<Control>>,
    pub context: Option<AlertContext>,
}

impl Broadcast {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Best-effort delivery channel.
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn broadcast(&self, message: &Broadcast) -> Result<(), NotifyError>;
}

/// Telegram Bot API `sendMessage` to every configured chat.
pub struct TelegramSink {
    client: Client,
    endpoint: String,
    chat_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramSink {
    pub fn new(api_url: &str, token: &str, chat_ids: Vec<String>) -> Result<Self, NotifyError> {
        if chat_ids.is_empty() {
            return Err(NotifyError::NoRecipients);
        }
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{token}/sendMessage", api_url.trim_end_matches('/')),
            chat_ids,
        })
    }

    fn request_body(chat_id: &str, message: &Broadcast) -> Value {
        let mut body = json!({
            "chat_id": chat_id,
            "text": message.text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });
        if !message.controls.is_empty() {
            let keyboard: Vec<Vec<Value>> = message
                .controls
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|c| json!({ "text": c.label, "callback_data": c.action }))
                        .collect()
                })
                .collect();
            body["reply_markup"] = json!({ "inline_keyboard": keyboard });
        }
        body
    }

    async fn send_to(&self, chat_id: &str, message: &Broadcast) -> Result<(), NotifyError> {
        let resp: TelegramResponse = self
            .client
            .post(&self.endpoint)
            .json(&Self::request_body(chat_id, message))
            .send()
            .await?
            .json()
            .await?;
        if resp.ok {
            Ok(())
        } else {
            Err(NotifyError::Telegram {
                chat_id: chat_id.to_string(),
                description: resp.description.unwrap_or_else(|| "unknown error".into()),
            })
        }
    }
}

#[async_trait]
impl AlertSink for TelegramSink {
    fn name(&self) -> &'static str {
        "telegram"
    }

    /// Succeeds if at least one chat accepted the message.
    async fn broadcast(&self, message: &Broadcast) -> Result<(), NotifyError> {
        let mut last_err = None;
        let mut delivered = 0usize;
        for chat_id in &self.chat_ids {
            match self.send_to(chat_id, message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(chat_id = %chat_id, "telegram delivery failed: {e}");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) if delivered == 0 => Err(e),
            _ => Ok(()),
        }
    }
}

/// Desktop notification via the platform notification daemon.
pub struct DesktopSink;

impl DesktopSink {
    /// First line becomes the summary; Markdown markers are stripped.
    fn split(text: &str) -> (String, String) {
        let plain: String = text.chars().filter(|c| !matches!(c, '*' | '`' | '\\')).collect();
        let mut lines = plain.lines().map(str::trim).filter(|l| !l.is_empty());
        let summary = lines.next().unwrap_or("poolradar").to_string();
        let body = lines.take(6).collect::<Vec<_>>().join("\n");
        (summary, body)
    }
}

#[async_trait]
impl AlertSink for DesktopSink {
    fn name(&self) -> &'static str {
        "desktop"
    }

    async fn broadcast(&self, message: &Broadcast) -> Result<(), NotifyError> {
        let (summary, body) = Self::split(&message.text);
        tokio::task::spawn_blocking(move || {
            notify_rust::Notification::new()
                .summary(&summary)
                .body(&body)
                .show()
                .map(|_| ())
                .map_err(|e| NotifyError::Desktop(e.to_string()))
        })
        .await
        .map_err(|e| NotifyError::Desktop(e.to_string()))?
    }
}

/// Writes every broadcast to the log. Always succeeds.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn broadcast(&self, message: &Broadcast) -> Result<(), NotifyError> {
        match &message.context {
            Some(ctx) => info!(
                kind = %ctx.kind,
                network = %ctx.network,
                contract = %ctx.contract,
                "alert\n{}",
                message.text
            ),
            None => info!("broadcast\n{}", message.text),
        }
        Ok(())
    }
}

/// Fans a broadcast out to every configured sink. A failing sink never
/// prevents delivery to the others.
pub struct Notifier {
    enabled: bool,
    sinks: Vec<Box<dyn AlertSink>>,
}

impl Notifier {
    pub fn new(enabled: bool, sinks: Vec<Box<dyn AlertSink>>) -> Self {
        Self { enabled, sinks }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        let mut sinks: Vec<Box<dyn AlertSink>> = vec![Box::new(LogSink)];
        if !config.log_only {
            if let Some(token) = config.telegram_bot_token.as_deref().filter(|t| !t.is_empty()) {
                match TelegramSink::new(
                    &config.telegram_api_url,
                    token,
                    config.telegram_chat_ids.clone(),
                ) {
                    Ok(sink) => sinks.push(Box::new(sink)),
                    Err(e) => warn!("Telegram sink disabled: {e}"),
                }
            }
            if config.desktop {
                sinks.push(Box::new(DesktopSink));
            }
        }
        let names: Vec<&str> = sinks.iter().map(|s| s.name()).collect();
        info!(sinks = ?names, enabled = config.enabled, "notifier configured");
        Self::new(config.enabled, sinks)
    }
}

#[async_trait]
impl AlertSink for Notifier {
    fn name(&self) -> &'static str {
        "notifier"
    }

    async fn broadcast(&self, message: &Broadcast) -> Result<(), NotifyError> {
        if !self.enabled || self.sinks.is_empty() {
            debug!("notifications disabled, broadcast dropped");
            return Ok(());
        }
        let mut failed = 0;
        for sink in &self.sinks {
            if let Err(e) = sink.broadcast(message).await {
                warn!(sink = sink.name(), "delivery failed: {e}");
                failed += 1;
            }
        }
        if failed == self.sinks.len() {
            error!(sinks = failed, "broadcast reached no sink");
            return Err(NotifyError::AllSinksFailed(failed));
        }
        Ok(())
    }
}
