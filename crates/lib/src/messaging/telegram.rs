//! Telegram channel: long-poll getUpdates and sendMessage via Bot API.
//!
//! Updates are classified into the common Message shape: a missing inner
//! message is an Update sentinel, a leading bot_command entity makes a
//! Command, anything else is Chat.

use crate::messaging::{Message, MessageKind, ReplyRoute, UPDATE_QUEUE_SIZE};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

/// Telegram update payload (getUpdates result item).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub entities: Vec<TelegramEntity>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

/// Text entity attached by the platform (we only care about bot_command).
#[derive(Debug, Deserialize)]
pub struct TelegramEntity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: i64,
    #[serde(default)]
    pub length: i64,
}

/// Telegram messaging client: long-polls for updates and sends replies via
/// sendMessage, addressed by chat id.
pub struct TelegramClient {
    token: String,
    base_url: String,
    debug: bool,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(token: String, debug: bool) -> Self {
        let base_url = std::env::var("TELEGRAM_API_BASE")
            .unwrap_or_else(|_| TELEGRAM_API_BASE.to_string());
        Self {
            token,
            base_url,
            debug,
            client: reqwest::Client::new(),
        }
    }

    /// Call getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), String> {
        let url = format!(
            "{}/bot{}/getUpdates?timeout={}",
            self.base_url, self.token, LONG_POLL_TIMEOUT
        );
        let url = if let Some(off) = offset {
            format!("{}&offset={}", url, off)
        } else {
            url
        };
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("getUpdates failed: {} {}", status, body));
        }
        let data: GetUpdatesResponse = res.json().await.map_err(|e| e.to_string())?;
        if !data.ok {
            return Err("getUpdates returned ok: false".to_string());
        }
        let next_offset = data
            .result
            .iter()
            .map(|u| u.update_id)
            .max()
            .map(|id| id + 1);
        Ok((data.result, next_offset))
    }

    /// Send a text message to a chat via the sendMessage API.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), String> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("sendMessage failed: {} {}", status, body));
        }
        Ok(())
    }
}

#[async_trait]
impl super::MessageClient for TelegramClient {
    fn updates(self: Arc<Self>, cancel: CancellationToken) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(UPDATE_QUEUE_SIZE);
        log::info!("telegram: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, tx, cancel).await;
        });
        rx
    }

    /// One synchronous sendMessage call; network and auth failures propagate
    /// to the caller.
    async fn send(&self, text: &str, reply_to: &Message) -> Result<(), String> {
        let ReplyRoute::ChatId(chat_id) = reply_to.reply_route else {
            return Err("message has no chat id to reply to".to_string());
        };
        self.send_message(chat_id, text).await
    }
}

async fn run_get_updates_loop(
    client: Arc<TelegramClient>,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
) {
    let mut offset: Option<i64> = None;
    loop {
        let polled = tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("telegram: cancelled, stopping getUpdates loop");
                break;
            }
            polled = client.get_updates(offset) => polled,
        };
        match polled {
            Ok((updates, next)) => {
                offset = next;
                for update in updates {
                    if client.debug {
                        log::debug!("telegram update: {:?}", update);
                    }
                    if tx.send(parse_update(&update)).await.is_err() {
                        log::debug!("telegram: update stream closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::warn!("telegram getUpdates error: {}", e);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(tokio::time::Duration::from_secs(2)) => {}
                }
            }
        }
    }
    log::info!("telegram: getUpdates loop stopped");
}

/// Translate one update into the common Message shape.
fn parse_update(update: &TelegramUpdate) -> Message {
    let Some(ref msg) = update.message else {
        // No inner message payload: sentinel for malformed/non-message updates.
        return Message::default();
    };
    let text = msg.text.as_deref().unwrap_or_default();
    let reply_route = ReplyRoute::ChatId(msg.chat.id);

    if !is_command(msg) {
        return Message {
            kind: MessageKind::Chat,
            command: String::new(),
            args: Vec::new(),
            raw: text.to_string(),
            reply_route,
        };
    }

    let mut tokens = text.split_whitespace();
    let word = tokens.next().unwrap_or_default();
    let word = word.strip_prefix('/').unwrap_or(word);
    // A group command may be addressed as /cmd@botname.
    let command = word.split('@').next().unwrap_or(word).to_string();
    Message {
        kind: MessageKind::Command,
        command,
        args: tokens.map(str::to_string).collect(),
        raw: text.to_string(),
        reply_route,
    }
}

/// True when the platform marked the text as a command: a bot_command entity
/// at the very start of the message.
fn is_command(msg: &TelegramMessage) -> bool {
    msg.entities
        .iter()
        .any(|e| e.kind == "bot_command" && e.offset == 0)
}
