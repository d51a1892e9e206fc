//! Messaging front-ends (Signal socket, Telegram long poll).
//!
//! Each adapter owns a background receive loop that normalizes its wire
//! protocol into the common `Message` stream. The poller consumes one stream
//! per adapter and routes replies back through the same client, addressed by
//! the original message's routing key.

mod message;
pub mod signal;
pub mod telegram;

pub use message::{Message, MessageKind, ReplyRoute};

use crate::config::{self, Config};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of an adapter's update stream (single producer, single consumer).
pub(crate) const UPDATE_QUEUE_SIZE: usize = 16;

/// A messaging front-end: a cancellable stream of normalized updates plus a
/// reply path. Implemented by the socket and polling adapters; the poller is
/// written once against this trait.
#[async_trait]
pub trait MessageClient: Send + Sync {
    /// Start the background receive loop. Messages arrive on the returned
    /// stream until the transport closes or `cancel` fires; the closed
    /// stream is the sole termination signal.
    fn updates(self: Arc<Self>, cancel: CancellationToken) -> mpsc::Receiver<Message>;

    /// Deliver a reply to wherever `reply_to` came from.
    async fn send(&self, text: &str, reply_to: &Message) -> Result<(), String>;
}

/// Build the messaging client selected by `config.provider`. An empty
/// provider means no messaging front-end (HTTP-only operation).
pub async fn client_from_config(config: &Config) -> anyhow::Result<Option<Arc<dyn MessageClient>>> {
    match config.provider.as_str() {
        "telegram" => {
            let token = config::resolve_telegram_token(config).ok_or_else(|| {
                anyhow::anyhow!("telegram api token not set (TELEGRAM_APITOKEN or telegram.apiToken)")
            })?;
            Ok(Some(Arc::new(telegram::TelegramClient::new(
                token,
                config.telegram.debug,
            ))))
        }
        "signal" => {
            let client =
                signal::SignalClient::connect(&config.signal.socket, config.signal.sources.clone())
                    .await?;
            Ok(Some(Arc::new(client)))
        }
        "" => Ok(None),
        other => anyhow::bail!("provider {} not supported", other),
    }
}
