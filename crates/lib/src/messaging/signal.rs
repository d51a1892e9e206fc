//! Signal channel: line-delimited JSON-RPC 2.0 over the signal-cli unix socket.
//!
//! One persistent connection, no reconnection: losing the socket ends the
//! client instance. Inbound frames are decoded flat and demultiplexed by
//! field presence: a `receive` notification becomes a Command/Chat message,
//! a bare `result` becomes a Response on the same stream, an `error` is
//! logged and dropped.

use crate::messaging::{Message, MessageKind, ReplyRoute, UPDATE_QUEUE_SIZE};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Inbound JSON-RPC frame, decoded flat. Field presence is the discriminant:
/// method+params = notification, result = response, error = RPC error.
#[derive(Debug, Deserialize)]
struct RpcFrame {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<serde_json::Value>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcError>,
    #[serde(default)]
    id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    #[allow(dead_code)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Outbound JSON-RPC 2.0 request envelope.
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: SendRpcParams<'a>,
    id: u64,
}

/// Named params for the signal-cli `send` method.
#[derive(Debug, Serialize)]
struct SendRpcParams<'a> {
    recipient: [&'a str; 1],
    message: &'a str,
}

/// Payload of a `receive` notification (only the fields we read).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiveParams {
    #[serde(default)]
    envelope: Envelope,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    source_number: String,
    #[serde(default)]
    sync_message: SyncMessage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncMessage {
    #[serde(default)]
    sent_message: SentMessage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SentMessage {
    #[serde(default)]
    message: String,
}

/// Signal messaging client over the signal-cli JSON-RPC socket. Senders not
/// on the `sources` allow-list are dropped before they reach the stream.
pub struct SignalClient {
    sources: Vec<String>,
    /// Taken exactly once by the receive loop.
    reader: Mutex<Option<BufReader<OwnedReadHalf>>>,
    /// Write half shared by concurrent senders.
    writer: Mutex<OwnedWriteHalf>,
    next_id: AtomicU64,
}

impl SignalClient {
    /// Dial the signal-cli socket. Fails fast when the socket is
    /// unreachable; there is no reconnect once the stream is up.
    pub async fn connect(socket_path: impl AsRef<Path>, sources: Vec<String>) -> Result<Self> {
        let path = socket_path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .with_context(|| format!("dialing signal socket {}", path.display()))?;
        Ok(Self::from_stream(stream, sources))
    }

    fn from_stream(stream: UnixStream, sources: Vec<String>) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            sources,
            reader: Mutex::new(Some(BufReader::new(read_half))),
            writer: Mutex::new(write_half),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl super::MessageClient for SignalClient {
    fn updates(self: Arc<Self>, cancel: CancellationToken) -> mpsc::Receiver<Message> {
        let (tx, rx) = mpsc::channel(UPDATE_QUEUE_SIZE);
        tokio::spawn(async move {
            let reader = self.reader.lock().await.take();
            let Some(reader) = reader else {
                log::error!("signal: receive loop already started");
                return;
            };
            run_receive_loop(reader, self.sources.clone(), tx, cancel).await;
        });
        rx
    }

    /// Build a `send` request addressed to the original sender and write it.
    /// Success means written to the socket, not delivered; the acknowledgment
    /// arrives later as a Response on the update stream.
    async fn send(&self, text: &str, reply_to: &Message) -> Result<(), String> {
        let ReplyRoute::Source(ref source) = reply_to.reply_route else {
            return Err("message has no source number to reply to".to_string());
        };
        let req = RpcRequest {
            jsonrpc: "2.0",
            method: "send",
            params: SendRpcParams {
                recipient: [source.as_str()],
                message: text,
            },
            id: self.next_request_id(),
        };
        let mut line = serde_json::to_vec(&req).map_err(|e| format!("encode error: {}", e))?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| format!("write error: {}", e))
    }
}

async fn run_receive_loop(
    reader: BufReader<OwnedReadHalf>,
    sources: Vec<String>,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
) {
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("signal: cancelled, closing connection");
                return;
            }
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                log::info!("signal: socket closed (EOF), exiting");
                return;
            }
            Err(e) => {
                log::info!("signal: read failed, exiting: {}", e);
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let frame: RpcFrame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("signal: dropping undecodable frame: {}", e);
                continue;
            }
        };

        if let Some(err) = frame.error {
            log::warn!("signal: rpc error (id={:?}): {}", frame.id, err.message);
            continue;
        }

        if frame.method.as_deref() == Some("receive") {
            if let Some(ref params) = frame.params {
                match parse_notification(params, &sources) {
                    Ok(message) => {
                        if tx.send(message).await.is_err() {
                            log::debug!("signal: update stream closed, stopping loop");
                            return;
                        }
                    }
                    Err(e) => log::warn!("signal: {}", e),
                }
                continue;
            }
        }

        if let Some(ref result) = frame.result {
            let message = Message {
                kind: MessageKind::Response,
                raw: result.to_string(),
                ..Message::default()
            };
            if tx.send(message).await.is_err() {
                log::debug!("signal: update stream closed, stopping loop");
                return;
            }
            continue;
        }

        log::debug!("signal: unrecognized frame: {}", line);
    }
}

/// Decode a `receive` notification into a Message. The sender number must be
/// on the allow-list; everything else is an error the loop logs and drops,
/// never surfaced downstream.
fn parse_notification(params: &serde_json::Value, sources: &[String]) -> Result<Message, String> {
    let recv: ReceiveParams = serde_json::from_value(params.clone())
        .map_err(|e| format!("undecodable receive params: {}", e))?;

    let source = recv.envelope.source_number;
    if !sources.iter().any(|s| s == &source) {
        return Err(format!(
            "message ignored, sender not on the sources allow-list: {}",
            source
        ));
    }

    let text = recv.envelope.sync_message.sent_message.message;
    let mut tokens = text.split_whitespace();
    let first = tokens.next().unwrap_or_default();
    let (kind, command) = match first.strip_prefix('/') {
        Some(stripped) => (MessageKind::Command, stripped.to_string()),
        None => (MessageKind::Chat, first.to_string()),
    };
    Ok(Message {
        kind,
        command,
        args: tokens.map(str::to_string).collect(),
        raw: params.to_string(),
        reply_route: ReplyRoute::Source(source),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MessageClient;
    use serde_json::json;

    fn receive_params(source_number: &str, text: &str) -> serde_json::Value {
        json!({
            "account": "bot",
            "envelope": {
                "source": "alice-device",
                "sourceNumber": source_number,
                "sourceUuid": "uuid-abc-123",
                "syncMessage": {
                    "sentMessage": {
                        "destinationNumber": "+15557654321",
                        "message": text,
                        "timestamp": 1234567890u64
                    }
                }
            },
            "timestamp": 1234567890u64
        })
    }

    fn allow(numbers: &[&str]) -> Vec<String> {
        numbers.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn chat_from_allowed_source() {
        let params = receive_params("+15551234567", "command arg1");
        let parsed = parse_notification(&params, &allow(&["+15551234567", "+15559876543"]))
            .expect("parse");
        assert_eq!(parsed.kind, MessageKind::Chat);
        assert_eq!(parsed.command, "command");
        assert_eq!(parsed.args, vec!["arg1".to_string()]);
        assert_eq!(parsed.reply_route, ReplyRoute::Source("+15551234567".to_string()));
        assert_eq!(parsed.raw, params.to_string());
    }

    #[test]
    fn command_from_allowed_source_strips_sigil() {
        let params = receive_params("+15551234567", "/greet Alice Bob");
        let parsed = parse_notification(&params, &allow(&["+15551234567"])).expect("parse");
        assert_eq!(parsed.kind, MessageKind::Command);
        assert_eq!(parsed.command, "greet");
        assert_eq!(parsed.args, vec!["Alice".to_string(), "Bob".to_string()]);
    }

    #[test]
    fn disallowed_source_is_rejected() {
        let params = receive_params("+15550000000", "hi there");
        let err = parse_notification(&params, &allow(&["+15551234567"])).expect_err("rejected");
        assert!(err.contains("not on the sources allow-list"), "got: {err}");
    }

    #[test]
    fn command_without_arguments() {
        let params = receive_params("+15551234567", "/uptime");
        let parsed = parse_notification(&params, &allow(&["+15551234567"])).expect("parse");
        assert_eq!(parsed.kind, MessageKind::Command);
        assert_eq!(parsed.command, "uptime");
        assert!(parsed.args.is_empty());
    }

    #[tokio::test]
    async fn receive_loop_classifies_frames_and_ends_on_eof() {
        let (ours, theirs) = UnixStream::pair().expect("socket pair");
        let client = Arc::new(SignalClient::from_stream(ours, allow(&["+15551234567"])));
        let mut updates = client.updates(CancellationToken::new());

        let frames = [
            // command from an allow-listed sender
            json!({"jsonrpc": "2.0", "method": "receive",
                   "params": receive_params("+15551234567", "/echo hi")})
            .to_string(),
            // sender not on the allow-list: dropped
            json!({"jsonrpc": "2.0", "method": "receive",
                   "params": receive_params("+15550000000", "/echo hi")})
            .to_string(),
            // rpc error: logged and dropped
            json!({"jsonrpc": "2.0", "error": {"code": -32601, "message": "nope"}, "id": 7})
                .to_string(),
            // undecodable line: skipped, loop continues
            "{not json".to_string(),
            // response to an earlier send
            json!({"jsonrpc": "2.0", "result": {"timestamp": 1618033988u64, "results": []}, "id": 1})
                .to_string(),
        ];
        let (theirs_read, mut theirs_write) = theirs.into_split();
        for frame in frames {
            theirs_write
                .write_all(format!("{}\n", frame).as_bytes())
                .await
                .expect("write frame");
        }
        drop(theirs_write);
        drop(theirs_read);

        let first = updates.recv().await.expect("command message");
        assert_eq!(first.kind, MessageKind::Command);
        assert_eq!(first.command, "echo");
        assert_eq!(first.args, vec!["hi".to_string()]);

        let second = updates.recv().await.expect("response message");
        assert_eq!(second.kind, MessageKind::Response);
        assert!(second.raw.contains("1618033988"));

        // EOF closes the stream.
        assert!(updates.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancellation_ends_the_stream() {
        let (ours, _theirs) = UnixStream::pair().expect("socket pair");
        let client = Arc::new(SignalClient::from_stream(ours, Vec::new()));
        let cancel = CancellationToken::new();
        let mut updates = client.updates(cancel.clone());
        cancel.cancel();
        assert!(updates.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_writes_request_lines_with_sequential_ids() {
        let (ours, theirs) = UnixStream::pair().expect("socket pair");
        let client = SignalClient::from_stream(ours, Vec::new());
        let reply_to = Message {
            kind: MessageKind::Command,
            reply_route: ReplyRoute::Source("+15551234567".to_string()),
            ..Message::default()
        };

        client.send("first", &reply_to).await.expect("send");
        client.send("second", &reply_to).await.expect("send");

        let mut lines = BufReader::new(theirs).lines();
        for (expected_id, expected_text) in [(1u64, "first"), (2u64, "second")] {
            let line = lines.next_line().await.expect("read").expect("line");
            let value: serde_json::Value = serde_json::from_str(&line).expect("json");
            assert_eq!(value["jsonrpc"], "2.0");
            assert_eq!(value["method"], "send");
            assert_eq!(value["id"], expected_id);
            assert_eq!(value["params"]["recipient"][0], "+15551234567");
            assert_eq!(value["params"]["message"], expected_text);
        }
    }

    #[tokio::test]
    async fn send_without_source_route_fails() {
        let (ours, _theirs) = UnixStream::pair().expect("socket pair");
        let client = SignalClient::from_stream(ours, Vec::new());
        let err = client
            .send("text", &Message::default())
            .await
            .expect_err("no route");
        assert!(err.contains("no source number"), "got: {err}");
    }
}
