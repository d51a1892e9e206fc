//! Canonical message passed from an adapter to the poller.

/// How an adapter classified an inbound payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MessageKind {
    /// Starts with the command sigil; should be dispatched as an action.
    Command,
    /// Plain text, not actionable.
    Chat,
    /// Acknowledgment of a previously issued request (socket protocol only).
    Response,
    /// Structurally empty or unparseable envelope.
    #[default]
    Update,
}

/// Where a reply must be delivered. Opaque to the poller; only the adapter
/// that produced the message interprets it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReplyRoute {
    #[default]
    None,
    /// Telegram chat id.
    ChatId(i64),
    /// Signal sender number.
    Source(String),
}

/// A normalized update from a messaging front-end. Messages are values:
/// created per inbound event, dropped after one dispatch cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    /// Name of the invoked action; meaningful only when kind is Command.
    pub command: String,
    /// Positional arguments: the whitespace-delimited tokens after the command word.
    pub args: Vec<String>,
    /// Original wire payload, kept for diagnostics.
    pub raw: String,
    pub reply_route: ReplyRoute,
}
