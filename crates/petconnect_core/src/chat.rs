//! Real-time chat relay frames and the client-side state built from them.
//!
//! The relay only forwards frames between the participants of a chat; the REST
//! API stays the source of truth. Everything here is pure: callers pass the
//! current time in.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

use crate::entities::{ChatMessage, UserRecord};

/// A remote "is typing" notice stays visible this long without a refresh.
pub const TYPING_EXPIRY: Duration = Duration::from_secs(3);
/// Idle time after the last keystroke before announcing `isTyping = false`.
pub const TYPING_IDLE: Duration = Duration::from_secs(1);
/// A confirmed message matching one this recent is treated as its echo.
pub const ECHO_WINDOW_MS: i64 = 1000;

// ============================================================================
// Wire frames
// ============================================================================

/// Client to relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SocketFrame {
    Authenticate {
        #[serde(rename = "userId")]
        user_id: u64,
        #[serde(rename = "chatId")]
        chat_id: u64,
    },
    Message {
        #[serde(rename = "userId")]
        user_id: u64,
        username: String,
        content: String,
    },
    Typing {
        #[serde(rename = "userId")]
        user_id: u64,
        username: String,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
}

impl SocketFrame {
    pub fn authenticate(user: &UserRecord, chat_id: u64) -> Self {
        SocketFrame::Authenticate {
            user_id: user.id,
            chat_id,
        }
    }

    pub fn message(user: &UserRecord, content: impl Into<String>) -> Self {
        SocketFrame::Message {
            user_id: user.id,
            username: user.username.clone(),
            content: content.into(),
        }
    }

    pub fn typing(user: &UserRecord, is_typing: bool) -> Self {
        SocketFrame::Typing {
            user_id: user.id,
            username: user.username.clone(),
            is_typing,
        }
    }
}

/// Relay to client. Frame types this client does not know become `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SocketEvent {
    Authenticated {
        #[serde(default)]
        message: String,
    },
    Message {
        #[serde(rename = "chatId", deserialize_with = "flexible_id")]
        chat_id: u64,
        #[serde(rename = "userId", deserialize_with = "flexible_id")]
        user_id: u64,
        username: String,
        content: String,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    Typing {
        #[serde(rename = "userId", deserialize_with = "flexible_id")]
        user_id: u64,
        username: String,
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
    #[serde(other)]
    Unknown,
}

/// Ids travel as numbers or as numeric strings, depending on the sender.
fn flexible_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid id: {:?}", text))),
    }
}

// ============================================================================
// Timeline
// ============================================================================

/// Messages of one open chat, in arrival order.
#[derive(Debug, Clone)]
pub struct ChatTimeline {
    chat_id: u64,
    messages: Vec<ChatMessage>,
    next_local_id: i64,
}

impl ChatTimeline {
    pub fn new(chat_id: u64, history: Vec<ChatMessage>) -> Self {
        Self {
            chat_id,
            messages: history,
            next_local_id: -1,
        }
    }

    pub fn chat_id(&self) -> u64 {
        self.chat_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Append a message relayed over the socket. Returns the appended message,
    /// or `None` for other frames and for messages of another chat.
    pub fn apply_event(&mut self, event: &SocketEvent, now: DateTime<Utc>) -> Option<&ChatMessage> {
        let SocketEvent::Message {
            chat_id,
            username,
            content,
            timestamp,
            ..
        } = event
        else {
            return None;
        };

        if *chat_id != self.chat_id {
            return None;
        }

        let id = self.next_local_id;
        self.next_local_id -= 1;
        self.messages.push(ChatMessage {
            id,
            sender: username.clone(),
            content: content.clone(),
            sent_at: timestamp.unwrap_or(now),
        });
        self.messages.last()
    }

    /// Add a message the server confirmed as stored, unless the same sender
    /// posted the same content less than a second before `now`.
    pub fn confirm_sent(&mut self, message: ChatMessage, now: DateTime<Utc>) -> bool {
        let echoed = self.messages.iter().any(|m| {
            m.sender == message.sender
                && m.content == message.content
                && now.signed_duration_since(m.sent_at).num_milliseconds() < ECHO_WINDOW_MS
        });

        if echoed {
            return false;
        }
        self.messages.push(message);
        true
    }
}

// ============================================================================
// Typing
// ============================================================================

/// Whether the other participant is typing.
#[derive(Debug, Clone, Default)]
pub struct TypingIndicator {
    typing: Option<(String, Instant)>,
}

impl TypingIndicator {
    pub fn apply_event(&mut self, event: &SocketEvent, now: Instant) {
        if let SocketEvent::Typing {
            username,
            is_typing,
            ..
        } = event
        {
            self.typing = is_typing.then(|| (username.clone(), now));
        }
    }

    /// Username currently shown as typing.
    pub fn typing_user(&self, now: Instant) -> Option<&str> {
        match &self.typing {
            Some((username, since)) if now.saturating_duration_since(*since) < TYPING_EXPIRY => {
                Some(username.as_str())
            }
            _ => None,
        }
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.typing_user(now).is_some()
    }
}

/// Decides when the local user's typing state is announced to the relay.
///
/// `keystroke` and `poll` return the `isTyping` value to send, if any.
#[derive(Debug, Clone, Default)]
pub struct TypingNotifier {
    last_keystroke: Option<Instant>,
    last_announced: Option<Instant>,
}

impl TypingNotifier {
    pub fn keystroke(&mut self, now: Instant) -> Option<bool> {
        self.last_keystroke = Some(now);

        let due = match self.last_announced {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= TYPING_IDLE,
        };
        if due {
            self.last_announced = Some(now);
            return Some(true);
        }
        None
    }

    pub fn poll(&mut self, now: Instant) -> Option<bool> {
        let deadline = self.deadline()?;
        if now >= deadline {
            self.last_keystroke = None;
            self.last_announced = None;
            return Some(false);
        }
        None
    }

    /// When `poll` will next announce `false`, while typing is announced.
    pub fn deadline(&self) -> Option<Instant> {
        self.last_announced?;
        self.last_keystroke.map(|at| at + TYPING_IDLE)
    }
}
