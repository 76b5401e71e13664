//! The typed result of a message-sending call.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{ChatRecord, MessageRecord, Peer, UserRecord};

// ─── Chat / Sender ────────────────────────────────────────────────────────────

/// The chat a message was sent in.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Chat {
    /// A one-to-one chat with this user.
    Private(UserRecord),
    Group(ChatRecord),
}

impl Chat {
    pub fn id(&self) -> i64 {
        match self {
            Self::Private(u) => u.id,
            Self::Group(c)   => c.id,
        }
    }

    /// Display title: the user's full name or the group title.
    pub fn title(&self) -> String {
        match self {
            Self::Private(u) => u.full_name(),
            Self::Group(c)   => c.title.clone(),
        }
    }
}

/// Who sent a message.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Sender {
    User(UserRecord),
    /// Anonymous admins and channel posts are sent "as" a chat.
    Chat(ChatRecord),
}

// ─── SentMessage ──────────────────────────────────────────────────────────────

/// A message the server confirmed as sent (or scheduled).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SentMessage {
    pub id:                     i32,
    /// `None` when the response did not include the chat.
    pub chat:                   Option<Chat>,
    pub sender:                 Option<Sender>,
    pub date:                   DateTime<Utc>,
    pub text:                   Option<String>,
    pub outgoing:               bool,
    pub is_scheduled:           bool,
    pub business_connection_id: Option<String>,
    pub reply_to_message:       Option<Box<SentMessage>>,
}

impl SentMessage {
    /// Build from a raw record, looking up every referenced entity in the tables.
    ///
    /// Entities missing from the tables are left as `None`.
    pub fn from_record(
        record: MessageRecord,
        users:  &HashMap<i64, UserRecord>,
        chats:  &HashMap<i64, ChatRecord>,
    ) -> Self {
        let chat = match record.peer_id {
            Peer::User(id)                  => users.get(&id).cloned().map(Chat::Private),
            Peer::Chat(id) | Peer::Channel(id) => chats.get(&id).cloned().map(Chat::Group),
        };
        let sender = record.from_id.and_then(|from| match from {
            Peer::User(id)                  => users.get(&id).cloned().map(Sender::User),
            Peer::Chat(id) | Peer::Channel(id) => chats.get(&id).cloned().map(Sender::Chat),
        });

        Self {
            id:                     record.id,
            chat,
            sender,
            date:                   DateTime::from_timestamp(record.date as i64, 0).unwrap_or_default(),
            text:                   (!record.message.is_empty()).then_some(record.message),
            outgoing:               record.out,
            is_scheduled:           false,
            business_connection_id: None,
            reply_to_message:       None,
        }
    }

    /// The chat id, if the chat is known.
    pub fn chat_id(&self) -> Option<i64> {
        self.chat.as_ref().map(Chat::id)
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}
