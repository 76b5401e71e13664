//! Decoded server responses.
//!
//! An [`RpcResponse`] is what the protocol codec hands back for a call: an
//! ordered list of [`UpdateRecord`]s plus side tables of the users and chats
//! those updates mention.

use std::collections::HashMap;

use crate::Peer;

// ─── Entities ─────────────────────────────────────────────────────────────────

/// A user mentioned by a response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UserRecord {
    pub id:         i64,
    pub first_name: String,
    pub last_name:  Option<String>,
    pub username:   Option<String>,
    pub bot:        bool,
}

impl UserRecord {
    /// First and last name joined by a space.
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {last}", self.first_name),
            _ => self.first_name.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChatKind {
    Group,
    Supergroup,
    Channel,
}

/// A group or channel mentioned by a response.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChatRecord {
    pub id:       i64,
    pub title:    String,
    pub username: Option<String>,
    pub kind:     ChatKind,
}

/// A message as carried inside an update.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageRecord {
    pub id:      i32,
    pub peer_id: Peer,
    /// Not set for channel posts.
    pub from_id: Option<Peer>,
    /// Unix timestamp.
    pub date:    i32,
    pub message: String,
    pub out:     bool,
}

// ─── Updates ──────────────────────────────────────────────────────────────────

/// A message sent on behalf of a business connection.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusinessMessage {
    pub connection_id:    Option<String>,
    pub message:          MessageRecord,
    pub reply_to_message: Option<MessageRecord>,
}

/// One entry of a response's update list.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UpdateRecord {
    NewMessage(MessageRecord),
    NewChannelMessage(MessageRecord),
    NewScheduledMessage(MessageRecord),
    NewBusinessMessage(BusinessMessage),
    /// Anything the dispatcher does not act on.
    Other { constructor_id: u32 },
}

/// Tag of an [`UpdateRecord`], used to say which updates a call is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    NewMessage,
    NewChannelMessage,
    NewScheduledMessage,
    NewBusinessMessage,
    Other,
}

impl UpdateKind {
    /// Every kind that reports a freshly sent message.
    pub const SENT_MESSAGE: &'static [UpdateKind] = &[
        Self::NewMessage,
        Self::NewChannelMessage,
        Self::NewScheduledMessage,
        Self::NewBusinessMessage,
    ];
}

impl UpdateRecord {
    pub fn kind(&self) -> UpdateKind {
        match self {
            Self::NewMessage(_)          => UpdateKind::NewMessage,
            Self::NewChannelMessage(_)   => UpdateKind::NewChannelMessage,
            Self::NewScheduledMessage(_) => UpdateKind::NewScheduledMessage,
            Self::NewBusinessMessage(_)  => UpdateKind::NewBusinessMessage,
            Self::Other { .. }           => UpdateKind::Other,
        }
    }

    pub fn matches(&self, expected: &[UpdateKind]) -> bool {
        expected.contains(&self.kind())
    }
}

// ─── RpcResponse ──────────────────────────────────────────────────────────────

/// A decoded response to one call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RpcResponse {
    pub updates: Vec<UpdateRecord>,
    pub users:   HashMap<i64, UserRecord>,
    pub chats:   HashMap<i64, ChatRecord>,
}

impl RpcResponse {
    pub fn new(updates: Vec<UpdateRecord>) -> Self {
        Self { updates, ..Default::default() }
    }

    /// Add users to the side table, keyed by their id.
    pub fn with_users(mut self, users: impl IntoIterator<Item = UserRecord>) -> Self {
        self.users.extend(users.into_iter().map(|u| (u.id, u)));
        self
    }

    /// Add chats to the side table, keyed by their id.
    pub fn with_chats(mut self, chats: impl IntoIterator<Item = ChatRecord>) -> Self {
        self.chats.extend(chats.into_iter().map(|c| (c.id, c)));
        self
    }
}
