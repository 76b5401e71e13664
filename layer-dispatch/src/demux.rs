//! Picking the relevant update out of a response.
//!
//! A single response may carry updates unrelated to the call that produced it
//! (read receipts, other chats, …). [`demux`] scans the list in order, takes the
//! first update of an expected kind and builds the caller's result from it.

use crate::{RpcResponse, SentMessage, UpdateKind, UpdateRecord};

/// Turn `response` into the message the call produced.
///
/// Returns `None` when no update matches `expected`; that is the normal outcome
/// for calls the server acknowledges without a visible update.
///
/// For business messages the connection id carried by the update wins over the
/// one the caller supplied.
pub fn demux(
    response:               RpcResponse,
    expected:               &[UpdateKind],
    business_connection_id: Option<&str>,
) -> Option<SentMessage> {
    let RpcResponse { updates, users, chats } = response;
    let update = updates.into_iter().find(|u| u.matches(expected))?;

    let message = match update {
        UpdateRecord::NewMessage(m) | UpdateRecord::NewChannelMessage(m) => {
            SentMessage::from_record(m, &users, &chats)
        }
        UpdateRecord::NewScheduledMessage(m) => SentMessage {
            is_scheduled: true,
            ..SentMessage::from_record(m, &users, &chats)
        },
        UpdateRecord::NewBusinessMessage(b) => {
            let reply = b.reply_to_message
                .map(|r| Box::new(SentMessage::from_record(r, &users, &chats)));
            SentMessage {
                business_connection_id: b.connection_id
                    .or_else(|| business_connection_id.map(str::to_string)),
                reply_to_message: reply,
                ..SentMessage::from_record(b.message, &users, &chats)
            }
        }
        UpdateRecord::Other { constructor_id } => {
            tracing::debug!("[layer-dispatch] No result mapping for update {constructor_id:#010x}");
            return None;
        }
    };
    Some(message)
}
