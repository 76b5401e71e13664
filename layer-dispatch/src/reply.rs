//! Reply targets.
//!
//! Call wrappers accept both the deprecated `reply_to_message_id` and the
//! structured [`ReplyParameters`]. They must not be combined; [`ReplyParameters::normalize`]
//! folds them into one value before a request is built.

use crate::DispatchError;

/// Which message a new message replies to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReplyParameters {
    pub message_id: i32,
    /// Chat of the replied-to message when it is not the current chat.
    pub chat_id:    Option<i64>,
    /// Quoted part of the replied-to message.
    pub quote:      Option<String>,
}

impl ReplyParameters {
    pub fn to_message(message_id: i32) -> Self {
        Self { message_id, ..Default::default() }
    }

    pub fn in_chat(mut self, chat_id: i64) -> Self {
        self.chat_id = Some(chat_id); self
    }

    pub fn quote(mut self, text: impl Into<String>) -> Self {
        self.quote = Some(text.into()); self
    }

    /// Merge the deprecated id and the structured parameters.
    pub fn normalize(
        reply_to_message_id: Option<i32>,
        reply_parameters:    Option<ReplyParameters>,
    ) -> Result<Option<ReplyParameters>, DispatchError> {
        match (reply_to_message_id, reply_parameters) {
            (Some(_), Some(_)) => Err(DispatchError::Validation(
                "`reply_to_message_id` and `reply_parameters` are mutually exclusive".into(),
            )),
            (Some(id), None) => {
                tracing::warn!("[layer-dispatch] `reply_to_message_id` is deprecated, use `reply_parameters` instead");
                Ok(Some(Self::to_message(id)))
            }
            (None, params) => Ok(params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_both() {
        let r = ReplyParameters::normalize(Some(1), Some(ReplyParameters::to_message(2)));
        assert!(matches!(r, Err(DispatchError::Validation(_))));
    }

    #[test]
    fn converts_deprecated_id() {
        let r = ReplyParameters::normalize(Some(42), None).unwrap();
        assert_eq!(r, Some(ReplyParameters::to_message(42)));
    }

    #[test]
    fn passes_structured_through() {
        let p = ReplyParameters::to_message(7).in_chat(-100).quote("hi");
        assert_eq!(ReplyParameters::normalize(None, Some(p.clone())).unwrap(), Some(p));
        assert_eq!(ReplyParameters::normalize(None, None).unwrap(), None);
    }
}
