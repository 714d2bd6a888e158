use std::fmt;

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric, fully qualified: channels carry the `-100` prefix).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub i64);

/// Telegram message id, the ordinal of a message within its chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i32);

/// Opaque token shared by every message of one album (`media_group_id`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupToken(pub String);

/// How a link names its chat: a numeric id or a public handle.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatIdentifier {
    Id(ChatId),
    Handle(String),
}

impl fmt::Display for ChatIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatIdentifier::Id(id) => write!(f, "{}", id.0),
            ChatIdentifier::Handle(h) => write!(f, "@{h}"),
        }
    }
}

/// A parsed message link. `message_id` is always positive.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageReference {
    pub chat: ChatIdentifier,
    pub message_id: MessageId,
}

impl MessageReference {
    /// `https://t.me/...` form of the reference.
    pub fn canonical_link(&self) -> String {
        match &self.chat {
            ChatIdentifier::Handle(h) => format!("https://t.me/{h}/{}", self.message_id.0),
            ChatIdentifier::Id(id) => {
                let raw = id.0.to_string();
                match raw.strip_prefix("-100") {
                    Some(internal) => {
                        format!("https://t.me/c/{internal}/{}", self.message_id.0)
                    }
                    None => format!("https://t.me/{raw}/{}", self.message_id.0),
                }
            }
        }
    }
}
