//! Album discovery.
//!
//! The client has no "list album members" call, so siblings are found by batch-fetching a
//! window of ids around the target and keeping the ones that share its group token. The
//! result never contains foreign messages, but albums reaching past the window come back
//! truncated.

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    domain::{ChatIdentifier, MessageId, MessageReference},
    errors::Error,
    message::{MediaGroupSet, RemoteMessage},
    ports::MessageSource,
};

/// Default sibling scan radius around the target id.
pub const DEFAULT_ALBUM_WINDOW: i32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("message {} not found in {chat}", .message_id.0)]
    NotFound {
        chat: ChatIdentifier,
        message_id: MessageId,
    },

    #[error("access to {chat} denied: {detail}")]
    AccessDenied { chat: ChatIdentifier, detail: String },

    #[error("fetching from {chat} failed: {detail}")]
    Transport { chat: ChatIdentifier, detail: String },
}

impl ResolveError {
    fn from_fetch(chat: &ChatIdentifier, err: Error) -> Self {
        match err {
            Error::AccessDenied(detail) => ResolveError::AccessDenied {
                chat: chat.clone(),
                detail,
            },
            other => ResolveError::Transport {
                chat: chat.clone(),
                detail: other.to_string(),
            },
        }
    }
}

#[derive(Clone)]
pub struct MediaGroupResolver {
    source: Arc<dyn MessageSource>,
    window: i32,
}

impl MediaGroupResolver {
    pub fn new(source: Arc<dyn MessageSource>, window: i32) -> Self {
        Self {
            source,
            window: window.max(1),
        }
    }

    pub fn window(&self) -> i32 {
        self.window
    }

    /// Fetch the referenced message and, for albums, its siblings in ascending id order.
    pub async fn resolve(
        &self,
        reference: &MessageReference,
    ) -> Result<MediaGroupSet, ResolveError> {
        let chat = &reference.chat;
        let target = self.fetch_target(reference).await?;

        let Some(token) = target.group.clone() else {
            debug!(chat = %chat, message_id = target.id.0, "standalone message");
            return Ok(MediaGroupSet::single(target));
        };

        let candidates = candidate_window(reference.message_id, self.window);
        let fetched = self
            .source
            .fetch_messages(chat, &candidates)
            .await
            .map_err(|e| ResolveError::from_fetch(chat, e))?;

        let members: Vec<RemoteMessage> = fetched.into_iter().flatten().collect();
        let set = match MediaGroupSet::from_album(&token, members) {
            Some(set) => set,
            None => MediaGroupSet::single(target),
        };

        info!(
            chat = %chat,
            message_id = reference.message_id.0,
            items = set.len(),
            window = self.window,
            "album resolved"
        );
        Ok(set)
    }

    async fn fetch_target(
        &self,
        reference: &MessageReference,
    ) -> Result<RemoteMessage, ResolveError> {
        let chat = &reference.chat;
        let fetched = self
            .source
            .fetch_messages(chat, &[reference.message_id])
            .await
            .map_err(|e| ResolveError::from_fetch(chat, e))?;

        fetched
            .into_iter()
            .flatten()
            .find(|m| m.id == reference.message_id)
            .ok_or_else(|| ResolveError::NotFound {
                chat: chat.clone(),
                message_id: reference.message_id,
            })
    }
}

/// Ids `[id - window, id + window]`, lower bound clamped to 1.
pub fn candidate_window(message_id: MessageId, window: i32) -> Vec<MessageId> {
    let window = window.max(1);
    let start = message_id.0.saturating_sub(window).max(1);
    let end = message_id.0.saturating_add(window);
    (start..=end).map(MessageId).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::GroupToken,
        testing::{photo_msg, text_msg, Call, FakeTelegram, SOURCE_CHAT},
    };

    fn reference(id: i32) -> MessageReference {
        MessageReference {
            chat: ChatIdentifier::Id(SOURCE_CHAT),
            message_id: MessageId(id),
        }
    }

    fn resolver(fake: FakeTelegram) -> (Arc<FakeTelegram>, MediaGroupResolver) {
        let fake = Arc::new(fake);
        let r = MediaGroupResolver::new(fake.clone(), DEFAULT_ALBUM_WINDOW);
        (fake, r)
    }

    #[test]
    fn window_is_clamped_at_one() {
        let ids = candidate_window(MessageId(3), 10);
        assert_eq!(ids.first(), Some(&MessageId(1)));
        assert_eq!(ids.last(), Some(&MessageId(13)));

        let ids = candidate_window(MessageId(50), 0);
        assert_eq!(ids, vec![MessageId(49), MessageId(50), MessageId(51)]);
    }

    #[tokio::test]
    async fn standalone_message_skips_window_scan() {
        let (fake, r) = resolver(FakeTelegram::default().with_chat(
            SOURCE_CHAT,
            None,
            vec![text_msg(100, "hello")],
        ));

        let set = r.resolve(&reference(100)).await.unwrap();
        assert_eq!(set.ids(), vec![MessageId(100)]);
        assert_eq!(fake.calls(), vec![Call::Fetch(vec![MessageId(100)])]);
    }

    #[tokio::test]
    async fn album_keeps_only_matching_token_in_ascending_order() {
        let (_fake, r) = resolver(FakeTelegram::default().with_chat(
            SOURCE_CHAT,
            None,
            vec![
                photo_msg(18, Some("other")),
                photo_msg(19, Some("G1")),
                photo_msg(20, Some("G1")),
                photo_msg(21, Some("G1")),
                text_msg(22, "after"),
                photo_msg(23, Some("other")),
            ],
        ));

        let set = r.resolve(&reference(20)).await.unwrap();
        assert_eq!(set.ids(), vec![MessageId(19), MessageId(20), MessageId(21)]);
        for m in set.items() {
            assert_eq!(m.group, Some(GroupToken("G1".to_string())));
        }
        let ids = set.ids();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn album_members_outside_window_are_not_recovered() {
        let (_fake, r) = resolver(FakeTelegram::default().with_chat(
            SOURCE_CHAT,
            None,
            vec![photo_msg(1, Some("G")), photo_msg(30, Some("G"))],
        ));

        let set = r.resolve(&reference(30)).await.unwrap();
        assert_eq!(set.ids(), vec![MessageId(30)]);
    }

    #[tokio::test]
    async fn missing_message_is_not_found() {
        let (_fake, r) = resolver(FakeTelegram::default().with_chat(SOURCE_CHAT, None, vec![]));
        let err = r.resolve(&reference(5)).await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[tokio::test]
    async fn rejected_access_is_access_denied() {
        let (fake, r) = resolver(FakeTelegram::default());
        fake.deny_access();
        let err = r.resolve(&reference(5)).await.unwrap_err();
        assert!(matches!(err, ResolveError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn transport_errors_fail_the_resolution() {
        let (fake, r) = resolver(FakeTelegram::default().with_chat(
            SOURCE_CHAT,
            None,
            vec![photo_msg(5, None)],
        ));
        fake.fail_fetch();
        let err = r.resolve(&reference(5)).await.unwrap_err();
        assert!(matches!(err, ResolveError::Transport { .. }));
    }

    #[tokio::test]
    async fn handles_resolve_through_the_source() {
        let (_fake, r) = resolver(FakeTelegram::default().with_chat(
            SOURCE_CHAT,
            Some("examplechan"),
            vec![text_msg(100, "hi")],
        ));
        let set = r
            .resolve(&MessageReference {
                chat: ChatIdentifier::Handle("examplechan".to_string()),
                message_id: MessageId(100),
            })
            .await
            .unwrap();
        assert_eq!(set.source_chat(), SOURCE_CHAT);
    }
}
