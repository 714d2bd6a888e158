//! Link in, delivery out: parser, resolver and engine behind one call.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tracing::info;

use crate::{
    domain::ChatId,
    forward::{ForwardConfig, ForwardEngine, ForwardOutcome, DEFAULT_ITEM_DELAY},
    link::{self, ParseError},
    ports::{MessageSource, RelaySink},
    resolver::{MediaGroupResolver, ResolveError, DEFAULT_ALBUM_WINDOW},
    temp_files::TempFileManager,
};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl RelayError {
    /// Short text suitable for the requesting user.
    pub fn user_message(&self) -> String {
        match self {
            RelayError::Parse(_) => {
                "That does not look like a message link. Expected https://t.me/<channel>/<id> \
                 or https://t.me/c/<id>/<id>."
                    .to_string()
            }
            RelayError::Resolve(ResolveError::NotFound { .. }) => {
                "Message not found. I can only relay messages from chats I have seen.".to_string()
            }
            RelayError::Resolve(ResolveError::AccessDenied { .. }) => {
                "I don't have access to that chat.".to_string()
            }
            RelayError::Resolve(ResolveError::Transport { detail, .. }) => {
                format!("Telegram request failed: {detail}")
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub temp_dir: PathBuf,
    pub album_window: i32,
    pub item_delay: Duration,
    pub annotate: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("/tmp/tgrelay"),
            album_window: DEFAULT_ALBUM_WINDOW,
            item_delay: DEFAULT_ITEM_DELAY,
            annotate: true,
        }
    }
}

#[derive(Clone)]
pub struct Relay {
    resolver: MediaGroupResolver,
    engine: ForwardEngine,
    annotate: bool,
}

impl Relay {
    pub fn new(source: Arc<dyn MessageSource>, sink: Arc<dyn RelaySink>, cfg: &RelayConfig) -> Self {
        let temp = TempFileManager::new(source.clone(), cfg.temp_dir.clone());
        let engine = ForwardEngine::new(
            sink,
            temp,
            ForwardConfig {
                item_delay: cfg.item_delay,
            },
        );
        Self {
            resolver: MediaGroupResolver::new(source, cfg.album_window),
            engine,
            annotate: cfg.annotate,
        }
    }

    /// Relay the message (or whole album) behind `raw_link` into `destination`.
    ///
    /// Parse and resolution errors come back as `Err`; delivery problems are part of the
    /// returned outcome.
    pub async fn relay_link(
        &self,
        destination: ChatId,
        raw_link: &str,
    ) -> Result<ForwardOutcome, RelayError> {
        let reference = link::parse(raw_link)?;
        let set = self.resolver.resolve(&reference).await?;

        let annotation = self
            .annotate
            .then(|| format!("Source: {}", link::normalize_link(raw_link)));

        info!(
            destination = destination.0,
            chat = %reference.chat,
            message_id = reference.message_id.0,
            items = set.len(),
            "relaying"
        );
        Ok(self
            .engine
            .deliver(destination, &set, annotation.as_deref())
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::MessageId,
        forward::Tier,
        testing::{photo_msg, temp_dir, text_msg, Call, FakeTelegram, DEST_CHAT, SOURCE_CHAT},
    };

    fn relay(fake: &Arc<FakeTelegram>, name: &str, annotate: bool) -> Relay {
        let cfg = RelayConfig {
            temp_dir: temp_dir(name),
            annotate,
            ..RelayConfig::default()
        };
        Relay::new(fake.clone(), fake.clone(), &cfg)
    }

    #[tokio::test]
    async fn public_text_link_is_copied_once() {
        let fake = Arc::new(FakeTelegram::default().with_chat(
            SOURCE_CHAT,
            Some("examplechan"),
            vec![text_msg(100, "hello")],
        ));
        let relay = relay(&fake, "relay-text", false);

        let outcome = relay
            .relay_link(DEST_CHAT, "https://t.me/examplechan/100")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ForwardOutcome::Delivered {
                count: 1,
                total: 1,
                tier: Tier::NativeCopy
            }
        );
        assert_eq!(
            fake.sends(),
            vec![Call::Copy {
                destination: DEST_CHAT,
                source: SOURCE_CHAT,
                ids: vec![MessageId(100)],
            }]
        );
        assert!(fake.downloads().is_empty());
    }

    #[tokio::test]
    async fn album_is_reuploaded_as_one_group() {
        let msgs = (1..=4).map(|i| photo_msg(200 + i, Some("G1"))).collect();
        let fake = Arc::new(FakeTelegram::default().with_chat(SOURCE_CHAT, None, msgs));
        fake.fail_copy();
        fake.fail_remote_sends();
        let relay = relay(&fake, "relay-album", true);

        let outcome = relay
            .relay_link(DEST_CHAT, "t.me/c/777/202")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ForwardOutcome::Delivered {
                count: 4,
                total: 4,
                tier: Tier::Reupload
            }
        );

        let downloads = fake.downloads();
        assert_eq!(downloads.len(), 4);
        assert!(downloads.iter().all(|p| !p.exists()));

        let local_groups: Vec<_> = fake
            .sends()
            .into_iter()
            .filter_map(|c| match c {
                Call::Group(items) if items.iter().all(|i| i.local) => Some(items),
                _ => None,
            })
            .collect();
        assert_eq!(local_groups.len(), 1);
        let files: Vec<&str> = local_groups[0].iter().map(|i| i.file.as_str()).collect();
        assert_eq!(files, vec!["file-201", "file-202", "file-203", "file-204"]);
        assert_eq!(
            local_groups[0][0].caption.as_deref(),
            Some("Source: https://t.me/c/777/202")
        );
    }

    #[tokio::test]
    async fn malformed_link_is_a_parse_error() {
        let fake = Arc::new(FakeTelegram::default());
        let relay = relay(&fake, "relay-parse", true);

        let err = relay.relay_link(DEST_CHAT, "t.me/nope").await.unwrap_err();
        assert!(matches!(err, RelayError::Parse(_)));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_chat_is_reported_as_denied() {
        let fake = Arc::new(FakeTelegram::default());
        let relay = relay(&fake, "relay-denied", true);

        let err = relay
            .relay_link(DEST_CHAT, "https://t.me/hidden/5")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::Resolve(ResolveError::AccessDenied { .. })
        ));
        assert!(err.user_message().contains("access"));
    }
}
