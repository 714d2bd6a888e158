//! Telegram adapter (teloxide).
//!
//! Implements the `tgrelay-core` ports over the Bot API and hosts the bot's update
//! handlers.

use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use teloxide::{
    net::Download,
    prelude::*,
    types::{
        FileId, InputFile, InputMedia, InputMediaAudio, InputMediaDocument, InputMediaPhoto,
        InputMediaVideo, Message,
    },
};
use tokio::{sync::Mutex, time::sleep};
use tracing::{debug, warn};

pub mod convert;
pub mod handlers;
pub mod index;
pub mod router;

use tgrelay_core::{
    domain::{ChatId, ChatIdentifier, MessageId},
    errors::Error,
    message::{
        join_caption_within, GroupItem, GroupItemKind, MediaKind, MediaSource, OutgoingMedia,
        RemoteMessage, CAPTION_LIMIT,
    },
    ports::{MessageSource, RelaySink},
    Result,
};

use crate::index::{IndexStats, MessageIndex};

#[derive(Clone)]
pub struct TelegramRelay {
    bot: Bot,
    index: Arc<Mutex<MessageIndex>>,
}

impl TelegramRelay {
    pub fn new(bot: Bot, index_capacity: usize) -> Self {
        Self {
            bot,
            index: Arc::new(Mutex::new(MessageIndex::new(index_capacity))),
        }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    /// Remember a group or channel message so later links to it can be resolved.
    pub async fn observe(&self, msg: &Message) {
        if msg.chat.is_private() {
            return;
        }
        let remote = convert::to_remote(msg);
        let (chat, message_id, album) = (remote.chat_id.0, remote.id.0, remote.group.is_some());
        if self.index.lock().await.record(remote, msg.chat.username()) {
            debug!(chat, message_id, album, "message indexed");
        }
    }

    pub async fn index_stats(&self) -> IndexStats {
        self.index.lock().await.stats()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn input_file(source: &MediaSource) -> InputFile {
        match source {
            MediaSource::Remote(file) => InputFile::file_id(FileId(file.0.clone())),
            MediaSource::Local(path) => InputFile::file(path.clone()),
        }
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        let detail = e.to_string();
        if is_permission_error(&detail) {
            Error::AccessDenied(detail)
        } else {
            Error::External(format!("telegram error: {detail}"))
        }
    }

    /// Run a request, honouring one server flood-wait. Nothing else is retried here: the
    /// relay cascade is the retry strategy.
    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(teloxide::RequestError::RetryAfter(wait)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    warn!("telegram flood wait, retrying in {:?}", wait.duration());
                    sleep(wait.duration()).await;
                }
                Err(other) => return Err(Self::map_err(other)),
            }
        }
    }
}

/// Bot API descriptions that mean "you may not", as opposed to a transient failure.
fn is_permission_error(detail: &str) -> bool {
    let d = detail.to_ascii_lowercase();
    [
        "chat not found",
        "not enough rights",
        "have no rights",
        "forbidden",
        "bot was kicked",
        "bot is not a member",
        "can't be copied",
        "protected content",
    ]
    .iter()
    .any(|needle| d.contains(needle))
}

/// Caps anything that reaches the adapter unbudgeted; engine captions already fit.
fn fit_caption(caption: Option<String>) -> Option<String> {
    caption.and_then(|c| join_caption_within(Some(c.as_str()), None, CAPTION_LIMIT))
}

#[async_trait]
impl MessageSource for TelegramRelay {
    async fn fetch_messages(
        &self,
        chat: &ChatIdentifier,
        ids: &[MessageId],
    ) -> Result<Vec<Option<RemoteMessage>>> {
        self.index.lock().await.lookup(chat, ids)
    }

    async fn download(&self, message: &RemoteMessage, dest: &Path) -> Result<()> {
        let media = message.media().ok_or_else(|| {
            Error::DownloadFailed(format!("message {} has no media", message.id.0))
        })?;
        let file_id = FileId(media.file.0.clone());
        let file = self
            .with_retry(|| self.bot.get_file(file_id.clone()))
            .await?;

        let mut dst = tokio::fs::File::create(dest).await?;
        self.bot
            .download_file(&file.path, &mut dst)
            .await
            .map_err(|e| Error::External(format!("download of {} failed: {e}", file.path)))?;
        Ok(())
    }
}

#[async_trait]
impl RelaySink for TelegramRelay {
    async fn copy_messages(
        &self,
        destination: ChatId,
        source: ChatId,
        ids: &[MessageId],
    ) -> Result<usize> {
        let to = Self::tg_chat(destination);
        let from = Self::tg_chat(source);
        if let [id] = ids {
            self.with_retry(|| self.bot.copy_message(to, from, Self::tg_msg_id(*id)))
                .await?;
            return Ok(1);
        }

        let tg_ids: Vec<teloxide::types::MessageId> =
            ids.iter().copied().map(Self::tg_msg_id).collect();
        // copyMessages skips what it cannot copy and reports only the new ids.
        let copied = self
            .with_retry(|| self.bot.copy_messages(to, from, tg_ids.clone()))
            .await?;
        Ok(copied.len())
    }

    async fn send_text(&self, destination: ChatId, text: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .send_message(Self::tg_chat(destination), text.to_string())
        })
        .await?;
        Ok(())
    }

    async fn send_media(&self, destination: ChatId, media: OutgoingMedia) -> Result<()> {
        let chat = Self::tg_chat(destination);
        let file = Self::input_file(&media.source);
        let caption = fit_caption(media.caption);

        match media.kind {
            MediaKind::Photo => {
                self.with_retry(|| {
                    let mut req = self.bot.send_photo(chat, file.clone());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    req
                })
                .await?;
            }
            MediaKind::Video => {
                self.with_retry(|| {
                    let mut req = self.bot.send_video(chat, file.clone());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    req
                })
                .await?;
            }
            MediaKind::Document => {
                self.with_retry(|| {
                    let mut req = self.bot.send_document(chat, file.clone());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    req
                })
                .await?;
            }
            MediaKind::Audio => {
                self.with_retry(|| {
                    let mut req = self.bot.send_audio(chat, file.clone());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    req
                })
                .await?;
            }
            MediaKind::Voice => {
                self.with_retry(|| {
                    let mut req = self.bot.send_voice(chat, file.clone());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    req
                })
                .await?;
            }
            MediaKind::Animation => {
                self.with_retry(|| {
                    let mut req = self.bot.send_animation(chat, file.clone());
                    if let Some(c) = &caption {
                        req = req.caption(c.clone());
                    }
                    req
                })
                .await?;
            }
            MediaKind::Sticker => {
                self.with_retry(|| self.bot.send_sticker(chat, file.clone()))
                    .await?;
            }
            MediaKind::VideoNote => {
                self.with_retry(|| self.bot.send_video_note(chat, file.clone()))
                    .await?;
            }
        }
        Ok(())
    }

    async fn send_group(&self, destination: ChatId, items: Vec<GroupItem>) -> Result<()> {
        let media: Vec<InputMedia> = items
            .into_iter()
            .map(|item| {
                let file = Self::input_file(&item.source);
                let caption = fit_caption(item.caption);
                match item.kind {
                    GroupItemKind::Photo => {
                        let mut m = InputMediaPhoto::new(file);
                        if let Some(c) = caption {
                            m = m.caption(c);
                        }
                        InputMedia::Photo(m)
                    }
                    GroupItemKind::Video => {
                        let mut m = InputMediaVideo::new(file);
                        if let Some(c) = caption {
                            m = m.caption(c);
                        }
                        InputMedia::Video(m)
                    }
                    GroupItemKind::Document => {
                        let mut m = InputMediaDocument::new(file);
                        if let Some(c) = caption {
                            m = m.caption(c);
                        }
                        InputMedia::Document(m)
                    }
                    GroupItemKind::Audio => {
                        let mut m = InputMediaAudio::new(file);
                        if let Some(c) = caption {
                            m = m.caption(c);
                        }
                        InputMedia::Audio(m)
                    }
                }
            })
            .collect();

        self.with_retry(|| {
            self.bot
                .send_media_group(Self::tg_chat(destination), media.clone())
        })
        .await?;
        Ok(())
    }
}
