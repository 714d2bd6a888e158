use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, ChatIdentifier, MessageId},
    message::{GroupItem, OutgoingMedia, RemoteMessage},
    Result,
};

/// Read side of the Telegram client: message lookup and media materialization.
///
/// Implementations report a chat the identity cannot reach as `Error::AccessDenied`.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Batch fetch by id; the result has one slot per requested id, `None` for gaps.
    async fn fetch_messages(
        &self,
        chat: &ChatIdentifier,
        ids: &[MessageId],
    ) -> Result<Vec<Option<RemoteMessage>>>;

    /// Write the media payload of `message` to `dest`.
    async fn download(&self, message: &RemoteMessage, dest: &Path) -> Result<()>;
}

/// Write side of the Telegram client.
#[async_trait]
pub trait RelaySink: Send + Sync {
    /// Server-side copy. `ids` holds one id or the whole album batch.
    ///
    /// Returns how many messages were copied. A batch copy may succeed while skipping
    /// ids the server refuses to copy, so this can be less than `ids.len()`.
    async fn copy_messages(
        &self,
        destination: ChatId,
        source: ChatId,
        ids: &[MessageId],
    ) -> Result<usize>;

    async fn send_text(&self, destination: ChatId, text: &str) -> Result<()>;

    /// Per-kind dispatch (photo, video, document, ...).
    async fn send_media(&self, destination: ChatId, media: OutgoingMedia) -> Result<()>;

    /// Grouped-media (album) dispatch.
    async fn send_group(&self, destination: ChatId, items: Vec<GroupItem>) -> Result<()>;
}
