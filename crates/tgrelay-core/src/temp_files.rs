//! Scoped local copies of remote media.
//!
//! A [`DownloadedAsset`] owns its file and deletes it on drop, so every exit path of the
//! scope that holds it (normal return, error, dropped future) releases the file.

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use tracing::{debug, warn};

use crate::{
    errors::Error,
    message::{MediaKind, MediaPayload, MediaSource, RemoteMessage},
    ports::MessageSource,
    Result,
};

static ASSET_COUNTER: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug)]
pub struct DownloadedAsset {
    path: PathBuf,
    kind: MediaKind,
}

impl DownloadedAsset {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn source(&self) -> MediaSource {
        MediaSource::Local(self.path.clone())
    }
}

impl Drop for DownloadedAsset {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "temp file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "failed to remove temp file: {e}"),
        }
    }
}

#[derive(Clone)]
pub struct TempFileManager {
    source: Arc<dyn MessageSource>,
    dir: PathBuf,
}

impl TempFileManager {
    pub fn new(source: Arc<dyn MessageSource>, dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download the media of `message` into a fresh temp file.
    ///
    /// Fails with `Error::DownloadFailed` when the message has no media or the client
    /// produced nothing; a partially written file is removed in that case.
    pub async fn acquire(&self, message: &RemoteMessage) -> Result<DownloadedAsset> {
        let media = message.media().ok_or_else(|| {
            Error::DownloadFailed(format!("message {} has no media payload", message.id.0))
        })?;

        tokio::fs::create_dir_all(&self.dir).await?;

        // Guard exists before the download starts: cancellation mid-transfer still cleans up.
        let asset = DownloadedAsset {
            path: self.dir.join(temp_file_name(message, media)),
            kind: media.kind,
        };

        if let Err(e) = self.source.download(message, &asset.path).await {
            return Err(Error::DownloadFailed(e.to_string()));
        }
        if tokio::fs::metadata(&asset.path).await.is_err() {
            return Err(Error::DownloadFailed(format!(
                "remote returned no payload for message {}",
                message.id.0
            )));
        }

        debug!(
            message_id = message.id.0,
            kind = media.kind.as_str(),
            path = %asset.path.display(),
            "media downloaded"
        );
        Ok(asset)
    }

    /// Run `f` with a local copy of the message media; the file is gone when this returns.
    pub async fn with_download<F, Fut, T>(&self, message: &RemoteMessage, f: F) -> Result<T>
    where
        F: FnOnce(MediaSource, MediaKind) -> Fut,
        Fut: Future<Output = T>,
    {
        let asset = self.acquire(message).await?;
        let out = f(asset.source(), asset.kind()).await;
        drop(asset);
        Ok(out)
    }
}

fn temp_file_name(message: &RemoteMessage, media: &MediaPayload) -> String {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let n = ASSET_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!(
        "relay_{}_{}_{millis}_{n}.{}",
        message.chat_id.0.unsigned_abs(),
        message.id.0,
        extension_for(media)
    )
}

fn extension_for(media: &MediaPayload) -> String {
    let from_name = media
        .file_name
        .as_deref()
        .and_then(|n| n.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 8 && ext.bytes().all(|b| b.is_ascii_alphanumeric())
        });
    if let Some(ext) = from_name {
        return ext;
    }

    let from_mime = media.mime_type.as_deref().and_then(|m| match m {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "video/mp4" => Some("mp4"),
        "video/webm" => Some("webm"),
        "video/quicktime" => Some("mov"),
        "audio/mpeg" => Some("mp3"),
        "audio/ogg" => Some("ogg"),
        "audio/mp4" => Some("m4a"),
        "application/pdf" => Some("pdf"),
        "application/zip" => Some("zip"),
        _ => None,
    });

    from_mime
        .unwrap_or_else(|| media.kind.default_extension())
        .to_string()
}
