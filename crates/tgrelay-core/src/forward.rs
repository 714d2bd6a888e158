//! Cascading delivery of a resolved message set.
//!
//! Tiers, cheapest first, each attempted at most once per delivery:
//! 1. native server-side copy,
//! 2. re-send by the existing file references,
//! 3. download and re-upload from local files,
//! 4. (albums only) items one by one through tiers 1-3 with a fixed pause between them.
//!
//! A tier either delivers, falls through with a reason, or does not apply. Nothing reaches
//! the destination from a tier that falls through, so the next tier never duplicates
//! content for the same unit.

use std::{fmt, sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    domain::ChatId,
    errors::Error,
    message::{
        join_caption, join_caption_within, GroupItem, GroupItemKind, MediaGroupSet, MediaKind,
        MediaPayload, MediaSource, MessageContent, OutgoingMedia, RemoteMessage, CAPTION_LIMIT,
        TEXT_LIMIT,
    },
    ports::RelaySink,
    temp_files::{DownloadedAsset, TempFileManager},
};

/// Pause between items in the per-item tier.
pub const DEFAULT_ITEM_DELAY: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    NativeCopy,
    ReferenceResend,
    Reupload,
    PerItem,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::NativeCopy => "native_copy",
            Tier::ReferenceResend => "reference_resend",
            Tier::Reupload => "reupload",
            Tier::PerItem => "per_item",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    PermissionDenied,
    EmptyResult,
    UnsupportedKind,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Transport => "transport error",
            FailureKind::PermissionDenied => "permission denied",
            FailureKind::EmptyResult => "empty result set",
            FailureKind::UnsupportedKind => "unsupported payload kind",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub detail: String,
}

impl FailureReason {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn from_error(err: &Error) -> Self {
        let kind = if err.is_access_denied() {
            FailureKind::PermissionDenied
        } else {
            FailureKind::Transport
        };
        Self::new(kind, err.to_string())
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.detail)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// `count` of the `total` items in the set reached the destination.
    Delivered {
        count: usize,
        total: usize,
        tier: Tier,
    },
    Failed(FailureReason),
}

impl ForwardOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ForwardOutcome::Delivered { .. })
    }

    /// Delivered, but some items of the set are missing.
    pub fn is_partial(&self) -> bool {
        matches!(self, ForwardOutcome::Delivered { count, total, .. } if count < total)
    }

    pub fn delivered_count(&self) -> usize {
        match self {
            ForwardOutcome::Delivered { count, .. } => *count,
            ForwardOutcome::Failed(_) => 0,
        }
    }
}

/// Result of one tier.
#[derive(Debug)]
enum Attempt {
    Delivered(usize),
    Fallthrough(FailureReason),
    /// The tier has nothing to offer for this set (e.g. text in the download tier).
    NotApplicable,
}

#[derive(Clone, Copy, Debug)]
pub struct ForwardConfig {
    pub item_delay: Duration,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            item_delay: DEFAULT_ITEM_DELAY,
        }
    }
}

#[derive(Clone)]
pub struct ForwardEngine {
    sink: Arc<dyn RelaySink>,
    temp: TempFileManager,
    cfg: ForwardConfig,
}

impl ForwardEngine {
    pub fn new(sink: Arc<dyn RelaySink>, temp: TempFileManager, cfg: ForwardConfig) -> Self {
        Self { sink, temp, cfg }
    }

    /// Deliver `set` into `destination`, attaching `annotation` once, to the first item.
    pub async fn deliver(
        &self,
        destination: ChatId,
        set: &MediaGroupSet,
        annotation: Option<&str>,
    ) -> ForwardOutcome {
        let mut last = match self.run_direct(destination, set, annotation).await {
            Ok((count, tier)) => return delivered(set, count, tier),
            Err(reason) => Some(reason),
        };

        if set.is_album() {
            let attempt = self.per_item(destination, set, annotation).await;
            if let Some(count) = settle(Tier::PerItem, attempt, &mut last) {
                return delivered(set, count, Tier::PerItem);
            }
        }

        let reason = last.unwrap_or_else(|| {
            FailureReason::new(FailureKind::EmptyResult, "no delivery tier applied")
        });
        warn!(
            source_chat = set.source_chat().0,
            first_id = set.first().id.0,
            items = set.len(),
            reason = %reason,
            "relay failed after all tiers"
        );
        ForwardOutcome::Failed(reason)
    }

    /// Tiers 1-3 in order.
    async fn run_direct(
        &self,
        destination: ChatId,
        set: &MediaGroupSet,
        annotation: Option<&str>,
    ) -> Result<(usize, Tier), FailureReason> {
        let mut last = None;

        let attempt = self.native_copy(destination, set, annotation).await;
        if let Some(n) = settle(Tier::NativeCopy, attempt, &mut last) {
            return Ok((n, Tier::NativeCopy));
        }

        let attempt = self.reference_resend(destination, set, annotation).await;
        if let Some(n) = settle(Tier::ReferenceResend, attempt, &mut last) {
            return Ok((n, Tier::ReferenceResend));
        }

        let attempt = self.reupload(destination, set, annotation).await;
        if let Some(n) = settle(Tier::Reupload, attempt, &mut last) {
            return Ok((n, Tier::Reupload));
        }

        Err(last.unwrap_or_else(|| {
            FailureReason::new(FailureKind::UnsupportedKind, "no direct tier applied")
        }))
    }

    // ============== Tier 1: native copy ==============

    async fn native_copy(
        &self,
        destination: ChatId,
        set: &MediaGroupSet,
        annotation: Option<&str>,
    ) -> Attempt {
        let ids = set.ids();
        let copied = match self
            .sink
            .copy_messages(destination, set.source_chat(), &ids)
            .await
        {
            Ok(copied) => copied.min(ids.len()),
            Err(e) => return Attempt::Fallthrough(FailureReason::from_error(&e)),
        };
        if copied == 0 {
            return Attempt::Fallthrough(FailureReason::new(
                FailureKind::EmptyResult,
                format!("server copied none of {} messages", ids.len()),
            ));
        }
        // Copied items are already in the destination; later tiers would duplicate them.
        if copied < ids.len() {
            warn!(
                source_chat = set.source_chat().0,
                copied,
                requested = ids.len(),
                "batch copy skipped messages"
            );
        }
        self.send_annotation(destination, annotation).await;
        Attempt::Delivered(copied)
    }

    // ============== Tier 2: re-send by reference ==============

    async fn reference_resend(
        &self,
        destination: ChatId,
        set: &MediaGroupSet,
        annotation: Option<&str>,
    ) -> Attempt {
        if !set.is_album() {
            let msg = set.first();
            return match &msg.content {
                MessageContent::Text(text) => {
                    let joined = join_caption(Some(text.as_str()), annotation).unwrap_or_default();
                    let (body, trailing) = if joined.chars().count() <= TEXT_LIMIT {
                        (joined, None)
                    } else {
                        (text.clone(), annotation)
                    };
                    match self.sink.send_text(destination, &body).await {
                        Ok(()) => {
                            self.send_annotation(destination, trailing).await;
                            Attempt::Delivered(1)
                        }
                        Err(e) => Attempt::Fallthrough(FailureReason::from_error(&e)),
                    }
                }
                MessageContent::Media(media) => {
                    let source = MediaSource::Remote(media.file.clone());
                    self.send_one(destination, media, source, annotation).await
                }
                MessageContent::Unsupported(what) => Attempt::Fallthrough(FailureReason::new(
                    FailureKind::UnsupportedKind,
                    format!("message {} is a {what}", msg.id.0),
                )),
            };
        }

        let plan = match plan_group(set) {
            Ok(plan) => plan,
            Err(reason) => return Attempt::Fallthrough(reason),
        };
        let caption = join_caption_within(set.lead_caption(), annotation, CAPTION_LIMIT);
        let sources = plan
            .iter()
            .map(|(_, media)| MediaSource::Remote(media.file.clone()))
            .collect();
        let items = build_group(&plan, sources, caption);
        self.send_group(destination, items).await
    }

    // ============== Tier 3: download and re-upload ==============

    async fn reupload(
        &self,
        destination: ChatId,
        set: &MediaGroupSet,
        annotation: Option<&str>,
    ) -> Attempt {
        if !set.is_album() {
            let msg = set.first();
            let Some(media) = msg.media() else {
                return Attempt::NotApplicable;
            };
            let sent = self
                .temp
                .with_download(msg, |source, _kind| {
                    self.send_one(destination, media, source, annotation)
                })
                .await;
            return match sent {
                Ok(attempt) => attempt,
                Err(e) => Attempt::Fallthrough(FailureReason::from_error(&e)),
            };
        }

        // Grouping was already rejected by tier 2; downloading would not change that.
        let Ok(plan) = plan_group(set) else {
            return Attempt::NotApplicable;
        };

        let assets = match self.download_all(set).await {
            Ok(assets) => assets,
            Err(reason) => return Attempt::Fallthrough(reason),
        };
        let caption = join_caption_within(set.lead_caption(), annotation, CAPTION_LIMIT);
        let sources = assets.iter().map(DownloadedAsset::source).collect();
        let items = build_group(&plan, sources, caption);
        let attempt = self.send_group(destination, items).await;
        drop(assets);
        attempt
    }

    /// Download every album item. Any failure releases what was already fetched.
    async fn download_all(
        &self,
        set: &MediaGroupSet,
    ) -> Result<Vec<DownloadedAsset>, FailureReason> {
        let mut assets = Vec::with_capacity(set.len());
        for msg in set.items() {
            match self.temp.acquire(msg).await {
                Ok(asset) => assets.push(asset),
                Err(e) => {
                    let kind = if assets.is_empty() {
                        FailureKind::EmptyResult
                    } else {
                        FailureKind::Transport
                    };
                    return Err(FailureReason::new(
                        kind,
                        format!("downloaded {}/{}: {e}", assets.len(), set.len()),
                    ));
                }
            }
        }
        Ok(assets)
    }

    // ============== Tier 4: item by item ==============

    async fn per_item(
        &self,
        destination: ChatId,
        set: &MediaGroupSet,
        annotation: Option<&str>,
    ) -> Attempt {
        let total = set.len();
        let mut delivered = 0usize;
        let mut last = None;

        for (i, msg) in set.items().iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.cfg.item_delay).await;
            }
            let single = MediaGroupSet::single(msg.clone());
            let note = if i == 0 { annotation } else { None };
            match self.run_direct(destination, &single, note).await {
                Ok((_, tier)) => {
                    delivered += 1;
                    debug!(
                        message_id = msg.id.0,
                        tier = tier.as_str(),
                        "album item {}/{total} relayed",
                        i + 1
                    );
                }
                Err(reason) => {
                    warn!(
                        message_id = msg.id.0,
                        reason = %reason,
                        "album item {}/{total} failed",
                        i + 1
                    );
                    last = Some(reason);
                }
            }
        }

        if delivered > 0 {
            if let Some(reason) = last.filter(|_| delivered < total) {
                warn!(delivered, total, reason = %reason, "album relayed partially");
            }
            Attempt::Delivered(delivered)
        } else {
            Attempt::Fallthrough(last.unwrap_or_else(|| {
                FailureReason::new(FailureKind::EmptyResult, "album had no items")
            }))
        }
    }

    // ============== Shared dispatch ==============

    /// Send one media payload, caption plus annotation where the kind takes a caption,
    /// otherwise the annotation follows as its own text message.
    async fn send_one(
        &self,
        destination: ChatId,
        media: &MediaPayload,
        source: MediaSource,
        annotation: Option<&str>,
    ) -> Attempt {
        let caption = if media.kind.supports_caption() {
            join_caption_within(media.caption.as_deref(), annotation, CAPTION_LIMIT)
        } else {
            None
        };
        let out = OutgoingMedia {
            kind: media.kind,
            source,
            caption,
        };
        if let Err(e) = self.sink.send_media(destination, out).await {
            return Attempt::Fallthrough(FailureReason::from_error(&e));
        }
        if !media.kind.supports_caption() {
            self.send_annotation(destination, annotation).await;
        }
        Attempt::Delivered(1)
    }

    async fn send_group(&self, destination: ChatId, items: Vec<GroupItem>) -> Attempt {
        let count = items.len();
        match self.sink.send_group(destination, items).await {
            Ok(()) => Attempt::Delivered(count),
            Err(e) => Attempt::Fallthrough(FailureReason::from_error(&e)),
        }
    }

    /// The content is already delivered at this point; a lost annotation is only logged.
    async fn send_annotation(&self, destination: ChatId, annotation: Option<&str>) {
        let Some(text) = annotation.filter(|t| !t.trim().is_empty()) else {
            return;
        };
        if let Err(e) = self.sink.send_text(destination, text).await {
            warn!(destination = destination.0, "annotation follow-up failed: {e}");
        }
    }
}

fn delivered(set: &MediaGroupSet, count: usize, tier: Tier) -> ForwardOutcome {
    info!(
        source_chat = set.source_chat().0,
        first_id = set.first().id.0,
        items = set.len(),
        delivered = count,
        tier = tier.as_str(),
        "relay delivered"
    );
    ForwardOutcome::Delivered {
        count,
        total: set.len(),
        tier,
    }
}

/// Record a fall-through reason; `Some(count)` when the tier delivered.
fn settle(tier: Tier, attempt: Attempt, last: &mut Option<FailureReason>) -> Option<usize> {
    match attempt {
        Attempt::Delivered(n) => Some(n),
        Attempt::Fallthrough(reason) => {
            debug!(tier = tier.as_str(), reason = %reason, "tier fell through");
            *last = Some(reason);
            None
        }
        Attempt::NotApplicable => {
            debug!(tier = tier.as_str(), "tier not applicable");
            None
        }
    }
}

/// Kind a payload takes inside a grouped-media call.
///
/// Documents with an image or video MIME type render inline, so they become photo or
/// video items.
pub fn group_item_kind(media: &MediaPayload) -> Option<GroupItemKind> {
    match media.kind {
        MediaKind::Photo => Some(GroupItemKind::Photo),
        MediaKind::Video => Some(GroupItemKind::Video),
        MediaKind::Audio => Some(GroupItemKind::Audio),
        MediaKind::Document => {
            let mime = media.mime_type.as_deref().unwrap_or_default();
            if mime.starts_with("image/") {
                Some(GroupItemKind::Photo)
            } else if mime.starts_with("video/") {
                Some(GroupItemKind::Video)
            } else {
                Some(GroupItemKind::Document)
            }
        }
        MediaKind::Voice | MediaKind::Sticker | MediaKind::Animation | MediaKind::VideoNote => {
            None
        }
    }
}

/// Audio groups only with audio, documents only with documents; photos and videos mix.
fn check_group_mix(kinds: &[GroupItemKind]) -> Result<(), String> {
    let has = |k: GroupItemKind| kinds.contains(&k);
    let visual = has(GroupItemKind::Photo) || has(GroupItemKind::Video);
    let audio = has(GroupItemKind::Audio);
    let document = has(GroupItemKind::Document);

    if audio && (visual || document) {
        return Err("audio cannot share an album with other kinds".to_string());
    }
    if document && visual {
        return Err("documents cannot share an album with photos or videos".to_string());
    }
    Ok(())
}

fn plan_group(
    set: &MediaGroupSet,
) -> Result<Vec<(GroupItemKind, &MediaPayload)>, FailureReason> {
    let mut plan = Vec::with_capacity(set.len());
    for msg in set.items() {
        let media = msg.media().ok_or_else(|| unsupported_in_group(msg))?;
        let kind = group_item_kind(media).ok_or_else(|| unsupported_in_group(msg))?;
        plan.push((kind, media));
    }
    let kinds: Vec<GroupItemKind> = plan.iter().map(|(k, _)| *k).collect();
    check_group_mix(&kinds).map_err(|e| FailureReason::new(FailureKind::UnsupportedKind, e))?;
    Ok(plan)
}

fn unsupported_in_group(msg: &RemoteMessage) -> FailureReason {
    let what = match &msg.content {
        MessageContent::Media(m) => m.kind.as_str().to_string(),
        MessageContent::Text(_) => "text".to_string(),
        MessageContent::Unsupported(w) => w.clone(),
    };
    FailureReason::new(
        FailureKind::UnsupportedKind,
        format!("message {} ({what}) cannot be part of a media group", msg.id.0),
    )
}

/// Pair planned kinds with their sources; the caption goes on the first item only.
fn build_group(
    plan: &[(GroupItemKind, &MediaPayload)],
    sources: Vec<MediaSource>,
    caption: Option<String>,
) -> Vec<GroupItem> {
    let mut caption = caption;
    plan.iter()
        .zip(sources)
        .map(|((kind, _), source)| GroupItem {
            kind: *kind,
            source,
            caption: caption.take(),
        })
        .collect()
}
