//! Relay data model: fetched messages, album sets and outbound payloads.

use std::path::PathBuf;

use crate::domain::{ChatId, GroupToken, MessageId};

/// Media kinds the relay knows how to reproduce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    Sticker,
    Animation,
    VideoNote,
}

impl MediaKind {
    /// Whether the platform accepts a caption for this kind.
    pub fn supports_caption(self) -> bool {
        !matches!(self, MediaKind::Sticker | MediaKind::VideoNote)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
            MediaKind::Voice => "voice",
            MediaKind::Sticker => "sticker",
            MediaKind::Animation => "animation",
            MediaKind::VideoNote => "video_note",
        }
    }

    /// Fallback file extension when neither file name nor MIME type tells us.
    pub fn default_extension(self) -> &'static str {
        match self {
            MediaKind::Photo => "jpg",
            MediaKind::Video | MediaKind::Animation | MediaKind::VideoNote => "mp4",
            MediaKind::Document => "bin",
            MediaKind::Audio => "mp3",
            MediaKind::Voice => "ogg",
            MediaKind::Sticker => "webp",
        }
    }
}

/// Transferable reference to media already stored on the remote service (`file_id`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileRef(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaPayload {
    pub kind: MediaKind,
    pub file: FileRef,
    pub caption: Option<String>,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Media(MediaPayload),
    /// Polls, locations, service messages: nothing the relay can reproduce by hand.
    Unsupported(String),
}

/// A message as fetched from the source chat. Never mutated after fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub group: Option<GroupToken>,
    pub content: MessageContent,
}

impl RemoteMessage {
    pub fn media(&self) -> Option<&MediaPayload> {
        match &self.content {
            MessageContent::Media(m) => Some(m),
            _ => None,
        }
    }

    pub fn caption(&self) -> Option<&str> {
        self.media()
            .and_then(|m| m.caption.as_deref())
            .filter(|c| !c.trim().is_empty())
    }
}

/// Ordered messages of one album, or a single standalone message.
///
/// Invariants: non-empty, ascending by id without duplicates, and every element shares
/// the same group token (or the set is one untokened message).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaGroupSet {
    items: Vec<RemoteMessage>,
}

impl MediaGroupSet {
    pub fn single(message: RemoteMessage) -> Self {
        Self {
            items: vec![message],
        }
    }

    /// Build an album set from the members carrying `token`.
    ///
    /// Foreign-token messages are dropped, the rest sorted and de-duplicated by id.
    /// Returns `None` when nothing matches.
    pub fn from_album(token: &GroupToken, members: Vec<RemoteMessage>) -> Option<Self> {
        let mut items: Vec<RemoteMessage> = members
            .into_iter()
            .filter(|m| m.group.as_ref() == Some(token))
            .collect();
        items.sort_by_key(|m| m.id);
        items.dedup_by_key(|m| m.id);
        if items.is_empty() {
            None
        } else {
            Some(Self { items })
        }
    }

    pub fn items(&self) -> &[RemoteMessage] {
        &self.items
    }

    pub fn first(&self) -> &RemoteMessage {
        &self.items[0]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_album(&self) -> bool {
        self.items.len() > 1
    }

    pub fn ids(&self) -> Vec<MessageId> {
        self.items.iter().map(|m| m.id).collect()
    }

    pub fn source_chat(&self) -> ChatId {
        self.first().chat_id
    }

    /// First non-empty caption in album order; the one that goes on the first item.
    pub fn lead_caption(&self) -> Option<&str> {
        self.items.iter().find_map(|m| m.caption())
    }
}

/// Where outbound media bytes come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaSource {
    Remote(FileRef),
    Local(PathBuf),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMedia {
    pub kind: MediaKind,
    pub source: MediaSource,
    pub caption: Option<String>,
}

/// Kinds allowed inside one grouped-media call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupItemKind {
    Photo,
    Video,
    Document,
    Audio,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupItem {
    pub kind: GroupItemKind,
    pub source: MediaSource,
    pub caption: Option<String>,
}

/// Bot API limit for media captions, in characters.
pub const CAPTION_LIMIT: usize = 1024;
/// Bot API limit for text messages, in characters.
pub const TEXT_LIMIT: usize = 4096;

const SEPARATOR: &str = "\n\n";

/// Join a caption and the annotation with a blank line, skipping empty parts.
pub fn join_caption(caption: Option<&str>, annotation: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [caption, annotation]
        .into_iter()
        .flatten()
        .filter(|s| !s.trim().is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(SEPARATOR))
    }
}

/// [`join_caption`] bounded to `limit` characters. The caption is cut first; the
/// annotation is only shortened when it alone does not fit.
pub fn join_caption_within(
    caption: Option<&str>,
    annotation: Option<&str>,
    limit: usize,
) -> Option<String> {
    let joined = join_caption(caption, annotation)?;
    if joined.chars().count() <= limit {
        return Some(joined);
    }
    let Some(note) = annotation.filter(|s| !s.trim().is_empty()) else {
        return Some(truncate_chars(&joined, limit));
    };

    let room = limit.saturating_sub(note.chars().count() + SEPARATOR.len());
    let head = caption.map(|c| truncate_chars(c, room));
    let note = truncate_chars(note, limit);
    join_caption(head.as_deref(), Some(note.as_str()))
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
