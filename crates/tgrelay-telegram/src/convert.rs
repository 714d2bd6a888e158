//! teloxide `Message` to the relay's `RemoteMessage`.

use teloxide::types::Message;

use tgrelay_core::{
    domain::{ChatId, GroupToken, MessageId},
    message::{FileRef, MediaKind, MediaPayload, MessageContent, RemoteMessage},
};

pub fn to_remote(msg: &Message) -> RemoteMessage {
    RemoteMessage {
        id: MessageId(msg.id.0),
        chat_id: ChatId(msg.chat.id.0),
        group: msg.media_group_id().map(|g| GroupToken(g.0.clone())),
        content: content_of(msg),
    }
}

fn content_of(msg: &Message) -> MessageContent {
    if let Some(text) = msg.text() {
        return MessageContent::Text(text.to_string());
    }

    let caption = msg.caption().map(str::to_string);
    let media = |kind: MediaKind, file: &teloxide::types::FileId| MediaPayload {
        kind,
        file: FileRef(file.0.clone()),
        caption: caption.clone(),
        mime_type: None,
        file_name: None,
    };

    // Largest size last.
    if let Some(sizes) = msg.photo() {
        if let Some(best) = sizes.last() {
            return MessageContent::Media(media(MediaKind::Photo, &best.file.id));
        }
    }
    if let Some(a) = msg.animation() {
        let mut m = media(MediaKind::Animation, &a.file.id);
        m.mime_type = a.mime_type.as_ref().map(|t| t.essence_str().to_string());
        m.file_name = a.file_name.clone();
        return MessageContent::Media(m);
    }
    if let Some(v) = msg.video() {
        let mut m = media(MediaKind::Video, &v.file.id);
        m.mime_type = v.mime_type.as_ref().map(|t| t.essence_str().to_string());
        m.file_name = v.file_name.clone();
        return MessageContent::Media(m);
    }
    if let Some(d) = msg.document() {
        let mut m = media(MediaKind::Document, &d.file.id);
        m.mime_type = d.mime_type.as_ref().map(|t| t.essence_str().to_string());
        m.file_name = d.file_name.clone();
        return MessageContent::Media(m);
    }
    if let Some(a) = msg.audio() {
        let mut m = media(MediaKind::Audio, &a.file.id);
        m.mime_type = a.mime_type.as_ref().map(|t| t.essence_str().to_string());
        m.file_name = a.file_name.clone();
        return MessageContent::Media(m);
    }
    if let Some(v) = msg.voice() {
        let mut m = media(MediaKind::Voice, &v.file.id);
        m.mime_type = v.mime_type.as_ref().map(|t| t.essence_str().to_string());
        return MessageContent::Media(m);
    }
    if let Some(s) = msg.sticker() {
        return MessageContent::Media(media(MediaKind::Sticker, &s.file.id));
    }
    if let Some(v) = msg.video_note() {
        return MessageContent::Media(media(MediaKind::VideoNote, &v.file.id));
    }

    let what = if msg.poll().is_some() {
        "poll"
    } else if msg.location().is_some() {
        "location"
    } else if msg.contact().is_some() {
        "contact"
    } else if msg.dice().is_some() {
        "dice"
    } else {
        "service message"
    };
    MessageContent::Unsupported(what.to_string())
}
