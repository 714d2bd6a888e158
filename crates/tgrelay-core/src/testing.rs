//! In-memory fake of the Telegram client ports, shared by the core test modules.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, ChatIdentifier, GroupToken, MessageId},
    errors::Error,
    message::{
        FileRef, GroupItem, GroupItemKind, MediaKind, MediaPayload, MediaSource, MessageContent,
        OutgoingMedia, RemoteMessage,
    },
    ports::{MessageSource, RelaySink},
    Result,
};

pub const SOURCE_CHAT: ChatId = ChatId(-100777);
pub const DEST_CHAT: ChatId = ChatId(42);

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(1);

pub fn temp_dir(name: &str) -> PathBuf {
    let n = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    PathBuf::from(format!(
        "/tmp/tgrelay-test-{name}-{}-{n}",
        std::process::id()
    ))
}

pub fn media_msg(
    id: i32,
    kind: MediaKind,
    group: Option<&str>,
    caption: Option<&str>,
) -> RemoteMessage {
    RemoteMessage {
        id: MessageId(id),
        chat_id: SOURCE_CHAT,
        group: group.map(|g| GroupToken(g.to_string())),
        content: MessageContent::Media(MediaPayload {
            kind,
            file: FileRef(format!("file-{id}")),
            caption: caption.map(|c| c.to_string()),
            mime_type: None,
            file_name: None,
        }),
    }
}

pub fn photo_msg(id: i32, group: Option<&str>) -> RemoteMessage {
    media_msg(id, MediaKind::Photo, group, None)
}

pub fn doc_msg(
    id: i32,
    group: Option<&str>,
    mime: Option<&str>,
    name: Option<&str>,
) -> RemoteMessage {
    let mut msg = media_msg(id, MediaKind::Document, group, None);
    if let MessageContent::Media(m) = &mut msg.content {
        m.mime_type = mime.map(|s| s.to_string());
        m.file_name = name.map(|s| s.to_string());
    }
    msg
}

pub fn text_msg(id: i32, text: &str) -> RemoteMessage {
    RemoteMessage {
        id: MessageId(id),
        chat_id: SOURCE_CHAT,
        group: None,
        content: MessageContent::Text(text.to_string()),
    }
}

/// One observed client call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Fetch(Vec<MessageId>),
    Download(MessageId),
    Copy {
        destination: ChatId,
        source: ChatId,
        ids: Vec<MessageId>,
    },
    Text(String),
    Media {
        kind: MediaKind,
        file: String,
        local: bool,
        caption: Option<String>,
    },
    Group(Vec<SentItem>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentItem {
    pub kind: GroupItemKind,
    pub file: String,
    pub local: bool,
    pub caption: Option<String>,
}

impl Call {
    pub fn is_send(&self) -> bool {
        !matches!(self, Call::Fetch(_) | Call::Download(_))
    }
}

#[derive(Default)]
struct Failures {
    access_denied: bool,
    fetch_transport: bool,
    copy: bool,
    text: bool,
    remote_sends: bool,
    local_sends: bool,
    groups: bool,
    downloads: HashSet<MessageId>,
    poisoned: HashSet<String>,
    /// Ids a batch copy skips without failing the call.
    uncopyable: HashSet<MessageId>,
}

#[derive(Default)]
pub struct FakeTelegram {
    chats: Mutex<HashMap<ChatId, Vec<RemoteMessage>>>,
    handles: Mutex<HashMap<String, ChatId>>,
    failures: Mutex<Failures>,
    calls: Mutex<Vec<Call>>,
    downloads: Mutex<Vec<PathBuf>>,
}

impl FakeTelegram {
    pub fn with_chat(self, chat: ChatId, handle: Option<&str>, msgs: Vec<RemoteMessage>) -> Self {
        if let Some(h) = handle {
            self.handles.lock().unwrap().insert(h.to_string(), chat);
        }
        self.chats.lock().unwrap().insert(chat, msgs);
        self
    }

    pub fn deny_access(&self) {
        self.failures.lock().unwrap().access_denied = true;
    }

    pub fn fail_fetch(&self) {
        self.failures.lock().unwrap().fetch_transport = true;
    }

    pub fn fail_copy(&self) {
        self.failures.lock().unwrap().copy = true;
    }

    pub fn fail_text(&self) {
        self.failures.lock().unwrap().text = true;
    }

    pub fn fail_remote_sends(&self) {
        self.failures.lock().unwrap().remote_sends = true;
    }

    pub fn fail_local_sends(&self) {
        self.failures.lock().unwrap().local_sends = true;
    }

    pub fn fail_groups(&self) {
        self.failures.lock().unwrap().groups = true;
    }

    pub fn fail_download(&self, id: MessageId) {
        self.failures.lock().unwrap().downloads.insert(id);
    }

    /// Batch copies silently leave this id out, as the server does for protected content.
    pub fn skip_on_copy(&self, id: MessageId) {
        self.failures.lock().unwrap().uncopyable.insert(id);
    }

    /// Every send carrying this file fails, whether by reference or re-uploaded.
    pub fn poison(&self, file: &str) {
        self.failures
            .lock()
            .unwrap()
            .poisoned
            .insert(file.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sends(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_send).collect()
    }

    pub fn downloads(&self) -> Vec<PathBuf> {
        self.downloads.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn resolve(&self, chat: &ChatIdentifier) -> Result<ChatId> {
        match chat {
            ChatIdentifier::Id(id) => Ok(*id),
            ChatIdentifier::Handle(h) => self
                .handles
                .lock()
                .unwrap()
                .get(h)
                .copied()
                .ok_or_else(|| Error::AccessDenied(format!("unknown handle {h}"))),
        }
    }

    fn file_of(source: &MediaSource) -> (String, bool) {
        match source {
            MediaSource::Remote(f) => (f.0.clone(), false),
            MediaSource::Local(p) => (std::fs::read_to_string(p).unwrap_or_default(), true),
        }
    }

    fn should_fail(&self, file: &str, local: bool) -> bool {
        let f = self.failures.lock().unwrap();
        f.poisoned.contains(file) || (local && f.local_sends) || (!local && f.remote_sends)
    }
}

#[async_trait]
impl MessageSource for FakeTelegram {
    async fn fetch_messages(
        &self,
        chat: &ChatIdentifier,
        ids: &[MessageId],
    ) -> Result<Vec<Option<RemoteMessage>>> {
        self.record(Call::Fetch(ids.to_vec()));
        {
            let f = self.failures.lock().unwrap();
            if f.access_denied {
                return Err(Error::AccessDenied("CHANNEL_PRIVATE".to_string()));
            }
            if f.fetch_transport {
                return Err(Error::External("connection reset".to_string()));
            }
        }
        let chat_id = self.resolve(chat)?;
        let chats = self.chats.lock().unwrap();
        let msgs = chats
            .get(&chat_id)
            .ok_or_else(|| Error::AccessDenied(format!("chat {} not visible", chat_id.0)))?;
        // Reverse order on purpose: callers must not rely on fetch order.
        let mut out: Vec<Option<RemoteMessage>> = ids
            .iter()
            .map(|id| msgs.iter().find(|m| m.id == *id).cloned())
            .collect();
        if ids.len() > 1 {
            out.reverse();
        }
        Ok(out)
    }

    async fn download(&self, message: &RemoteMessage, dest: &Path) -> Result<()> {
        self.record(Call::Download(message.id));
        self.downloads.lock().unwrap().push(dest.to_path_buf());
        let file = message
            .media()
            .map(|m| m.file.0.clone())
            .unwrap_or_default();
        if self.failures.lock().unwrap().downloads.contains(&message.id) {
            std::fs::write(dest, "partial")?;
            return Err(Error::External("FILE_REFERENCE_EXPIRED".to_string()));
        }
        std::fs::write(dest, file)?;
        Ok(())
    }
}

#[async_trait]
impl RelaySink for FakeTelegram {
    async fn copy_messages(
        &self,
        destination: ChatId,
        source: ChatId,
        ids: &[MessageId],
    ) -> Result<usize> {
        self.record(Call::Copy {
            destination,
            source,
            ids: ids.to_vec(),
        });
        let f = self.failures.lock().unwrap();
        if f.copy {
            return Err(Error::AccessDenied("copy not allowed".to_string()));
        }
        Ok(ids.iter().filter(|id| !f.uncopyable.contains(*id)).count())
    }

    async fn send_text(&self, _destination: ChatId, text: &str) -> Result<()> {
        self.record(Call::Text(text.to_string()));
        if self.failures.lock().unwrap().text {
            return Err(Error::External("text rejected".to_string()));
        }
        Ok(())
    }

    async fn send_media(&self, _destination: ChatId, media: OutgoingMedia) -> Result<()> {
        let (file, local) = Self::file_of(&media.source);
        self.record(Call::Media {
            kind: media.kind,
            file: file.clone(),
            local,
            caption: media.caption,
        });
        if self.should_fail(&file, local) {
            return Err(Error::External(format!("send of {file} rejected")));
        }
        Ok(())
    }

    async fn send_group(&self, _destination: ChatId, items: Vec<GroupItem>) -> Result<()> {
        let sent: Vec<SentItem> = items
            .iter()
            .map(|i| {
                let (file, local) = Self::file_of(&i.source);
                SentItem {
                    kind: i.kind,
                    file,
                    local,
                    caption: i.caption.clone(),
                }
            })
            .collect();
        let groups_fail = self.failures.lock().unwrap().groups;
        let fail = groups_fail || sent.iter().any(|s| self.should_fail(&s.file, s.local));
        self.record(Call::Group(sent));
        if fail {
            return Err(Error::External("media group rejected".to_string()));
        }
        Ok(())
    }
}
