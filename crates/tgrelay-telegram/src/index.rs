//! Messages the bot has seen, by chat.
//!
//! The Bot API cannot fetch an arbitrary message by id, so lookups are served from what
//! arrived as updates (messages, channel posts, edits). Each chat keeps at most
//! `capacity` messages; the lowest ids are evicted first. Private chats are never stored:
//! no `t.me` link can point into them.

use std::collections::{BTreeMap, HashMap};

use tgrelay_core::{
    domain::{ChatId, ChatIdentifier, MessageId},
    errors::Error,
    message::RemoteMessage,
    Result,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub chats: usize,
    pub messages: usize,
}

#[derive(Debug)]
pub struct MessageIndex {
    capacity: usize,
    chats: HashMap<ChatId, BTreeMap<MessageId, RemoteMessage>>,
    handles: HashMap<String, ChatId>,
}

impl MessageIndex {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            chats: HashMap::new(),
            handles: HashMap::new(),
        }
    }

    /// Store (or replace, for edits) a message; `handle` is the chat's public username.
    /// Returns `false` for messages from private chats, which are not kept.
    pub fn record(&mut self, message: RemoteMessage, handle: Option<&str>) -> bool {
        let chat = message.chat_id;
        // Users have positive ids; groups, supergroups and channels negative ones.
        if chat.0 > 0 {
            return false;
        }
        if let Some(handle) = handle.filter(|h| !h.is_empty()) {
            self.handles.insert(handle.to_ascii_lowercase(), chat);
        }

        let messages = self.chats.entry(chat).or_default();
        messages.insert(message.id, message);
        while messages.len() > self.capacity {
            messages.pop_first();
        }
        true
    }

    pub fn resolve(&self, chat: &ChatIdentifier) -> Option<ChatId> {
        match chat {
            ChatIdentifier::Id(id) => self.chats.contains_key(id).then_some(*id),
            ChatIdentifier::Handle(h) => self.handles.get(&h.to_ascii_lowercase()).copied(),
        }
    }

    /// One slot per requested id. A chat never observed is reported as inaccessible.
    pub fn lookup(
        &self,
        chat: &ChatIdentifier,
        ids: &[MessageId],
    ) -> Result<Vec<Option<RemoteMessage>>> {
        let messages = self
            .resolve(chat)
            .and_then(|id| self.chats.get(&id))
            .ok_or_else(|| Error::AccessDenied(format!("chat {chat} has not been observed")))?;
        Ok(ids.iter().map(|id| messages.get(id).cloned()).collect())
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            chats: self.chats.len(),
            messages: self.chats.values().map(BTreeMap::len).sum(),
        }
    }
}
