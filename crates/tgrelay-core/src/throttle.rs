use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageId},
    message::{GroupItem, OutgoingMedia},
    ports::RelaySink,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two outbound messages.
    pub global_min_interval: Duration,
    /// Minimum spacing between messages into the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_chat_min_interval: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve `slots` consecutive slots; returns how long to wait before the first one.
    fn reserve(&mut self, slots: u32) -> Duration {
        let now = Instant::now();
        let start = self.next.max(now);
        self.next = start + self.interval * slots.max(1);
        start.saturating_duration_since(now)
    }
}

/// [`RelaySink`] decorator spacing outbound calls globally and per destination chat.
///
/// Multi-message calls (batch copies, albums) reserve one slot per message, since the
/// server counts each resulting message against the flood limits.
pub struct ThrottledSink {
    inner: Arc<dyn RelaySink>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<ChatId, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledSink {
    pub fn new(inner: Arc<dyn RelaySink>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_chat(&self, chat: ChatId) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_chat.lock().await;
        map.entry(chat)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_chat_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle(&self, chat: ChatId, messages: usize) {
        let slots = u32::try_from(messages).unwrap_or(u32::MAX);
        let global_wait = self.global.lock().await.reserve(slots);
        let chat_wait = {
            let lim = self.limiter_for_chat(chat).await;
            let mut guard = lim.lock().await;
            guard.reserve(slots)
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait]
impl RelaySink for ThrottledSink {
    async fn copy_messages(
        &self,
        destination: ChatId,
        source: ChatId,
        ids: &[MessageId],
    ) -> Result<usize> {
        self.throttle(destination, ids.len()).await;
        self.inner.copy_messages(destination, source, ids).await
    }

    async fn send_text(&self, destination: ChatId, text: &str) -> Result<()> {
        self.throttle(destination, 1).await;
        self.inner.send_text(destination, text).await
    }

    async fn send_media(&self, destination: ChatId, media: OutgoingMedia) -> Result<()> {
        self.throttle(destination, 1).await;
        self.inner.send_media(destination, media).await
    }

    async fn send_group(&self, destination: ChatId, items: Vec<GroupItem>) -> Result<()> {
        self.throttle(destination, items.len()).await;
        self.inner.send_group(destination, items).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeTelegram, DEST_CHAT, SOURCE_CHAT};

    fn throttled(per_chat_ms: u64) -> (Arc<FakeTelegram>, ThrottledSink) {
        let fake = Arc::new(FakeTelegram::default());
        let sink = ThrottledSink::new(
            fake.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(10),
                per_chat_min_interval: Duration::from_millis(per_chat_ms),
            },
        );
        (fake, sink)
    }

    #[tokio::test(start_paused = true)]
    async fn same_chat_calls_are_spaced() {
        let (fake, sink) = throttled(1000);
        let started = Instant::now();

        for text in ["a", "b", "c"] {
            sink.send_text(DEST_CHAT, text).await.unwrap();
        }

        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(
            fake.sends(),
            vec![
                Call::Text("a".into()),
                Call::Text("b".into()),
                Call::Text("c".into())
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn batch_copy_reserves_a_slot_per_message() {
        let (_fake, sink) = throttled(100);
        let started = Instant::now();

        let ids = [MessageId(1), MessageId(2), MessageId(3)];
        sink.copy_messages(DEST_CHAT, SOURCE_CHAT, &ids).await.unwrap();
        sink.send_text(DEST_CHAT, "after").await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn different_chats_only_share_the_global_spacing() {
        let (_fake, sink) = throttled(1000);
        let started = Instant::now();

        sink.send_text(ChatId(1), "x").await.unwrap();
        sink.send_text(ChatId(2), "y").await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(1000));
    }
}
