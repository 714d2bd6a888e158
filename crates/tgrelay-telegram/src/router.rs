use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

use tgrelay_core::{
    access::RateLimiter,
    audit::AuditLogger,
    config::Config,
    domain::ChatId,
    ports::RelaySink,
    relay::Relay,
    throttle::{ThrottleConfig, ThrottledSink},
};

use crate::handlers;
use crate::TelegramRelay;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub telegram: Arc<TelegramRelay>,
    pub relay: Arc<Relay>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
    pub chat_locks: Arc<ChatLocks>,
    pub audit: Arc<AuditLogger>,
}

/// One lock per chat: relays requested from the same chat run one at a time.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<ChatId, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: ChatId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub fn build_state(cfg: Arc<Config>, bot: Bot) -> Arc<AppState> {
    let telegram = Arc::new(TelegramRelay::new(bot, cfg.index_capacity));

    // Flood control spaces outbound relay traffic; one RetryAfter is still honoured by
    // the adapter itself.
    let sink: Arc<dyn RelaySink> = Arc::new(ThrottledSink::new(
        telegram.clone(),
        ThrottleConfig {
            global_min_interval: cfg.send_interval,
            per_chat_min_interval: cfg.chat_send_interval,
        },
    ));
    let relay = Arc::new(Relay::new(telegram.clone(), sink, &cfg.relay()));

    Arc::new(AppState {
        cfg: cfg.clone(),
        telegram,
        relay,
        rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
            cfg.rate_limit_enabled,
            cfg.rate_limit_requests,
            cfg.rate_limit_window,
        ))),
        chat_locks: Arc::new(ChatLocks::default()),
        audit: Arc::new(AuditLogger::new(
            cfg.audit_log_path.clone(),
            cfg.audit_log_json,
        )),
    })
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let me = bot.get_me().await?;
    info!(bot = %me.username(), "relay bot started");
    info!(
        allowed_users = cfg.telegram_allowed_users.len(),
        temp_dir = %cfg.temp_dir.display(),
        album_window = cfg.album_window,
        "configuration loaded"
    );

    let state = build_state(cfg, bot.clone());

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_edited_message().endpoint(handlers::observe))
        .branch(Update::filter_channel_post().endpoint(handlers::observe))
        .branch(Update::filter_edited_channel_post().endpoint(handlers::observe));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
