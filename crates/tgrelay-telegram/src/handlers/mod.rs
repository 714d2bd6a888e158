//! Telegram update handlers.
//!
//! Group and channel traffic (messages, posts, edits) is only indexed, so later links to
//! it resolve. Private messages are commands or relay requests and are never indexed.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::{debug, warn};

use tgrelay_core::{access::is_authorized, audit::AuditEvent, domain::UserId, link};

use crate::router::AppState;

mod commands;
mod relay;

const USAGE_HINT: &str = "Send me a message link, e.g. https://t.me/channel/123 \
or https://t.me/c/1234567890/45, and I'll copy it here. /help for details.";

/// Index-only endpoint for edits and channel posts.
pub async fn observe(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    state.telegram.observe(&msg).await;
    Ok(())
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    // Groups and channels the bot sits in only feed the index.
    if !msg.chat.is_private() {
        state.telegram.observe(&msg).await;
        return Ok(());
    }

    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let user_id = UserId(user.id.0 as i64);
    let username = user
        .username
        .clone()
        .unwrap_or_else(|| "unknown".to_string());

    if !is_authorized(Some(user_id), &state.cfg.telegram_allowed_users) {
        if let Err(e) = state
            .audit
            .write(AuditEvent::auth(user_id.0, &username, false))
        {
            warn!("audit write failed: {e}");
        }
        bot.send_message(
            msg.chat.id,
            "Unauthorized. Contact the bot owner for access.",
        )
        .await?;
        return Ok(());
    }

    let Some(text) = msg.text() else {
        debug!(chat = msg.chat.id.0, "non-text private message ignored");
        bot.send_message(msg.chat.id, USAGE_HINT).await?;
        return Ok(());
    };

    if text.starts_with('/') {
        return commands::handle_command(bot, &msg, state).await;
    }

    match link::find_link(text) {
        Some(raw) => relay::handle_link(bot, &msg, state, user_id, &username, raw).await,
        None => {
            bot.send_message(msg.chat.id, USAGE_HINT).await?;
            Ok(())
        }
    }
}
