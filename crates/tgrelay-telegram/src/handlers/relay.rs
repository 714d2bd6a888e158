use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::{info, warn};

use tgrelay_core::{
    access::RateDecision,
    audit::AuditEvent,
    domain::{ChatId, UserId},
    forward::ForwardOutcome,
};

use crate::router::AppState;

fn write_audit(state: &AppState, event: AuditEvent) {
    if let Err(e) = state.audit.write(event) {
        warn!("audit write failed: {e}");
    }
}

fn partial_notice(count: usize, total: usize) -> String {
    let missing = total.saturating_sub(count);
    let noun = if missing == 1 { "item" } else { "items" };
    format!("Relayed {count} of {total} items. {missing} {noun} could not be sent.")
}

pub async fn handle_link(
    bot: Bot,
    msg: &Message,
    state: Arc<AppState>,
    user_id: UserId,
    username: &str,
    raw_link: &str,
) -> ResponseResult<()> {
    let decision = state.rate_limiter.lock().await.check(user_id);
    if let RateDecision::Limited { retry_after } = decision {
        let secs = retry_after.as_secs_f64();
        write_audit(&state, AuditEvent::rate_limit(user_id.0, username, secs));
        bot.send_message(
            msg.chat.id,
            format!("Rate limited. Please wait {:.1} seconds.", secs),
        )
        .await?;
        return Ok(());
    }

    let _guard = state.chat_locks.lock_chat(ChatId(msg.chat.id.0)).await;
    let status = bot.send_message(msg.chat.id, "Relaying...").await?;

    let destination = ChatId(msg.chat.id.0);
    match state.relay.relay_link(destination, raw_link).await {
        Ok(outcome) => {
            write_audit(
                &state,
                AuditEvent::relay(user_id.0, username, raw_link, &outcome),
            );
            match &outcome {
                ForwardOutcome::Delivered { count, total, tier } if count < total => {
                    warn!(
                        user_id = user_id.0,
                        delivered = count,
                        total,
                        tier = tier.as_str(),
                        "relay request delivered partially"
                    );
                    bot.edit_message_text(msg.chat.id, status.id, partial_notice(*count, *total))
                        .await?;
                }
                ForwardOutcome::Delivered { count, tier, .. } => {
                    info!(
                        user_id = user_id.0,
                        delivered = count,
                        tier = tier.as_str(),
                        "relay request done"
                    );
                    // Best-effort tidy-up: the relayed content is what stays in the chat.
                    let _ = bot.delete_message(msg.chat.id, status.id).await;
                    let _ = bot.delete_message(msg.chat.id, msg.id).await;
                }
                ForwardOutcome::Failed(reason) => {
                    warn!(user_id = user_id.0, reason = %reason, "relay request failed");
                    bot.edit_message_text(
                        msg.chat.id,
                        status.id,
                        format!("Relay failed ({reason})."),
                    )
                    .await?;
                }
            }
        }
        Err(e) => {
            warn!(user_id = user_id.0, "relay request rejected: {e}");
            write_audit(
                &state,
                AuditEvent::rejected(user_id.0, username, raw_link, &e.to_string()),
            );
            bot.edit_message_text(msg.chat.id, status.id, e.user_message())
                .await?;
        }
    }

    Ok(())
}
