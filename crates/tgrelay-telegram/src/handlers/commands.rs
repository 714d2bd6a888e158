use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use crate::router::AppState;

/// Splits `/cmd@botname arg` into `("cmd", "arg")`.
fn parse_command(text: &str) -> (String, String) {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn help_text(state: &AppState) -> String {
    let annotate = if state.cfg.annotate {
        "Relayed content ends with a link back to its source."
    } else {
        "Source back-links are turned off."
    };
    format!(
        "Message relay bot\n\n\
Send a message link and I'll copy that message (or its whole album) into this chat.\n\n\
Accepted links:\n\
  https://t.me/<channel>/<id>\n\
  https://t.me/c/<internal id>/<id>\n\
  t.me/... without the scheme works too\n\n\
I can only relay from chats I'm in (add me as an admin to a channel) and only \
messages I've seen since joining.\n\
Text, photos, videos, documents, audio, voice, stickers, GIFs and round videos are supported. \
Albums are found by scanning {window} messages either side of the link.\n\
{annotate}\n\n\
Commands:\n\
/start, /help - this message\n\
/status - what I've indexed so far",
        window = state.cfg.album_window,
    )
}

pub async fn handle_command(bot: Bot, msg: &Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let (cmd, _arg) = parse_command(text);

    let reply = match cmd.as_str() {
        "start" | "help" => help_text(&state),
        "status" => {
            let stats = state.telegram.index_stats().await;
            format!(
                "Relay status\n\n\
Chats observed: {}\n\
Messages indexed: {} (up to {} per chat)\n\
Album scan radius: {}\n\
Per-item delay: {} ms",
                stats.chats,
                stats.messages,
                state.cfg.index_capacity,
                state.cfg.album_window,
                state.cfg.item_delay.as_millis(),
            )
        }
        _ => format!("Unknown command /{cmd}. Try /help."),
    };

    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_command_strips_bot_name_and_args() {
        assert_eq!(
            parse_command("/Status@relay_bot now"),
            ("status".to_string(), "now".to_string())
        );
        assert_eq!(parse_command("/help"), ("help".to_string(), String::new()));
    }
}
