//! Message link parsing.
//!
//! Accepted shapes (scheme optional):
//! - `https://t.me/<handle>/<id>`
//! - `https://t.me/c/<internal_id>/<id>` (private channel / supergroup)
//! - `https://t.me/<numeric_chat_id>/<id>` (bare chat id, used as-is)

use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{ChatId, ChatIdentifier, MessageId, MessageReference};

/// Namespace marker Telegram puts in front of channel and supergroup ids.
pub const PRIVATE_CHANNEL_PREFIX: &str = "-100";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a message link: {input}")]
pub struct ParseError {
    pub input: String,
}

impl ParseError {
    fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
        }
    }
}

fn private_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:https?://)?t\.me/c/(-?\d+)/(\d+)(?:[/?#\s]|$)").expect("valid regex")
    })
}

fn public_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:https?://)?t\.me/([A-Za-z0-9_]+)/(\d+)(?:[/?#\s]|$)")
            .expect("valid regex")
    })
}

/// Parse a message link into a [`MessageReference`]. Pure, no I/O.
pub fn parse(raw: &str) -> Result<MessageReference, ParseError> {
    let link = raw.trim();

    if let Some(caps) = private_link_re().captures(link) {
        let chat = qualify_private_id(&caps[1]).ok_or_else(|| ParseError::new(raw))?;
        let message_id = parse_message_id(&caps[2]).ok_or_else(|| ParseError::new(raw))?;
        return Ok(MessageReference {
            chat: ChatIdentifier::Id(chat),
            message_id,
        });
    }

    if let Some(caps) = public_link_re().captures(link) {
        let ident = &caps[1];
        // `t.me/c/<id>` without a message id: a truncated private link.
        if ident == "c" {
            return Err(ParseError::new(raw));
        }
        let message_id = parse_message_id(&caps[2]).ok_or_else(|| ParseError::new(raw))?;
        let chat = if ident.bytes().all(|b| b.is_ascii_digit()) {
            let id = ident.parse::<i64>().map_err(|_| ParseError::new(raw))?;
            ChatIdentifier::Id(ChatId(id))
        } else {
            ChatIdentifier::Handle(ident.to_string())
        };
        return Ok(MessageReference { chat, message_id });
    }

    Err(ParseError::new(raw))
}

/// Pick the first whitespace-separated token that looks like a `t.me` link.
pub fn find_link(text: &str) -> Option<&str> {
    text.split_whitespace().find(|tok| tok.contains("t.me/"))
}

/// Ensure a raw link carries a scheme so it renders as a clickable URL.
pub fn normalize_link(raw: &str) -> String {
    let link = raw.trim();
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else {
        format!("https://{link}")
    }
}

fn qualify_private_id(raw: &str) -> Option<ChatId> {
    if raw.starts_with(PRIVATE_CHANNEL_PREFIX) {
        return raw.parse::<i64>().ok().map(ChatId);
    }
    let digits = raw.trim_start_matches('-');
    format!("{PRIVATE_CHANNEL_PREFIX}{digits}")
        .parse::<i64>()
        .ok()
        .map(ChatId)
}

fn parse_message_id(raw: &str) -> Option<MessageId> {
    raw.parse::<i32>().ok().filter(|id| *id > 0).map(MessageId)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(h: &str, id: i32) -> MessageReference {
        MessageReference {
            chat: ChatIdentifier::Handle(h.to_string()),
            message_id: MessageId(id),
        }
    }

    fn numeric(chat: i64, id: i32) -> MessageReference {
        MessageReference {
            chat: ChatIdentifier::Id(ChatId(chat)),
            message_id: MessageId(id),
        }
    }

    #[test]
    fn parses_public_handle_links_with_and_without_scheme() {
        assert_eq!(parse("https://t.me/examplechan/100").unwrap(), handle("examplechan", 100));
        assert_eq!(parse("http://t.me/examplechan/100").unwrap(), handle("examplechan", 100));
        assert_eq!(parse("t.me/examplechan/100").unwrap(), handle("examplechan", 100));
        assert_eq!(parse("  t.me/some_chan/7  ").unwrap(), handle("some_chan", 7));
    }

    #[test]
    fn private_links_get_channel_prefix() {
        assert_eq!(parse("t.me/c/123/55").unwrap(), numeric(-100123, 55));
        assert_eq!(
            parse("https://t.me/c/1234567890/1").unwrap(),
            numeric(-1001234567890, 1)
        );
    }

    #[test]
    fn private_links_already_prefixed_are_kept() {
        assert_eq!(parse("t.me/c/-100123/55").unwrap(), numeric(-100123, 55));
    }

    #[test]
    fn bare_numeric_chat_is_not_transformed() {
        assert_eq!(parse("t.me/123456/9").unwrap(), numeric(123456, 9));
    }

    #[test]
    fn trailing_segments_and_queries_are_ignored() {
        assert_eq!(parse("https://t.me/chan/5?single").unwrap(), handle("chan", 5));
        assert_eq!(parse("https://t.me/c/42/5/").unwrap(), numeric(-10042, 5));
    }

    #[test]
    fn malformed_links_fail() {
        for raw in [
            "t.me/abc",
            "t.me/abc/",
            "t.me/abc/xyz",
            "t.me/abc/12x",
            "https://telegram.org/abc/1",
            "https://T.ME/abc/1",
            "t.me/c/123",
            "t.me/abc/0",
            "t.me/abc/99999999999",
            "",
            "hello",
        ] {
            assert!(parse(raw).is_err(), "expected error for {raw:?}");
        }
    }

    #[test]
    fn parsing_is_deterministic() {
        for raw in ["t.me/c/777/3", "https://t.me/chan/12"] {
            assert_eq!(parse(raw).unwrap(), parse(raw).unwrap());
        }
    }

    #[test]
    fn canonical_link_round_trips_both_forms() {
        assert_eq!(
            parse("t.me/c/123/55").unwrap().canonical_link(),
            "https://t.me/c/123/55"
        );
        assert_eq!(
            parse("t.me/chan/8").unwrap().canonical_link(),
            "https://t.me/chan/8"
        );
    }

    #[test]
    fn find_link_picks_the_link_token() {
        assert_eq!(
            find_link("please relay t.me/chan/1 thanks"),
            Some("t.me/chan/1")
        );
        assert_eq!(find_link("no link here"), None);
    }

    #[test]
    fn normalize_link_adds_scheme_once() {
        assert_eq!(normalize_link("t.me/chan/1"), "https://t.me/chan/1");
        assert_eq!(normalize_link("https://t.me/chan/1"), "https://t.me/chan/1");
    }
}
