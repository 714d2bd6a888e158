use std::{env, fs, path::PathBuf, time::Duration};

use crate::{
    errors::Error,
    forward::DEFAULT_ITEM_DELAY,
    relay::RelayConfig,
    resolver::DEFAULT_ALBUM_WINDOW,
    Result,
};

/// Typed configuration, read from the environment (and `.env` when present).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    /// Empty means every user may relay.
    pub telegram_allowed_users: Vec<i64>,

    // Relay
    pub temp_dir: PathBuf,
    pub album_window: i32,
    pub item_delay: Duration,
    pub annotate: bool,
    pub index_capacity: usize,

    // Outbound throttling
    pub send_interval: Duration,
    pub chat_send_interval: Duration,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,

    // Rate limiting
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        // A missing .env is fine; real env vars always win.
        let _ = dotenvy::dotenv();

        let cfg = Self::from_vars(|key| env::var(key).ok())?;
        fs::create_dir_all(&cfg.temp_dir)?;
        Ok(cfg)
    }

    /// Build the config from an arbitrary variable lookup.
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;
        let telegram_allowed_users = parse_csv_i64(get("TELEGRAM_ALLOWED_USERS"));

        let temp_dir = PathBuf::from(
            get("RELAY_TEMP_DIR")
                .and_then(non_empty)
                .unwrap_or("/tmp/tgrelay".to_string()),
        );
        let album_window = get("RELAY_ALBUM_WINDOW")
            .and_then(|s| parse_u64(&s))
            .map(|w| w.clamp(1, 100) as i32)
            .unwrap_or(DEFAULT_ALBUM_WINDOW);
        let item_delay = get("RELAY_ITEM_DELAY_MS")
            .and_then(|s| parse_u64(&s))
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_ITEM_DELAY);
        let annotate = get("RELAY_ANNOTATE")
            .map(|s| parse_bool(&s))
            .unwrap_or(true);
        let index_capacity = get("RELAY_INDEX_CAPACITY")
            .and_then(|s| parse_u64(&s))
            .map(|n| n.max(1) as usize)
            .unwrap_or(5000);

        // Telegram allows roughly 30 messages/s overall and 1/s per chat.
        let send_interval = Duration::from_millis(
            get("SEND_INTERVAL_MS")
                .and_then(|s| parse_u64(&s))
                .unwrap_or(40),
        );
        let chat_send_interval = Duration::from_millis(
            get("CHAT_SEND_INTERVAL_MS")
                .and_then(|s| parse_u64(&s))
                .unwrap_or(1000),
        );

        let audit_log_path = PathBuf::from(
            get("AUDIT_LOG_PATH").unwrap_or("/tmp/tgrelay-audit.log".to_string()),
        );
        let audit_log_json = get("AUDIT_LOG_JSON")
            .map(|s| parse_bool(&s))
            .unwrap_or(false);

        let rate_limit_enabled = get("RATE_LIMIT_ENABLED")
            .map(|s| parse_bool(&s))
            .unwrap_or(true);
        let rate_limit_requests = get("RATE_LIMIT_REQUESTS")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .unwrap_or(10);
        let rate_limit_window = Duration::from_secs(
            get("RATE_LIMIT_WINDOW")
                .and_then(|s| parse_u64(&s))
                .unwrap_or(60),
        );

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_users,
            temp_dir,
            album_window,
            item_delay,
            annotate,
            index_capacity,
            send_interval,
            chat_send_interval,
            audit_log_path,
            audit_log_json,
            rate_limit_enabled,
            rate_limit_requests,
            rate_limit_window,
        })
    }

    pub fn relay(&self) -> RelayConfig {
        RelayConfig {
            temp_dir: self.temp_dir.clone(),
            album_window: self.album_window,
            item_delay: self.item_delay,
            annotate: self.annotate,
        }
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_u64(s: &str) -> Option<u64> {
    s.trim().parse::<u64>().ok()
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
