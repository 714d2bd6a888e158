use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{errors::Error, forward::ForwardOutcome, Result};

const AUDIT_MAX_TEXT: usize = 500;

/// One line of the audit trail.
#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
}

impl AuditEvent {
    fn base(event: &str, user_id: i64, username: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event: event.to_string(),
            user_id: Some(user_id),
            username: Some(username.to_string()),
            link: None,
            outcome: None,
            tier: None,
            delivered: None,
            total: None,
            reason: None,
            authorized: None,
            retry_after: None,
        }
    }

    pub fn relay(user_id: i64, username: &str, link: &str, outcome: &ForwardOutcome) -> Self {
        let mut ev = Self::base("relay", user_id, username);
        ev.link = Some(link.to_string());
        match outcome {
            ForwardOutcome::Delivered { count, total, tier } => {
                let label = if outcome.is_partial() {
                    "partial"
                } else {
                    "delivered"
                };
                ev.outcome = Some(label.to_string());
                ev.tier = Some(tier.as_str().to_string());
                ev.delivered = Some(*count);
                ev.total = Some(*total);
            }
            ForwardOutcome::Failed(reason) => {
                ev.outcome = Some("failed".to_string());
                ev.reason = Some(reason.to_string());
            }
        }
        ev
    }

    /// A request rejected before delivery (bad link, unknown chat, no access).
    pub fn rejected(user_id: i64, username: &str, link: &str, reason: &str) -> Self {
        let mut ev = Self::base("relay", user_id, username);
        ev.link = Some(link.to_string());
        ev.outcome = Some("rejected".to_string());
        ev.reason = Some(reason.to_string());
        ev
    }

    pub fn auth(user_id: i64, username: &str, authorized: bool) -> Self {
        let mut ev = Self::base("auth", user_id, username);
        ev.authorized = Some(authorized);
        ev
    }

    pub fn rate_limit(user_id: i64, username: &str, retry_after: f64) -> Self {
        let mut ev = Self::base("rate_limit", user_id, username);
        ev.retry_after = Some(retry_after);
        ev
    }
}

#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        event.link = event.link.map(|s| truncate_text(&s, AUDIT_MAX_TEXT));
        event.reason = event.reason.map(|s| truncate_text(&s, AUDIT_MAX_TEXT));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };

        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            match v {
                serde_json::Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

pub fn truncate_text(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out = s.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}
