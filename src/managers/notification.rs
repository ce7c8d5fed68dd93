//! Discord webhook notifications
//!
//! Failures are reported per site as they happen; digests summarise the
//! status ledger over a window. Sending is fire-and-forget: errors are
//! logged and never reach the backup run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

use super::status::Digest;
use crate::config::{NotificationConfig, NotifyEvent};

/// Outbound notification channel
pub trait Notifier: Send + Sync {
    /// Report a failed site
    fn notify_failure(&self, site_id: &str, message: &str);

    /// Report a summary of recent runs
    fn notify_digest(&self, digest: &Digest);
}

/// Discord embed color codes (decimal)
#[derive(Debug, Clone, Copy)]
pub enum NotificationColor {
    /// Red - for failures
    Failure = 15158332, // #E74C3C
    /// Orange - for digests that include failures
    Warning = 15105570, // #E67E22
    /// Green - for clean digests
    Success = 3066993, // #2ECC71
}

impl NotificationColor {
    fn as_decimal(&self) -> u32 {
        *self as u32
    }
}

/// Discord webhook payload
#[derive(Debug, Serialize)]
struct DiscordPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<DiscordField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<DiscordFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
struct DiscordField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct DiscordFooter {
    text: String,
}

/// Rate limit cache entry
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    /// Unix timestamp of last notification
    last_sent: u64,
    /// Count of notifications sent in current window
    count: u32,
}

/// Rate limit cache
#[derive(Debug, Serialize, Deserialize, Default)]
struct NotificationCache {
    entries: HashMap<String, CacheEntry>,
}

/// Notifier posting to a Discord webhook
pub struct DiscordNotifier {
    config: NotificationConfig,
    cache_path: PathBuf,
}

impl DiscordNotifier {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            config,
            cache_path: Self::default_cache_path(),
        }
    }

    /// Use a specific rate-limit cache file
    pub fn with_cache_path(config: NotificationConfig, cache_path: PathBuf) -> Self {
        Self { config, cache_path }
    }

    fn default_cache_path() -> PathBuf {
        if let Some(cache_dir) = dirs::cache_dir() {
            cache_dir.join("dump-manager-notifications.json")
        } else {
            PathBuf::from("/tmp/dump-manager-notifications.json")
        }
    }

    /// Check if notifications are enabled for an event type
    pub fn is_enabled(&self, event: NotifyEvent) -> bool {
        !self.config.discord_webhook_url.is_empty() && self.config.notify_on.contains(&event)
    }

    /// Rate-limit key for an event about `subject`.
    ///
    /// Digests are explicit requests and are never rate-limited.
    fn rate_limit_key(event: NotifyEvent, subject: &str) -> Option<String> {
        match event {
            NotifyEvent::Failure => Some(format!("{}:failure", subject)),
            NotifyEvent::Digest => None,
        }
    }

    fn send(&self, event: NotifyEvent, subject: &str, payload: DiscordPayload) -> Result<()> {
        if !self.is_enabled(event) {
            debug!("Notification type {:?} not enabled, skipping", event);
            return Ok(());
        }

        let cache_key = Self::rate_limit_key(event, subject);
        if let Some(ref key) = cache_key {
            if self.is_rate_limited(key)? {
                debug!("Notification rate-limited for key: {}", key);
                return Ok(());
            }
        }

        self.send_webhook(&payload)?;
        if let Some(ref key) = cache_key {
            self.update_cache(key)?;
        }

        info!("Sent {:?} notification ({})", event, subject);
        Ok(())
    }

    fn build_failure_payload(&self, site_id: &str, message: &str) -> DiscordPayload {
        let error_display = truncate(message, 500);

        let embed = DiscordEmbed {
            title: "\u{274C} Dump Manager: Failure".to_string(),
            description: Some(format!("Backup failed for site '{}'", site_id)),
            color: NotificationColor::Failure.as_decimal(),
            fields: vec![
                DiscordField {
                    name: "Site".to_string(),
                    value: site_id.to_string(),
                    inline: true,
                },
                DiscordField {
                    name: "Error".to_string(),
                    value: format!("```\n{}\n```", error_display),
                    inline: false,
                },
            ],
            footer: Some(DiscordFooter {
                text: "dump-manager".to_string(),
            }),
            timestamp: now_rfc3339(),
        };

        DiscordPayload {
            username: Some("Dump Manager".to_string()),
            embeds: vec![embed],
        }
    }

    fn build_digest_payload(&self, digest: &Digest) -> DiscordPayload {
        let color = if digest.failed > 0 {
            NotificationColor::Warning
        } else {
            NotificationColor::Success
        };

        let mut fields = vec![
            DiscordField {
                name: "Runs".to_string(),
                value: digest.total.to_string(),
                inline: true,
            },
            DiscordField {
                name: "Succeeded".to_string(),
                value: digest.succeeded.to_string(),
                inline: true,
            },
            DiscordField {
                name: "Failed".to_string(),
                value: digest.failed.to_string(),
                inline: true,
            },
            DiscordField {
                name: "Uploaded".to_string(),
                value: format_bytes(digest.bytes_uploaded),
                inline: true,
            },
        ];

        if !digest.failures.is_empty() {
            let lines: Vec<String> = digest
                .failures
                .iter()
                .map(|f| format!("{} {}: {}", f.date, f.site_id, f.error_text))
                .collect();
            fields.push(DiscordField {
                name: "Failures".to_string(),
                value: format!("```\n{}\n```", truncate(&lines.join("\n"), 900)),
                inline: false,
            });
        }

        DiscordPayload {
            username: Some("Dump Manager".to_string()),
            embeds: vec![DiscordEmbed {
                title: "\u{1F4CB} Dump Manager: Digest".to_string(),
                description: Some(format!("Backups since {}", digest.since)),
                color: color.as_decimal(),
                fields,
                footer: Some(DiscordFooter {
                    text: "dump-manager".to_string(),
                }),
                timestamp: now_rfc3339(),
            }],
        }
    }

    fn send_webhook(&self, payload: &DiscordPayload) -> Result<()> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let response = client
            .post(&self.config.discord_webhook_url)
            .json(payload)
            .send()
            .context("Failed to send Discord webhook")?;

        let status = response.status();
        if status.is_success() {
            debug!("Discord webhook sent successfully");
            Ok(())
        } else {
            let body = response.text().unwrap_or_default();
            error!("Discord webhook failed with status {}: {}", status, body);
            anyhow::bail!("Discord webhook failed with status {}: {}", status, body)
        }
    }

    fn is_rate_limited(&self, cache_key: &str) -> Result<bool> {
        let cache = self.load_cache()?;
        let rate_limit_secs = self.config.rate_limit_minutes * 60;

        Ok(cache
            .entries
            .get(cache_key)
            .map(|entry| unix_now().saturating_sub(entry.last_sent) < rate_limit_secs)
            .unwrap_or(false))
    }

    fn update_cache(&self, cache_key: &str) -> Result<()> {
        let mut cache = self.load_cache()?;
        let now = unix_now();

        let count = cache.entries.get(cache_key).map_or(1, |e| e.count + 1);
        cache.entries.insert(
            cache_key.to_string(),
            CacheEntry {
                last_sent: now,
                count,
            },
        );

        // Clean up old entries (older than 24 hours)
        let cutoff = now.saturating_sub(86400);
        cache.entries.retain(|_, v| v.last_sent > cutoff);

        self.save_cache(&cache)
    }

    fn load_cache(&self) -> Result<NotificationCache> {
        if !self.cache_path.exists() {
            return Ok(NotificationCache::default());
        }

        let content =
            fs::read_to_string(&self.cache_path).context("Failed to read notification cache")?;

        // A corrupt cache only loses rate-limit history
        Ok(serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring unreadable notification cache: {}", e);
            NotificationCache::default()
        }))
    }

    fn save_cache(&self, cache: &NotificationCache) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(cache)
            .context("Failed to serialize notification cache")?;
        fs::write(&self.cache_path, content).context("Failed to write notification cache")?;
        Ok(())
    }
}

impl Notifier for DiscordNotifier {
    fn notify_failure(&self, site_id: &str, message: &str) {
        let payload = self.build_failure_payload(site_id, message);
        if let Err(e) = self.send(NotifyEvent::Failure, site_id, payload) {
            warn!("Failed to send failure notification: {:#}", e);
        }
    }

    fn notify_digest(&self, digest: &Digest) {
        let payload = self.build_digest_payload(digest);
        let subject = format!("digest since {}", digest.since);
        if let Err(e) = self.send(NotifyEvent::Digest, &subject, payload) {
            warn!("Failed to send digest notification: {:#}", e);
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn now_rfc3339() -> Option<String> {
    chrono::DateTime::from_timestamp(unix_now() as i64, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Format a byte count in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = "B";
    for u in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = u;
    }
    format!("{:.1} {}", value, unit)
}

/// Recording notifier for tests
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum SentNotification {
        Failure { site_id: String, message: String },
        Digest(Digest),
    }

    #[derive(Clone, Default)]
    pub struct MockNotifier {
        pub sent: Arc<Mutex<Vec<SentNotification>>>,
    }

    impl MockNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failures(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|n| match n {
                    SentNotification::Failure { site_id, .. } => Some(site_id.clone()),
                    _ => None,
                })
                .collect()
        }

        pub fn digests(&self) -> Vec<Digest> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|n| match n {
                    SentNotification::Digest(d) => Some(d.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    impl Notifier for MockNotifier {
        fn notify_failure(&self, site_id: &str, message: &str) {
            self.sent.lock().unwrap().push(SentNotification::Failure {
                site_id: site_id.to_string(),
                message: message.to_string(),
            });
        }

        fn notify_digest(&self, digest: &Digest) {
            self.sent
                .lock()
                .unwrap()
                .push(SentNotification::Digest(digest.clone()));
        }
    }
}
