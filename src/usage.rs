//! Download counters behind the `/api/user` stub.
//!
//! Counts live in Redis when a URL is configured; otherwise they are kept in
//! process and reset on restart. Limits are reported only, never enforced.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::models::MediaKind;

pub const FREE_PLAN: &str = "free";
pub const FREE_PLAN_LIMIT: u64 = 5;

/// Key a media kind is counted under. Audio is reported as `mp3` for the
/// web client.
pub fn usage_key(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Audio => "mp3",
        MediaKind::Video => "video",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageCount {
    pub used: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub mp3: UsageCount,
    pub video: UsageCount,
}

impl UsageSnapshot {
    fn from_counts(mp3: u64, video: u64) -> Self {
        Self {
            mp3: UsageCount {
                used: mp3,
                limit: FREE_PLAN_LIMIT,
            },
            video: UsageCount {
                used: video,
                limit: FREE_PLAN_LIMIT,
            },
        }
    }
}

/// The guest user returned while authentication is stubbed out.
#[derive(Debug, Clone, Serialize)]
pub struct GuestUser {
    pub logged_in: bool,
    pub name: String,
    pub picture: String,
    pub plan: String,
    pub usage: UsageSnapshot,
    pub last_reset: DateTime<Utc>,
}

impl GuestUser {
    pub fn new(usage: UsageSnapshot, last_reset: DateTime<Utc>) -> Self {
        Self {
            logged_in: true,
            name: "Guest User".to_string(),
            picture: String::new(),
            plan: FREE_PLAN.to_string(),
            usage,
            last_reset,
        }
    }
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn record(&self, kind: MediaKind) -> Result<u64>;

    async fn snapshot(&self) -> Result<UsageSnapshot>;

    /// When counting started.
    fn since(&self) -> DateTime<Utc>;
}

#[derive(Debug)]
pub struct MemoryUsageStore {
    counts: Mutex<HashMap<MediaKind, u64>>,
    since: DateTime<Utc>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            since: Utc::now(),
        }
    }
}

impl Default for MemoryUsageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn record(&self, kind: MediaKind) -> Result<u64> {
        let mut counts = self.counts.lock().await;
        let count = counts.entry(kind).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn snapshot(&self) -> Result<UsageSnapshot> {
        let counts = self.counts.lock().await;
        let get = |kind: MediaKind| counts.get(&kind).copied().unwrap_or(0);
        Ok(UsageSnapshot::from_counts(
            get(MediaKind::Audio),
            get(MediaKind::Video),
        ))
    }

    fn since(&self) -> DateTime<Utc> {
        self.since
    }
}

pub struct RedisUsageStore {
    client: redis::Client,
    since: DateTime<Utc>,
}

impl RedisUsageStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to connect to Redis")?;

        // Fail at startup rather than on the first download.
        let mut conn = client
            .get_async_connection()
            .await
            .context("Failed to connect to Redis")?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .context("Redis did not answer PING")?;

        info!("Usage counters stored in Redis");
        Ok(Self {
            client,
            since: Utc::now(),
        })
    }

    fn key(kind: MediaKind) -> String {
        format!("usage:{}", usage_key(kind))
    }
}

#[async_trait]
impl UsageStore for RedisUsageStore {
    async fn record(&self, kind: MediaKind) -> Result<u64> {
        let mut conn = self.client.get_async_connection().await?;
        let count: u64 = redis::cmd("INCR")
            .arg(Self::key(kind))
            .query_async(&mut conn)
            .await
            .context("Failed to increment usage counter")?;
        Ok(count)
    }

    async fn snapshot(&self) -> Result<UsageSnapshot> {
        let mut conn = self.client.get_async_connection().await?;
        let (mp3, video): (Option<u64>, Option<u64>) = redis::cmd("MGET")
            .arg(Self::key(MediaKind::Audio))
            .arg(Self::key(MediaKind::Video))
            .query_async(&mut conn)
            .await
            .context("Failed to read usage counters")?;
        Ok(UsageSnapshot::from_counts(
            mp3.unwrap_or(0),
            video.unwrap_or(0),
        ))
    }

    fn since(&self) -> DateTime<Utc> {
        self.since
    }
}
