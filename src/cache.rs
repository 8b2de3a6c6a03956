use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::time::Instant;
use tracing::debug;

use crate::date::is_historical;

/// Lifetime of cached responses for ranges that ended before today.
pub const HISTORICAL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Lifetime of cached responses for ranges that include today, which the
/// upstream keeps extending.
pub const CURRENT_TTL: Duration = Duration::from_secs(15 * 60);

pub fn ttl_for_range(end: &NaiveDate, now: DateTime<Utc>) -> Duration {
    if is_historical(end, now) {
        HISTORICAL_TTL
    } else {
        CURRENT_TTL
    }
}

/// Default bound on the number of cached response bodies.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

#[derive(Debug)]
struct CachedBody {
    body: String,
    expires_at: Instant,
}

/// In-memory cache of successful response bodies keyed by request URL.
///
/// Lives as long as the [`Client`](crate::Client) that owns it; nothing is persisted.
/// When full, expired entries are dropped first, then the entry closest to expiry.
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CachedBody>>,
    max_entries: usize,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }
}

impl ResponseCache {
    /// `max_entries` is clamped to at least 1.
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn get(&self, url: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(url) {
            Some(hit) if hit.expires_at > Instant::now() => {
                debug!(url, "response cache hit");
                Some(hit.body.clone())
            }
            Some(_) => {
                entries.remove(url);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, url: impl Into<String>, body: impl Into<String>, ttl: Duration) {
        let url = url.into();
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if !entries.contains_key(&url) && entries.len() >= self.max_entries {
            entries.retain(|_, e| e.expires_at > now);
            if entries.len() >= self.max_entries {
                let victim = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(victim) = victim {
                    debug!(url = %victim, "response cache full, evicting");
                    entries.remove(&victim);
                }
            }
        }

        entries.insert(
            url,
            CachedBody {
                body: body.into(),
                expires_at: now + ttl,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ttl_depends_on_range_end() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2024, 5, 9).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert_eq!(ttl_for_range(&yesterday, now), HISTORICAL_TTL);
        assert_eq!(ttl_for_range(&today, now), CURRENT_TTL);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let cache = ResponseCache::default();
        cache.insert("http://x/a", "body", Duration::from_secs(60));
        assert_eq!(cache.get("http://x/a").as_deref(), Some("body"));
        assert_eq!(cache.get("http://x/b"), None);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("http://x/a"), None);
        assert!(cache.entries.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_drops_expired_entries_first() {
        let cache = ResponseCache::with_capacity(2);
        cache.insert("a", "1", Duration::from_secs(10));
        cache.insert("b", "2", Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(11)).await;
        cache.insert("c", "3", Duration::from_secs(60));

        assert_eq!(cache.entries.lock().unwrap().len(), 2);
        assert_eq!(cache.get("b").as_deref(), Some("2"));
        assert_eq!(cache.get("c").as_deref(), Some("3"));
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_evicts_entry_closest_to_expiry() {
        let cache = ResponseCache::with_capacity(2);
        cache.insert("today", "1", CURRENT_TTL);
        cache.insert("last-week", "2", HISTORICAL_TTL);
        cache.insert("yesterday", "3", HISTORICAL_TTL);

        assert_eq!(cache.entries.lock().unwrap().len(), 2);
        assert_eq!(cache.get("today"), None);
        assert_eq!(cache.get("last-week").as_deref(), Some("2"));
        assert_eq!(cache.get("yesterday").as_deref(), Some("3"));

        // Refreshing a present key never evicts.
        cache.insert("yesterday", "4", HISTORICAL_TTL);
        assert_eq!(cache.entries.lock().unwrap().len(), 2);
        assert_eq!(cache.get("last-week").as_deref(), Some("2"));
    }
}
