//! Read-through report cache.
//!
//! Rendered reports are kept in memory for a fixed TTL under a SHA-256 digest of
//! every parameter that shaped them. Only successful reports are ever stored.

use crate::{core::filter::FilterContext, errors::Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// The full set of parameters a cached report depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheKey {
    /// Which report
    pub view: String,
    /// Caller identity
    pub user_id: i64,
    /// Compared years
    pub years: (i32, i32),
    /// First reported day
    pub start_date: String,
    /// Last reported day
    pub end_date: String,
    /// Sorted location scope; empty when unrestricted
    pub locations: Vec<String>,
    /// Category selector
    pub category: String,
    /// Product selector
    pub product: String,
    /// Campaign selector
    pub campaign: String,
    /// Employee selector
    pub employee: String,
}

impl CacheKey {
    /// Key for `view` rendered for `user_id` under `ctx`.
    #[must_use]
    pub fn new(view: &str, user_id: i64, ctx: &FilterContext) -> Self {
        Self {
            view: view.to_string(),
            user_id,
            years: (ctx.period.years.current, ctx.period.years.previous),
            start_date: ctx.period.start_date.to_string(),
            end_date: ctx.period.end_date.to_string(),
            locations: ctx.scope.sorted(),
            category: ctx.category.key().to_string(),
            product: ctx.product.key().to_string(),
            campaign: ctx.campaign.key().to_string(),
            employee: ctx.employee.key().to_string(),
        }
    }

    /// Stable hex digest of the key.
    pub fn digest(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(self)?);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

struct Entry<V> {
    stored_at: Instant,
    value: V,
}

/// TTL cache of rendered reports of one type.
pub struct ReportCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry<V>>>,
}

impl<V: Clone> ReportCache<V> {
    /// Empty cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cached value for `digest`, evicting it if it has expired.
    pub async fn get(&self, digest: &str) -> Option<V> {
        {
            let entries = self.entries.read().await;
            match entries.get(digest) {
                Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                    debug!("Report cache hit for {digest}");
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    trace!("Report cache miss for {digest}");
                    return None;
                }
            }
        }

        let mut entries = self.entries.write().await;
        entries.remove(digest);
        debug!("Evicted expired report cache entry {digest}");
        None
    }

    /// Stores `value` under `digest`.
    pub async fn put(&self, digest: String, value: V) {
        let mut entries = self.entries.write().await;
        entries.insert(
            digest,
            Entry {
                stored_at: Instant::now(),
                value,
            },
        );
        trace!("Report cache now holds {} entries", entries.len());
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let dropped = entries.len();
        entries.clear();
        debug!("Cleared {dropped} report cache entries");
    }

    /// Number of stored entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{access::LocationScope, filter::Selector},
        test_utils::test_context,
    };

    #[tokio::test]
    async fn test_put_get_and_clear() {
        let cache = ReportCache::new(Duration::from_secs(60));
        cache.put("k".to_string(), 7_u32).await;
        assert_eq!(cache.get("k").await, Some(7));
        assert_eq!(cache.get("missing").await, None);

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_entries_are_evicted() {
        let cache = ReportCache::new(Duration::ZERO);
        cache.put("k".to_string(), "report".to_string()).await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[test]
    fn test_digest_depends_on_every_filter() -> Result<()> {
        let ctx = test_context(LocationScope::Only(vec!["B".to_string(), "A".to_string()]));
        let base = CacheKey::new("dashboard", 1, &ctx).digest()?;
        assert_eq!(base.len(), 64);
        assert_eq!(base, CacheKey::new("dashboard", 1, &ctx).digest()?);

        let reordered = test_context(LocationScope::Only(vec!["A".to_string(), "B".to_string()]));
        assert_eq!(base, CacheKey::new("dashboard", 1, &reordered).digest()?);

        assert_ne!(base, CacheKey::new("insights", 1, &ctx).digest()?);
        assert_ne!(base, CacheKey::new("dashboard", 2, &ctx).digest()?);

        let mut narrowed = ctx;
        narrowed.campaign = Selector::Only("Spring".to_string());
        assert_ne!(base, CacheKey::new("dashboard", 1, &narrowed).digest()?);
        Ok(())
    }
}
