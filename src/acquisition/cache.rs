use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::quality::DataQuality;
use crate::api::Quote;

/// Immutable snapshot written once per accepted quote.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
    pub quote: Quote,
    pub quality: DataQuality,
    pub cached_at: Instant,
}

impl CachedEntry {
    fn is_servable(&self, ttl: Duration, now: Instant, wall: DateTime<Utc>) -> bool {
        now.saturating_duration_since(self.cached_at) < ttl
            && self.quality.freshness_at(wall).is_live()
    }
}

/// Short-TTL quote cache keyed by symbol. Readers get `Arc` snapshots, so
/// the lock is only held for the map lookup itself.
#[derive(Clone)]
pub struct QuoteCache {
    entries: Arc<RwLock<HashMap<String, Arc<CachedEntry>>>>,
    ttl: Duration,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn get_fresh(&self, symbol: &str) -> Option<Arc<CachedEntry>> {
        self.get_fresh_at(symbol, Instant::now(), Utc::now()).await
    }

    /// A hit must be younger than the TTL *and* still REAL_TIME/FRESH when
    /// re-checked at `wall`.
    pub async fn get_fresh_at(
        &self,
        symbol: &str,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Option<Arc<CachedEntry>> {
        let entries = self.entries.read().await;
        entries
            .get(symbol)
            .filter(|entry| entry.is_servable(self.ttl, now, wall))
            .cloned()
    }

    pub async fn insert(&self, quote: Quote, quality: DataQuality) {
        self.insert_at(quote, quality, Instant::now()).await
    }

    pub async fn insert_at(&self, quote: Quote, quality: DataQuality, now: Instant) {
        let entry = Arc::new(CachedEntry {
            quote,
            quality,
            cached_at: now,
        });
        self.entries
            .write()
            .await
            .insert(entry.quote.symbol.clone(), entry);
    }

    /// Drops every entry that could no longer be served. Returns how many
    /// were removed.
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now(), Utc::now()).await
    }

    pub async fn purge_expired_at(&self, now: Instant, wall: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_servable(self.ttl, now, wall));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!("🧹 Purged {} expired quote(s) from cache", removed);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::quality::DataQualityValidator;
    use crate::api::DataSource;

    fn entry_parts(symbol: &str, age_secs: i64, wall: DateTime<Utc>) -> (Quote, DataQuality) {
        let mut quote = Quote::new(symbol, 100.0, DataSource::Yahoo);
        quote.timestamp = Some(wall - chrono::Duration::seconds(age_secs));
        let quality = DataQualityValidator::default().validate(&quote, wall);
        (quote, quality)
    }

    #[tokio::test]
    async fn test_hit_within_ttl() {
        let cache = QuoteCache::new(Duration::from_secs(60));
        let now = Instant::now();
        let wall = Utc::now();
        let (quote, quality) = entry_parts("AAPL", 5, wall);
        cache.insert_at(quote.clone(), quality, now).await;

        let hit = cache.get_fresh_at("AAPL", now + Duration::from_secs(30), wall).await;
        assert_eq!(hit.map(|e| e.quote.clone()), Some(quote));
        assert!(cache.get_fresh_at("MSFT", now, wall).await.is_none());
    }

    #[tokio::test]
    async fn test_miss_after_ttl() {
        let cache = QuoteCache::new(Duration::from_secs(60));
        let now = Instant::now();
        let wall = Utc::now();
        let (quote, quality) = entry_parts("AAPL", 5, wall);
        cache.insert_at(quote, quality, now).await;

        assert!(cache
            .get_fresh_at("AAPL", now + Duration::from_secs(60), wall)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_hit_revalidates_freshness() {
        // Long TTL, but the quote itself ages out of FRESH.
        let cache = QuoteCache::new(Duration::from_secs(3600));
        let now = Instant::now();
        let wall = Utc::now();
        let (quote, quality) = entry_parts("AAPL", 280, wall);
        cache.insert_at(quote, quality, now).await;

        assert!(cache.get_fresh_at("AAPL", now, wall).await.is_some());
        let later = wall + chrono::Duration::seconds(30);
        assert!(cache.get_fresh_at("AAPL", now, later).await.is_none());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = QuoteCache::new(Duration::from_secs(60));
        let now = Instant::now();
        let wall = Utc::now();
        let (old, old_quality) = entry_parts("AAPL", 0, wall);
        let (new, new_quality) = entry_parts("MSFT", 0, wall);
        cache.insert_at(old, old_quality, now).await;
        cache
            .insert_at(new, new_quality, now + Duration::from_secs(50))
            .await;

        let removed = cache
            .purge_expired_at(now + Duration::from_secs(70), wall)
            .await;
        assert_eq!(removed, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache
            .get_fresh_at("MSFT", now + Duration::from_secs(70), wall)
            .await
            .is_some());
    }
}
