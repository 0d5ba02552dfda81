use async_trait::async_trait;
use bytes::Bytes;
use moka::Expiry;
use moka::future::Cache;
use shared::{Error, Result, TtlSecs};
use std::collections::HashMap;
use std::fmt::Debug;
use std::time::{Duration, Instant};
use structcache::Transport;

#[derive(Clone, Debug)]
struct StoredValue {
    payload: Bytes,
    expires_in: Option<Duration>,
}

/// Expiry policy reading each entry's own TTL
struct PerEntryExpiry;

impl Expiry<String, StoredValue> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.expires_in
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.expires_in
    }
}

/// Moka-backed transport living in the same process
/// Supports per-entry TTL and can simulate a network round trip per call
pub struct MokaTransport {
    cache: Cache<String, StoredValue>,
    round_trip: Option<Duration>,
}

impl MokaTransport {
    /// Create an unbounded transport
    pub fn new(name: &str) -> Self {
        Self {
            cache: Cache::builder()
                .name(name)
                .expire_after(PerEntryExpiry)
                .build(),
            round_trip: None,
        }
    }

    /// Create a transport holding at most `max_entries` values
    pub fn new_bounded(name: &str, max_entries: u64) -> Self {
        Self {
            cache: Cache::builder()
                .name(name)
                .max_capacity(max_entries)
                .expire_after(PerEntryExpiry)
                .build(),
            round_trip: None,
        }
    }

    /// Delay every call by `round_trip`, standing in for network latency
    pub fn with_round_trip(mut self, round_trip: Duration) -> Self {
        self.round_trip = Some(round_trip);
        self
    }

    /// Store `payload` with an exact lifetime instead of a TTL in seconds
    pub async fn set_with_expiry(&self, key: &str, payload: Bytes, expires_in: Option<Duration>) {
        self.cache
            .insert(
                key.to_string(),
                StoredValue {
                    payload,
                    expires_in,
                },
            )
            .await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Apply pending evictions and expirations
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }

    async fn simulate_round_trip(&self) {
        if let Some(delay) = self.round_trip {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Transport for MokaTransport {
    async fn set(&self, key: &str, value: Bytes, ttl: Option<TtlSecs>) -> Result<()> {
        self.simulate_round_trip().await;
        let expires_in = ttl.and_then(|ttl| ttl.expires_in());
        self.set_with_expiry(key, value, expires_in).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.simulate_round_trip().await;
        match self.cache.get(key).await {
            Some(stored) => Ok(stored.payload),
            None => Err(Error::NotFound(key.to_string())), // Either doesn't exist or TTL expired
        }
    }

    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Bytes>> {
        self.simulate_round_trip().await;
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(stored) = self.cache.get(key).await {
                found.insert(key.clone(), stored.payload);
            }
        }
        tracing::trace!("Multi-get found {} of {} key(s)", found.len(), keys.len());
        Ok(found)
    }
}

impl Debug for MokaTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaTransport")
            .field("entry_count", &self.cache.entry_count())
            .field("weighted_size", &self.cache.weighted_size())
            .field("round_trip", &self.round_trip)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_moka_transport_set_and_get() {
        let transport = MokaTransport::new("test");

        transport
            .set("hello", Bytes::from("world"), None)
            .await
            .unwrap();

        let value = transport.get("hello").await.unwrap();
        assert_eq!(value, Bytes::from("world"));
    }

    #[tokio::test]
    async fn test_moka_transport_get_nonexistent() {
        let transport = MokaTransport::new("test");

        let result = transport.get("nonexistent").await;
        assert!(matches!(result.unwrap_err(), Error::NotFound(key) if key == "nonexistent"));
    }

    #[tokio::test]
    async fn test_moka_transport_overwrite() {
        let transport = MokaTransport::new("test");

        transport.set("key", Bytes::from("value1"), None).await.unwrap();
        transport.set("key", Bytes::from("value2"), None).await.unwrap();

        let value = transport.get("key").await.unwrap();
        assert_eq!(value, Bytes::from("value2"));
    }

    #[tokio::test]
    async fn test_moka_transport_get_multi_skips_missing() {
        let transport = MokaTransport::new("test");
        transport.set("a", Bytes::from("1"), None).await.unwrap();
        transport.set("c", Bytes::from("3"), None).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let found = transport.get_multi(&keys).await.unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found.get("a"), Some(&Bytes::from("1")));
        assert!(!found.contains_key("b"));
    }

    #[tokio::test]
    async fn test_moka_transport_per_entry_expiry() {
        let transport = MokaTransport::new("test");

        transport
            .set_with_expiry("short", Bytes::from("gone soon"), Some(Duration::from_millis(100)))
            .await;
        transport.set("long", Bytes::from("stays"), None).await.unwrap();

        // Should be available immediately
        assert!(transport.get("short").await.is_ok());

        // Wait for expiration
        sleep(Duration::from_millis(150)).await;

        assert!(matches!(
            transport.get("short").await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(transport.get("long").await.is_ok());
    }

    #[tokio::test]
    async fn test_moka_transport_expired_ttl() {
        let transport = MokaTransport::new("test");

        // Negative TTL means already expired
        transport
            .set("expired", Bytes::from("x"), Some(TtlSecs(-1)))
            .await
            .unwrap();
        assert!(transport.get("expired").await.is_err());

        // Zero TTL never expires
        transport
            .set("forever", Bytes::from("x"), Some(TtlSecs::NEVER))
            .await
            .unwrap();
        assert!(transport.get("forever").await.is_ok());
    }

    #[tokio::test]
    async fn test_moka_transport_bounded() {
        let transport = MokaTransport::new_bounded("test", 2); // Max 2 entries

        for key in ["key1", "key2", "key3"] {
            transport.set(key, Bytes::from("value"), None).await.unwrap();
        }

        // Let eviction take effect
        transport.sync().await;

        assert!(transport.entry_count() <= 2, "Transport should hold at most 2 entries");
    }

    #[tokio::test]
    async fn test_moka_transport_round_trip_delay() {
        let transport = MokaTransport::new("test").with_round_trip(Duration::from_millis(20));

        let started = Instant::now();
        let keys: Vec<String> = (0..10).map(|i| format!("k{}", i)).collect();
        transport.get_multi(&keys).await.unwrap();
        let elapsed = started.elapsed();

        // One delay for the whole multi-get, not one per key
        assert!(elapsed >= Duration::from_millis(20));
        assert!(elapsed < Duration::from_millis(200));
    }
}
