use crate::batch::{BatchFetchDecoder, BatchSummary};
use crate::codec::Codec;
use crate::domain::{BatchRequest, DecodeTarget, Entry};
use crate::ports::Transport;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::config::Config;
use shared::{Error, Result, TtlSecs, validate_key};
use std::sync::Arc;

/// Stores and loads structured values through a cache transport
/// This is the main entry point for callers
#[derive(Clone)]
pub struct StructCache {
    transport: Arc<dyn Transport>,
    codec: Codec,
    default_ttl: Option<TtlSecs>,
    batch: BatchFetchDecoder,
}

impl StructCache {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, &Config::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: &Config) -> Self {
        Self {
            batch: BatchFetchDecoder::new(transport.clone(), config),
            transport,
            codec: Codec::new(config.max_value_bytes),
            default_ttl: config.default_ttl,
        }
    }

    /// Encode `value` and store it under `key`.
    /// Without an explicit `ttl` the configured default applies.
    pub async fn put<T>(&self, key: &str, value: &T, ttl: Option<TtlSecs>) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        validate_key(key)?;
        let encoded = self.codec.encode(value).map_err(|e| Error::Encode {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let ttl = ttl.or(self.default_ttl);
        tracing::debug!("Storing {} byte(s) under '{}' (ttl {:?})", encoded.len(), key, ttl);
        self.transport.set(key, encoded, ttl).await
    }

    pub async fn put_entry<T>(&self, entry: &Entry<T>) -> Result<()>
    where
        T: Serialize,
    {
        self.put(&entry.key, &entry.value, entry.ttl).await
    }

    /// Load `key` and decode it into `target` in place.
    /// On error the target is left as it was.
    pub async fn fetch<T>(&self, key: &str, target: &mut T) -> Result<()>
    where
        T: DecodeTarget + ?Sized,
    {
        validate_key(key)?;
        let payload = self.transport.get(key).await?;
        target
            .decode_from(&self.codec, &payload)
            .map_err(|e| Error::Decode {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    /// Load and decode `key` into a new value.
    pub async fn get<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        validate_key(key)?;
        let payload = self.transport.get(key).await?;
        self.codec.decode(&payload).map_err(|e| Error::Decode {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Fetch every key of `request` in one round trip and decode the values
    /// concurrently into their targets. See [`BatchFetchDecoder::fetch`].
    pub async fn fetch_batch(&self, request: &mut BatchRequest) -> Result<BatchSummary> {
        self.batch.fetch(request).await
    }
}

impl std::fmt::Debug for StructCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructCache")
            .field("codec", &self.codec)
            .field("default_ttl", &self.default_ttl)
            .field("batch", &self.batch)
            .finish()
    }
}
