#![deny(clippy::all)]

use async_trait::async_trait;
use bytes::Bytes;
use shared::{Result, TtlSecs};
use std::collections::HashMap;

// Ports are the pluggable extension points for the underlying cache client

/// Port for the distributed cache holding encoded values (e.g. a memcached client)
///
/// Implementations report a missing key from `get` as `Error::NotFound`, and
/// simply leave missing keys out of the `get_multi` result. Every other failure
/// is surfaced as `Error::Transport`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn set(&self, key: &str, value: Bytes, ttl: Option<TtlSecs>) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Bytes>;
    /// Fetch many keys in one round trip.
    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Bytes>>;
}
