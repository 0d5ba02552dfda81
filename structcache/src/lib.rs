//! Structured values in a key-value cache.
//!
//! [`StructCache`] stores serde values under string keys through any
//! [`Transport`], and fetches many keys at once with
//! [`StructCache::fetch_batch`]: one multi-get round trip, then the payloads
//! are decoded on a bounded number of blocking threads straight into the
//! caller's [`BatchRequest`] targets.

pub mod accessor;
pub mod aggregate;
pub mod batch;
pub mod codec;
pub mod domain;
mod float_check;
pub mod ports;

#[cfg(test)]
pub(crate) mod testing;

pub use accessor::StructCache;
pub use aggregate::ErrorAggregator;
pub use batch::{BatchFetchDecoder, BatchSummary};
pub use codec::{Codec, CodecError};
pub use domain::{BatchRequest, DecodeFn, DecodeTarget, Entry};
pub use ports::Transport;
pub use shared::config::Config;
pub use shared::{BatchFailure, Error, Result, TtlSecs};

// Re-export Bytes for transport implementations
pub use bytes::Bytes;
