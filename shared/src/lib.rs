// shared/src/lib.rs

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed key: {0:?}")]
    MalformedKey(String),
    #[error("encode failed for key '{key}': {reason}")]
    Encode { key: String, reason: String },
    #[error("decode failed for key '{key}': {reason}")]
    Decode { key: String, reason: String },
    #[error("decode deadline exceeded before key '{0}' was admitted")]
    DeadlineExceeded(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("{0}")]
    Batch(BatchFailure),
    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    /// Key the error refers to, when it refers to a single entry.
    pub fn key(&self) -> Option<&str> {
        match self {
            Error::NotFound(key)
            | Error::MalformedKey(key)
            | Error::DeadlineExceeded(key)
            | Error::Encode { key, .. }
            | Error::Decode { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Per-key failures collected from one batch fetch.
///
/// Entries are kept in the order the coordinator received them, so the last
/// entry is the most recent error.
#[derive(Debug)]
pub struct BatchFailure {
    decoded: usize,
    failures: Vec<(String, Error)>,
}

impl BatchFailure {
    pub fn new(decoded: usize, failures: Vec<(String, Error)>) -> Self {
        Self { decoded, failures }
    }

    /// The most recently received error.
    pub fn last(&self) -> Option<&Error> {
        self.failures.last().map(|(_, err)| err)
    }

    pub fn failures(&self) -> &[(String, Error)] {
        &self.failures
    }

    pub fn failed_keys(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|(key, _)| key.as_str())
    }

    /// Number of targets that decoded successfully in the same call.
    pub fn decoded(&self) -> usize {
        self.decoded
    }

    pub fn into_failures(self) -> Vec<(String, Error)> {
        self.failures
    }
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch fetch failed for {} key(s), {} decoded",
            self.failures.len(),
            self.decoded
        )?;
        if let Some(last) = self.last() {
            write!(f, "; last error: {}", last)?;
        }
        Ok(())
    }
}

/// Memcached key limit in bytes.
pub const MAX_KEY_LEN: usize = 250;

/// Rejects keys the cache servers would refuse: empty, longer than
/// [`MAX_KEY_LEN`], or containing whitespace and control bytes.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(Error::MalformedKey(key.to_string()));
    }
    if key.bytes().any(|b| b <= b' ' || b == 0x7f) {
        return Err(Error::MalformedKey(key.to_string()));
    }
    Ok(())
}

/// Expiration in seconds, with memcached semantics.
///
/// - `0` never expires
/// - negative values are already expired
/// - values up to 30 days are relative
/// - larger values are an absolute Unix timestamp
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TtlSecs(pub i32);

impl TtlSecs {
    pub const NEVER: TtlSecs = TtlSecs(0);
    const RELATIVE_LIMIT: i32 = 60 * 60 * 24 * 30;

    /// Time left until expiry, or `None` for entries that never expire.
    pub fn expires_in(&self) -> Option<Duration> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.expires_in_at(now)
    }

    pub fn expires_in_at(&self, now_unix_secs: u64) -> Option<Duration> {
        match self.0 {
            0 => None,
            secs if secs < 0 => Some(Duration::ZERO),
            secs if secs <= Self::RELATIVE_LIMIT => Some(Duration::from_secs(secs as u64)),
            timestamp => Some(Duration::from_secs(
                (timestamp as u64).saturating_sub(now_unix_secs),
            )),
        }
    }
}

pub mod config;
