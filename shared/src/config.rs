use std::time::Duration;

use tracing::warn;

use crate::TtlSecs;

/// Client-side settings for struct storage and batch decoding.
#[derive(Clone, Debug)]
pub struct Config {
    /// Upper bound on decode tasks running at once within one batch fetch.
    pub decode_workers: usize,
    /// TTL applied by `put` when the caller passes none.
    pub default_ttl: Option<TtlSecs>,
    /// Largest encoded value accepted by `put` or `decode`.
    pub max_value_bytes: usize,
    /// Once elapsed, a batch fetch stops admitting new decode tasks.
    pub decode_deadline: Option<Duration>,
}

impl Config {
    pub const DEFAULT_DECODE_WORKERS: usize = 8;
    pub const DEFAULT_MAX_VALUE_BYTES: usize = 1024 * 1024;

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any variable source, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let decode_workers = parse_var::<usize, _>(&lookup, "STRUCTCACHE_DECODE_WORKERS")
            .unwrap_or(Self::DEFAULT_DECODE_WORKERS);
        let decode_workers = if decode_workers == 0 {
            warn!("STRUCTCACHE_DECODE_WORKERS must be at least 1, using 1");
            1
        } else {
            decode_workers
        };

        Self {
            decode_workers,
            default_ttl: parse_var::<i32, _>(&lookup, "STRUCTCACHE_DEFAULT_TTL_SECS").map(TtlSecs),
            max_value_bytes: parse_var::<usize, _>(&lookup, "STRUCTCACHE_MAX_VALUE_BYTES")
                .unwrap_or(Self::DEFAULT_MAX_VALUE_BYTES),
            decode_deadline: parse_var::<u64, _>(&lookup, "STRUCTCACHE_DECODE_DEADLINE_MS")
                .map(Duration::from_millis),
        }
    }

    pub fn with_decode_workers(mut self, workers: usize) -> Self {
        self.decode_workers = workers.max(1);
        self
    }

    pub fn with_default_ttl(mut self, ttl: TtlSecs) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn with_max_value_bytes(mut self, limit: usize) -> Self {
        self.max_value_bytes = limit;
        self
    }

    pub fn with_decode_deadline(mut self, deadline: Duration) -> Self {
        self.decode_deadline = Some(deadline);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            decode_workers: Self::DEFAULT_DECODE_WORKERS,
            default_ttl: None,
            max_value_bytes: Self::DEFAULT_MAX_VALUE_BYTES,
            decode_deadline: None,
        }
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("{} has invalid value '{}', using default", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup_from(&[]));
        assert_eq!(config.decode_workers, 8);
        assert_eq!(config.default_ttl, None);
        assert_eq!(config.max_value_bytes, 1024 * 1024);
        assert_eq!(config.decode_deadline, None);
    }

    #[test]
    fn test_reads_all_variables() {
        let config = Config::from_lookup(lookup_from(&[
            ("STRUCTCACHE_DECODE_WORKERS", "16"),
            ("STRUCTCACHE_DEFAULT_TTL_SECS", "300"),
            ("STRUCTCACHE_MAX_VALUE_BYTES", "4096"),
            ("STRUCTCACHE_DECODE_DEADLINE_MS", "250"),
        ]));
        assert_eq!(config.decode_workers, 16);
        assert_eq!(config.default_ttl, Some(TtlSecs(300)));
        assert_eq!(config.max_value_bytes, 4096);
        assert_eq!(config.decode_deadline, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("STRUCTCACHE_DECODE_WORKERS", "lots"),
            ("STRUCTCACHE_MAX_VALUE_BYTES", "-1"),
        ]));
        assert_eq!(config.decode_workers, Config::DEFAULT_DECODE_WORKERS);
        assert_eq!(config.max_value_bytes, Config::DEFAULT_MAX_VALUE_BYTES);
    }

    #[test]
    fn test_zero_workers_clamped() {
        let config = Config::from_lookup(lookup_from(&[("STRUCTCACHE_DECODE_WORKERS", "0")]));
        assert_eq!(config.decode_workers, 1);
        assert_eq!(Config::default().with_decode_workers(0).decode_workers, 1);
    }
}
