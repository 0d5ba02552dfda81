use crate::ports::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use shared::{Error, Result, TtlSecs};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory transport that records every call made against it.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    entries: Mutex<HashMap<String, Bytes>>,
    unsolicited: Mutex<HashMap<String, Bytes>>,
    failure: Mutex<Option<String>>,
    last_ttl: Mutex<Option<TtlSecs>>,
    pub set_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub get_multi_calls: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_raw(&self, key: &str, payload: impl Into<Bytes>) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), payload.into());
    }

    /// Extra entry returned by every `get_multi`, requested or not.
    pub fn insert_unsolicited(&self, key: &str, payload: impl Into<Bytes>) {
        self.unsolicited
            .lock()
            .unwrap()
            .insert(key.to_string(), payload.into());
    }

    /// Make every following call fail with a transport error.
    pub fn fail_with(&self, msg: &str) {
        *self.failure.lock().unwrap() = Some(msg.to_string());
    }

    pub fn last_ttl(&self) -> Option<TtlSecs> {
        *self.last_ttl.lock().unwrap()
    }

    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.set_calls.load(Ordering::SeqCst),
            self.get_calls.load(Ordering::SeqCst),
            self.get_multi_calls.load(Ordering::SeqCst),
        )
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure.lock().unwrap().as_ref() {
            Some(msg) => Err(Error::Transport(msg.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn set(&self, key: &str, value: Bytes, ttl: Option<TtlSecs>) -> Result<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        *self.last_ttl.lock().unwrap() = ttl;
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Bytes>> {
        self.get_multi_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        let entries = self.entries.lock().unwrap();
        let mut found: HashMap<String, Bytes> = keys
            .iter()
            .filter_map(|key| entries.get(key).map(|v| (key.clone(), v.clone())))
            .collect();
        for (key, value) in self.unsolicited.lock().unwrap().iter() {
            found.insert(key.clone(), value.clone());
        }
        Ok(found)
    }
}
