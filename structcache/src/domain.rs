use crate::codec::{Codec, CodecError};
use serde::de::DeserializeOwned;
use shared::TtlSecs;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

/// A value to be stored under `key`, with an optional expiration.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry<T> {
    pub key: String,
    pub value: T,
    pub ttl: Option<TtlSecs>,
}

impl<T> Entry<T> {
    pub fn new(key: impl Into<String>, value: T) -> Self {
        Self {
            key: key.into(),
            value,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: TtlSecs) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Decodes a payload into a fresh boxed target of one concrete type.
pub type DecodeFn = fn(&Codec, &[u8]) -> Result<Box<dyn DecodeTarget>, CodecError>;

/// A placeholder that a cached payload can be decoded into.
///
/// Implemented for every owned deserializable type. A failed decode leaves
/// the target untouched.
pub trait DecodeTarget: Any + Send {
    fn decode_from(&mut self, codec: &Codec, payload: &[u8]) -> Result<(), CodecError>;

    /// A decoder producing values of this target's type, usable without
    /// borrowing the target.
    fn decoder(&self) -> DecodeFn;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

fn decode_boxed<T>(codec: &Codec, payload: &[u8]) -> Result<Box<dyn DecodeTarget>, CodecError>
where
    T: DeserializeOwned + Send + 'static,
{
    Ok(Box::new(codec.decode::<T>(payload)?))
}

impl<T> DecodeTarget for T
where
    T: DeserializeOwned + Send + 'static,
{
    fn decode_from(&mut self, codec: &Codec, payload: &[u8]) -> Result<(), CodecError> {
        *self = codec.decode(payload)?;
        Ok(())
    }

    fn decoder(&self) -> DecodeFn {
        decode_boxed::<T>
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Keyed decode targets for one batch fetch.
///
/// Targets may have different types. Keys are unique; inserting an existing
/// key replaces its target.
#[derive(Default)]
pub struct BatchRequest {
    targets: HashMap<String, Box<dyn DecodeTarget>>,
    populated: HashSet<String>,
}

impl BatchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            targets: HashMap::with_capacity(capacity),
            populated: HashSet::with_capacity(capacity),
        }
    }

    /// Returns true if a target was already registered under `key`.
    pub fn insert<T: DecodeTarget>(&mut self, key: impl Into<String>, target: T) -> bool {
        self.insert_boxed(key, Box::new(target))
    }

    pub fn insert_boxed(&mut self, key: impl Into<String>, target: Box<dyn DecodeTarget>) -> bool {
        let key = key.into();
        self.populated.remove(&key);
        self.targets.insert(key, target).is_some()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.targets.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Borrow the target under `key` as `T`, if it has that type.
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        let target: &dyn DecodeTarget = self.targets.get(key)?.as_ref();
        target.as_any().downcast_ref::<T>()
    }

    /// Remove and return the target under `key` if it has type `T`.
    /// Targets of another type are left in place.
    pub fn take<T: 'static>(&mut self, key: &str) -> Option<T> {
        self.get::<T>(key)?;
        let target = self.targets.remove(key)?;
        self.populated.remove(key);
        target.into_any().downcast::<T>().ok().map(|boxed| *boxed)
    }

    /// Whether the last batch fetch decoded a value into `key`'s target.
    pub fn is_populated(&self, key: &str) -> bool {
        self.populated.contains(key)
    }

    pub fn populated_keys(&self) -> impl Iterator<Item = &str> {
        self.populated.iter().map(String::as_str)
    }

    pub(crate) fn reset_populated(&mut self) {
        self.populated.clear();
    }

    /// The decoder for the target under `key`. The target itself stays put.
    pub(crate) fn decoder_for(&self, key: &str) -> Option<DecodeFn> {
        self.targets.get(key).map(|target| target.decoder())
    }

    /// Swap in a freshly decoded value for `key` and mark it populated.
    pub(crate) fn replace_decoded(&mut self, key: String, target: Box<dyn DecodeTarget>) {
        self.populated.insert(key.clone());
        self.targets.insert(key, target);
    }
}

impl Debug for BatchRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRequest")
            .field("keys", &self.targets.keys().collect::<Vec<_>>())
            .field("populated", &self.populated.len())
            .finish()
    }
}
