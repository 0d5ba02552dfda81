use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::error::Category;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Format tag for serde_json bodies
pub const FORMAT_JSON: u8 = 0x01;

const LENGTH_FIELD_BYTES: usize = 4;

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("value is not representable: {0}")]
    Unrepresentable(String),

    #[error("encoded value is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("malformed value: {0}")]
    Malformed(String),

    #[error("unknown format tag 0x{0:02X}")]
    UnknownFormat(u8),

    #[error("value does not fit target shape: {0}")]
    Shape(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Data => CodecError::Shape(err.to_string()),
            Category::Syntax | Category::Eof => CodecError::Malformed(err.to_string()),
            Category::Io => CodecError::Unrepresentable(err.to_string()),
        }
    }
}

/// Converts values to and from cache payloads.
///
/// Payload layout:
/// - `[body_len: u32 BE][format: u8][serde_json body]`
///
/// `body_len` covers the format tag and the body. The whole payload must be
/// exactly one frame; trailing bytes are rejected.
#[derive(Clone, Copy, Debug)]
pub struct Codec {
    max_value_bytes: usize,
}

impl Codec {
    pub fn new(max_value_bytes: usize) -> Self {
        Self { max_value_bytes }
    }

    pub fn max_value_bytes(&self) -> usize {
        self.max_value_bytes
    }

    fn framing(&self) -> LengthDelimitedCodec {
        LengthDelimitedCodec::builder()
            .length_field_length(LENGTH_FIELD_BYTES)
            .max_frame_length(self.max_value_bytes)
            .new_codec()
    }

    pub fn encode<T>(&self, value: &T) -> Result<Bytes, CodecError>
    where
        T: Serialize + ?Sized,
    {
        crate::float_check::ensure_finite(value)
            .map_err(|e| CodecError::Unrepresentable(e.to_string()))?;

        let mut writer = BytesMut::new().writer();
        writer.get_mut().put_u8(FORMAT_JSON);
        serde_json::to_writer(&mut writer, value)
            .map_err(|e| CodecError::Unrepresentable(e.to_string()))?;
        let body = writer.into_inner().freeze();

        let size = body.len() + LENGTH_FIELD_BYTES;
        if size > self.max_value_bytes {
            return Err(CodecError::TooLarge {
                size,
                limit: self.max_value_bytes,
            });
        }

        let mut frame = BytesMut::with_capacity(size);
        self.framing()
            .encode(body, &mut frame)
            .map_err(|e| CodecError::Unrepresentable(e.to_string()))?;
        Ok(frame.freeze())
    }

    pub fn decode<T>(&self, payload: &[u8]) -> Result<T, CodecError>
    where
        T: DeserializeOwned,
    {
        let body = self.unframe(payload)?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn unframe(&self, payload: &[u8]) -> Result<Bytes, CodecError> {
        let mut src = BytesMut::from(payload);
        let mut body = self
            .framing()
            .decode(&mut src)
            .map_err(|e| CodecError::Malformed(e.to_string()))?
            .ok_or_else(|| {
                CodecError::Malformed(format!("truncated frame of {} bytes", payload.len()))
            })?;

        if !src.is_empty() {
            return Err(CodecError::Malformed(format!(
                "{} trailing bytes after frame",
                src.len()
            )));
        }
        if body.is_empty() {
            return Err(CodecError::Malformed("missing format tag".to_string()));
        }

        match body.get_u8() {
            FORMAT_JSON => Ok(body.freeze()),
            tag => Err(CodecError::UnknownFormat(tag)),
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(shared::config::Config::DEFAULT_MAX_VALUE_BYTES)
    }
}
