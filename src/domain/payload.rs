use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Body must not be empty")]
    Empty,

    #[error("Body must be JSON: {0}")]
    Malformed(String),

    #[error("Body could not be read: {0}")]
    Unreadable(String),
}

/// Inbound document, validated as JSON and forwarded byte-for-byte.
#[derive(Debug, Clone)]
pub struct Payload {
    raw: Bytes,
}

impl Payload {
    /// Validate raw request bytes.
    pub fn from_json_bytes(raw: Bytes) -> Result<Self, PayloadError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(PayloadError::Empty);
        }

        serde_json::from_slice::<serde::de::IgnoredAny>(&raw)
            .map_err(|e| PayloadError::Malformed(e.to_string()))?;

        Ok(Payload { raw })
    }

    /// Cheap handle on the raw request bytes.
    pub fn bytes(&self) -> Bytes {
        self.raw.clone()
    }
}
