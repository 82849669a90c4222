//! Outbound response model.
//!
//! # Responsibilities
//! - Hold the code, payload and content-format written by a result handler
//! - Carry the observe sequence number of a notification
//!
//! # Design Decisions
//! - `code: None` until the dispatcher applies the method's default
//! - `Payload` pairs bytes with an optional content-format so stream
//!   emissions can be turned into notifications without a handler call

use bytes::Bytes;
use serde::Serialize;

use crate::message::{ContentFormat, Headers, ResponseCode};

/// Body bytes plus the content-format they are encoded in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Bytes,
    pub content_format: Option<ContentFormat>,
}

impl Payload {
    pub fn new(bytes: impl Into<Bytes>, content_format: Option<ContentFormat>) -> Self {
        Self {
            bytes: bytes.into(),
            content_format,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text.into(), Some(ContentFormat::TEXT_PLAIN))
    }

    /// Serialises `value` as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_vec(value)?, Some(ContentFormat::JSON)))
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<&'static str> for Payload {
    fn from(text: &'static str) -> Self {
        Self::text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes, None)
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self::new(bytes, None)
    }
}

/// Response handed back to the transport adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub code: Option<ResponseCode>,
    pub payload: Bytes,
    pub content_format: Option<ContentFormat>,
    pub observe: Option<u32>,
    pub options: Headers,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code(code: ResponseCode) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    /// A notification for an observed resource.
    pub fn notification(payload: Payload, sequence: u32) -> Self {
        Self {
            code: Some(ResponseCode::Content),
            payload: payload.bytes,
            content_format: payload.content_format,
            observe: Some(sequence),
            options: Headers::new(),
        }
    }

    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = payload.bytes;
        if payload.content_format.is_some() {
            self.content_format = payload.content_format;
        }
    }

    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn is_success(&self) -> bool {
        self.code.map(ResponseCode::is_success).unwrap_or(true)
    }
}

impl From<Payload> for Response {
    fn from(payload: Payload) -> Self {
        let mut response = Response::new();
        response.set_payload(payload);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_conversions() {
        let p: Payload = "on".into();
        assert_eq!(p.content_format, Some(ContentFormat::TEXT_PLAIN));
        let p: Payload = vec![1u8, 2, 3].into();
        assert_eq!(p.content_format, None);
        let p = Payload::json(&serde_json::json!({"t": 21})).unwrap();
        assert_eq!(p.content_format, Some(ContentFormat::JSON));
    }

    #[test]
    fn set_payload_keeps_explicit_format_when_payload_has_none() {
        let mut response = Response::new();
        response.content_format = Some(ContentFormat::CBOR);
        response.set_payload(Payload::from(vec![0xA0]));
        assert_eq!(response.content_format, Some(ContentFormat::CBOR));
    }

    #[test]
    fn notification_carries_sequence() {
        let n = Response::notification(Payload::text("21.5"), 3);
        assert_eq!(n.observe, Some(3));
        assert_eq!(n.code, Some(ResponseCode::Content));
        assert_eq!(n.payload_str(), Some("21.5"));
    }
}
