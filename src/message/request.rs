//! Inbound request model.
//!
//! # Responsibilities
//! - Hold the routing-relevant parts of a request (method, path, options)
//! - Expose options ("headers") case-insensitively, multi-valued
//! - Carry the observe flag and transport relation identity
//!
//! # Design Decisions
//! - Built once by the transport adapter, read-only afterwards
//! - Path is kept as given; matching works on its non-empty segments

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use crate::message::{ContentFormat, MediaType, Method};

/// Case-insensitive, multi-valued option map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: BTreeMap<String, Vec<String>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .entry(name.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        !self.get_all(name).is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }
}

/// Observe option value on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Observe {
    Register,
    Deregister,
}

impl Observe {
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            0 => Some(Observe::Register),
            1 => Some(Observe::Deregister),
            _ => None,
        }
    }
}

/// Transport-assigned identity of one subscriber's relation (peer + token).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelationId(String);

impl RelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A request as handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    headers: Headers,
    content_format: Option<ContentFormat>,
    accept: Vec<ContentFormat>,
    payload: Bytes,
    observe: Option<Observe>,
    relation: Option<RelationId>,
}

impl Request {
    pub fn builder(method: Method, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, path)
    }

    pub fn get(path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(Method::Get, path)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Non-empty path segments.
    pub fn segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn content_format(&self) -> Option<ContentFormat> {
        self.content_format
    }

    /// Media type used for consumes matching.
    ///
    /// A request without a content-format is treated as octet-stream; an
    /// unregistered code yields `None` and only matches `*/*`.
    pub fn content_media_type(&self) -> Option<MediaType> {
        match self.content_format {
            None => Some(MediaType::octet_stream()),
            Some(format) => format.media_type(),
        }
    }

    pub fn accept(&self) -> &[ContentFormat] {
        &self.accept
    }

    /// Media types used for produces matching.
    ///
    /// Unregistered codes are skipped; `*/*` when no registered code remains.
    pub fn accepted_media_types(&self) -> Vec<MediaType> {
        let accepted: Vec<MediaType> = self.accept.iter().filter_map(|f| f.media_type()).collect();
        if accepted.is_empty() {
            return vec![MediaType::all()];
        }
        accepted
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn observe(&self) -> Option<Observe> {
        self.observe
    }

    pub fn relation(&self) -> Option<&RelationId> {
        self.relation.as_ref()
    }
}

/// Builder used by transport adapters and tests.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request: Request {
                method,
                path: path.into(),
                headers: Headers::new(),
                content_format: None,
                accept: Vec::new(),
                payload: Bytes::new(),
                observe: None,
                relation: None,
            },
        }
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.request.headers.append(name, value);
        self
    }

    pub fn content_format(mut self, format: impl Into<ContentFormat>) -> Self {
        self.request.content_format = Some(format.into());
        self
    }

    pub fn accept(mut self, format: impl Into<ContentFormat>) -> Self {
        self.request.accept.push(format.into());
        self
    }

    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.request.payload = payload.into();
        self
    }

    pub fn observe(mut self, observe: Observe) -> Self {
        self.request.observe = Some(observe);
        self
    }

    pub fn relation(mut self, relation: impl Into<RelationId>) -> Self {
        self.request.relation = Some(relation.into());
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}
