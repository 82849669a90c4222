//! Content-formats and media types.
//!
//! # Responsibilities
//! - Map numeric content-format codes to media types and back
//! - Parse media type strings, including `*/*`, `type/*` and `type/*+suffix`
//! - Decide inclusion/compatibility for consumes and produces matching
//!
//! # Design Decisions
//! - Media type parameters (`;charset=...`) are dropped when parsing;
//!   content-format codes already pin the encoding
//! - Type and subtype are stored lowercase

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Registered content-format codes and their media types.
const REGISTRY: &[(u16, &str, &str)] = &[
    (0, "text", "plain"),
    (40, "application", "link-format"),
    (41, "application", "xml"),
    (42, "application", "octet-stream"),
    (47, "application", "exi"),
    (50, "application", "json"),
    (51, "application", "json-patch+json"),
    (52, "application", "merge-patch+json"),
    (60, "application", "cbor"),
    (110, "application", "senml+json"),
    (112, "application", "senml+cbor"),
];

/// Numeric content-format code carried in requests and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentFormat(pub u16);

impl ContentFormat {
    pub const TEXT_PLAIN: ContentFormat = ContentFormat(0);
    pub const LINK_FORMAT: ContentFormat = ContentFormat(40);
    pub const XML: ContentFormat = ContentFormat(41);
    pub const OCTET_STREAM: ContentFormat = ContentFormat(42);
    pub const EXI: ContentFormat = ContentFormat(47);
    pub const JSON: ContentFormat = ContentFormat(50);
    pub const CBOR: ContentFormat = ContentFormat(60);
    pub const SENML_JSON: ContentFormat = ContentFormat(110);

    pub fn code(self) -> u16 {
        self.0
    }

    /// Media type registered for this code, if any.
    pub fn media_type(self) -> Option<MediaType> {
        REGISTRY
            .iter()
            .find(|(code, _, _)| *code == self.0)
            .map(|(_, t, s)| MediaType::new(t, s))
    }
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.media_type() {
            Some(media) => write!(f, "{} ({})", media, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<u16> for ContentFormat {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

/// Media type or media range such as `application/json` or `text/*`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MediaType {
    type_: String,
    subtype: String,
}

/// Returned when a media type string or content-format code cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid media type `{0}`")]
pub struct InvalidMediaType(pub String);

impl MediaType {
    pub fn new(type_: &str, subtype: &str) -> Self {
        Self {
            type_: type_.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
        }
    }

    pub fn all() -> Self {
        Self::new("*", "*")
    }

    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    pub fn type_(&self) -> &str {
        &self.type_
    }

    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    pub fn is_wildcard_type(&self) -> bool {
        self.type_ == "*"
    }

    pub fn is_wildcard_subtype(&self) -> bool {
        self.subtype == "*" || self.subtype.starts_with("*+")
    }

    pub fn is_concrete(&self) -> bool {
        !self.is_wildcard_type() && !self.is_wildcard_subtype()
    }

    /// Structured syntax suffix, e.g. `json` for `senml+json`.
    pub fn suffix(&self) -> Option<&str> {
        self.subtype.rsplit_once('+').map(|(_, suffix)| suffix)
    }

    /// Registered content-format for this concrete type.
    pub fn content_format(&self) -> Option<ContentFormat> {
        REGISTRY
            .iter()
            .find(|(_, t, s)| *t == self.type_ && *s == self.subtype)
            .map(|(code, _, _)| ContentFormat(*code))
    }

    /// Whether this range contains `other`. Not symmetric.
    pub fn includes(&self, other: &MediaType) -> bool {
        if self.is_wildcard_type() {
            return true;
        }
        if self.type_ != other.type_ {
            return false;
        }
        if self.subtype == other.subtype || self.subtype == "*" {
            return true;
        }
        // `application/*+json` includes `application/senml+json`
        match self.subtype.strip_prefix("*+") {
            Some(suffix) => other.suffix() == Some(suffix),
            None => false,
        }
    }

    pub fn is_compatible_with(&self, other: &MediaType) -> bool {
        self.includes(other) || other.includes(self)
    }

    /// Lower is more specific: concrete, suffix wildcard, subtype wildcard, `*/*`.
    fn specificity_rank(&self) -> u8 {
        if self.is_wildcard_type() {
            3
        } else if self.subtype == "*" {
            2
        } else if self.subtype.starts_with("*+") {
            1
        } else {
            0
        }
    }

    pub fn compare_specificity(&self, other: &MediaType) -> Ordering {
        self.specificity_rank().cmp(&other.specificity_rank())
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)
    }
}

impl FromStr for MediaType {
    type Err = InvalidMediaType;

    /// Accepts `type/subtype[;params]`, a bare `*`, or a numeric content-format code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u16>() {
            return ContentFormat(code)
                .media_type()
                .ok_or_else(|| InvalidMediaType(s.to_string()));
        }
        if trimmed == "*" {
            return Ok(Self::all());
        }
        let essence = trimmed.split(';').next().unwrap_or_default().trim();
        let (type_, subtype) = essence
            .split_once('/')
            .ok_or_else(|| InvalidMediaType(s.to_string()))?;
        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "!#$&-^_.+*".contains(c))
        };
        if !valid(type_) || !valid(subtype) {
            return Err(InvalidMediaType(s.to_string()));
        }
        if type_ == "*" && subtype != "*" {
            return Err(InvalidMediaType(s.to_string()));
        }
        Ok(Self::new(type_, subtype))
    }
}
