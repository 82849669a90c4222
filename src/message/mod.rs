//! Request/response message model.
//!
//! # Data Flow
//! ```text
//! transport adapter (external)
//!     → request.rs (Request: method, path, options, content-format, payload)
//!     → [dispatcher routes and invokes]
//!     → response.rs (Response: code, payload, observe sequence)
//!     → transport adapter serialises
//! ```
//!
//! # Design Decisions
//! - Requests are read-only once built; the dispatcher shares them via `Arc`
//! - Responses start empty; an empty code means "pick the default success code"
//! - Content-formats are numeric codes, mapped to media types for matching

pub mod code;
pub mod media;
pub mod method;
pub mod request;
pub mod response;

pub use code::ResponseCode;
pub use media::{ContentFormat, MediaType};
pub use method::Method;
pub use request::{Headers, Observe, RelationId, Request, RequestBuilder};
pub use response::{Payload, Response};
