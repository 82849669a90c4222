//! Exchange spans.
//!
//! # Responsibilities
//! - Tag every dispatch with an exchange ID
//! - Carry method and path so nested events need not repeat them
//!
//! # Design Decisions
//! - Exchange IDs are random UUIDs; the transport's own message IDs are not
//!   unique across peers

use tracing::Span;
use uuid::Uuid;

use crate::message::Request;

pub fn new_exchange_id() -> Uuid {
    Uuid::new_v4()
}

/// Span wrapping one dispatch.
pub fn dispatch_span(exchange_id: Uuid, request: &Request) -> Span {
    tracing::info_span!(
        "dispatch",
        exchange_id = %exchange_id,
        method = %request.method(),
        path = request.path(),
        observe = ?request.observe(),
    )
}
