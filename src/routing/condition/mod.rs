//! Composable request conditions.
//!
//! # Responsibilities
//! - One condition type per request facet: path, method, header,
//!   consumes (content-format) and produces (accept)
//! - Each can combine with a method-level counterpart, narrow itself to
//!   what a request matched, and rank against another matched instance
//!
//! # Design Decisions
//! - A non-match is `None`, never an error
//! - `compare_to` is only meaningful between two conditions already
//!   narrowed for the same request; `Less` means more specific
//! - Empty conditions match everything

use std::cmp::Ordering;

use crate::message::Request;

pub mod header;
pub mod media;
pub mod method;
pub mod path;

pub use header::{HeaderCondition, HeaderExpr};
pub use media::{ConsumesCondition, MediaExpr, ProducesCondition};
pub use method::MethodCondition;
pub use path::PathCondition;

/// Contract shared by every condition type.
pub trait RequestCondition: Sized {
    /// Combine a type-level condition (`self`) with a method-level one.
    fn combine(&self, other: &Self) -> Self;

    /// The part of this condition that matches `request`, or `None`.
    fn matching_condition(&self, request: &Request) -> Option<Self>;

    /// Specificity ordering of two matched conditions.
    fn compare_to(&self, other: &Self, request: &Request) -> Ordering;

    fn is_empty(&self) -> bool;
}
