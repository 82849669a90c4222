//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path, options, content-format, accept)
//!     → lookup.rs (collect matches, rank, reject ties)
//!     → route.rs (evaluate the combined condition set)
//!     → condition/* (consumes → headers → produces → methods → patterns)
//!     → Return: HandlerMatch or explicit no-match
//!
//! Route Registration (at startup):
//!     RouteSpec records + handler references
//!     → route.rs (parse into typed conditions, combine type/method level)
//!     → registry.rs (reject duplicates, index literal paths)
//!     → Freeze as immutable HandlerMapping
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in the hot path (segment-wise patterns)
//! - Deterministic: same input always matches same route, ties are errors

pub mod condition;
pub mod lookup;
pub mod pattern;
pub mod registry;
pub mod route;

pub use lookup::{HandlerMapping, HandlerMatch, NoMatchReason};
pub use pattern::{PathPattern, PathVariables};
pub use registry::{MappingRegistry, RegistryEntry};
pub use route::{Route, RouteSpec};
