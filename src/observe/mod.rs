//! Observe subsystem: per-relation observation state, the relation registry
//! and the transport notification seam.
//!
//! # Data Flow
//! ```text
//! Dispatcher (observe = register)
//!     → registry.rs (claim: owner / joiner / full)
//!     → context.rs (state machine, cached last emission)
//!     → registry.rs driver task (stream → notifier)
//!     → notifier.rs (transport adapter callbacks)
//! ```
//!
//! # Design Decisions
//! - One context per (resource, relation); contexts are never shared across
//!   subscribers
//! - Cancellation is idempotent and races with emissions by construction

pub mod context;
pub mod notifier;
pub mod registry;

pub use context::{
    CloseReason, Emission, ObservationContext, ObservationHandle, ObservationState, RelationKey,
};
pub use notifier::{ChannelNotifier, NoopNotifier, Notifier, RelationEvent};
pub use registry::{Claim, RelationRegistry};
