//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → tracing.rs (dispatch spans with exchange IDs)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON)
//!     → Metrics exporter installed by the host
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Exchange ID flows through every event of a dispatch
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
pub mod tracing;
