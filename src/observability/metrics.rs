//! Metrics collection.
//!
//! # Responsibilities
//! - Define dispatcher and observation metrics
//! - Keep metric names and labels in one place
//!
//! # Metrics
//! - `coap_dispatch_requests_total` (counter): dispatches by method, code
//! - `coap_dispatch_duration_seconds` (histogram): dispatch latency
//! - `coap_dispatch_lookup_misses_total` (counter): requests with no handler
//! - `coap_observe_relations_active` (gauge): live observation relations
//! - `coap_observe_notifications_total` (counter): notifications pushed
//! - `coap_observe_stream_failures_total` (counter): relations ended by a
//!   failing stream
//!
//! # Design Decisions
//! - Uses the `metrics` facade only; the host installs an exporter
//! - Without an installed recorder every call is a no-op

use std::time::Instant;

use crate::message::{Method, ResponseCode};

pub fn record_dispatch(method: Method, code: Option<ResponseCode>, started: Instant) {
    let code = code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string());
    metrics::counter!(
        "coap_dispatch_requests_total",
        "method" => method.as_str(),
        "code" => code
    )
    .increment(1);
    metrics::histogram!("coap_dispatch_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_lookup_miss() {
    metrics::counter!("coap_dispatch_lookup_misses_total").increment(1);
}

pub fn record_active_relations(count: usize) {
    metrics::gauge!("coap_observe_relations_active").set(count as f64);
}

pub fn record_notification() {
    metrics::counter!("coap_observe_notifications_total").increment(1);
}

pub fn record_stream_failure() {
    metrics::counter!("coap_observe_stream_failures_total").increment(1);
}
