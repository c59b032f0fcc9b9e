//! Conventional metadata keys understood by the dispatch layer.
//!
//! Adapters map these onto broker-native headers or properties.

/// Domain event type, e.g. `"scale.published"`.
pub const EVENT_TYPE: &str = "event_type";

/// Aggregate kind the event belongs to, e.g. `"scale"`.
pub const AGGREGATE_TYPE: &str = "aggregate_type";

/// Identifier of the aggregate instance.
pub const AGGREGATE_ID: &str = "aggregate_id";

/// RFC 3339 UTC timestamp of when the event occurred.
pub const OCCURRED_AT: &str = "occurred_at";

/// Producing service or component.
pub const SOURCE: &str = "source";

/// Distributed trace ID
pub const TRACE_ID: &str = "trace_id";
