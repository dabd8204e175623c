//! Canonical event topic constants for the read-receipt pipeline.
//!
//! Publishers and subscribers both import from here so the strings never
//! drift. Keep the list grouped by stage and favor dot.case names.

// Batching
pub const TOPIC_BATCH_FORMED: &str = "receipts.batch.formed";

// Delivery
pub const TOPIC_BATCH_RETRYING: &str = "receipts.batch.retrying";
pub const TOPIC_BATCH_DELIVERED: &str = "receipts.batch.delivered";
pub const TOPIC_BATCH_FAILED: &str = "receipts.batch.failed";

// Connectivity
pub const TOPIC_GATE_CHANGED: &str = "receipts.gate.changed";

// Lifecycle
pub const TOPIC_PIPELINE_STARTED: &str = "receipts.pipeline.started";
pub const TOPIC_PIPELINE_STOPPED: &str = "receipts.pipeline.stopped";

// Tracing target for per-batch delivery records (also routed to the rolling log)
pub const DELIVERY_LOG_TARGET: &str = "receipts.delivery";
