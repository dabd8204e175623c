//! Read-receipt delivery pipeline.
//!
//! Visibility events are admitted once per message id, marked read locally
//! right away, then batched by count or time and acknowledged to the server
//! one batch at a time, gated on connectivity and retried with exponential
//! backoff.
//!
//! ```text
//! admit -> dedup -> intake queue -> batcher -> network gate -> dispatcher -> endpoint
//!            \-> optimistic read state
//! ```

mod admission;
mod batcher;
mod config;
mod dedup;
mod dispatch;
mod gate;
mod ids;
pub mod intake;
mod optimistic;
mod pipeline;
mod retry;
mod stats;
pub mod tasks;
#[cfg(test)]
mod test_support;

pub use admission::ReceiptTracker;
pub use batcher::Window;
pub use config::{
    config_schema_json, env_bool, env_u64, load_config, load_toml, parse_bool_flag, parse_toml,
    ConfigError, PipelineConfig, DEFAULT_MAX_BATCH_SIZE, DEFAULT_RETRY_BASE_MS,
    DEFAULT_RETRY_MAX_ATTEMPTS, DEFAULT_WINDOW_MS, MAX_BATCH_SIZE_LIMIT,
};
pub use dispatch::{AckError, Acknowledger, DeliveryOutcome, Dispatcher};
pub use gate::{GateState, NetworkGate};
pub use ids::{Batch, MessageId};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineError};
pub use retry::RetryPolicy;
pub use stats::{PipelineStats, StatsSnapshot};
