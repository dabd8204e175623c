use std::path::PathBuf;

use once_cell::sync::OnceCell;
use receipts_topics::DELIVERY_LOG_TARGET;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::registry::{LookupSpan, Registry};
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

static DELIVERY_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Rolling file sink for `receipts.delivery` records, enabled with `RECEIPTS_LOG_ROLL=1`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryLog {
    pub dir: PathBuf,
    pub prefix: String,
    pub rotation: Rotation,
}

impl DeliveryLog {
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        match lookup("RECEIPTS_LOG_ROLL")?.trim() {
            "1" | "true" => {}
            _ => return None,
        }
        let rotation = match lookup("RECEIPTS_LOG_ROTATION")
            .map(|raw| raw.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("hourly") => Rotation::HOURLY,
            Some("minutely") => Rotation::MINUTELY,
            _ => Rotation::DAILY,
        };
        Some(Self {
            dir: lookup("RECEIPTS_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
            prefix: lookup("RECEIPTS_LOG_PREFIX").unwrap_or_else(|| "receipts-delivery".into()),
            rotation,
        })
    }

    /// Non-blocking file layer that only accepts the delivery target.
    /// Records are flushed when the returned guard drops.
    pub fn layer<S>(&self) -> (impl Layer<S>, WorkerGuard)
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        if std::fs::create_dir_all(&self.dir).is_err() {
            tracing::warn!(directory = %self.dir.display(), "failed to create delivery log directory");
        }
        let appender = RollingFileAppender::new(self.rotation.clone(), &self.dir, &self.prefix);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(writer)
            .with_filter(Targets::new().with_target(DELIVERY_LOG_TARGET, tracing::Level::DEBUG));
        (layer, guard)
    }
}

/// Install the global subscriber: `RUST_LOG` (default `info`) to stderr, plus
/// the delivery log when configured. Later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let delivery = DeliveryLog::from_env().map(|log| {
        let (layer, guard) = log.layer::<Registry>();
        let _ = DELIVERY_GUARD.set(guard);
        layer
    });
    let _ = tracing_subscriber::registry()
        .with(delivery)
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .try_init();
}
