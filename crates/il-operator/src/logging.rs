//! Process-wide log subscriber setup.
//!
//! Call sites use the `log` macros; reconciles open `tracing` spans. The
//! `LogTracer` bridge forwards `log` records into the tracing subscriber so
//! both end up in the same output with span context attached.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingSettings};

/// Installs the global subscriber. Returns `false` if one was already installed.
pub fn init_logging(settings: &LoggingSettings) -> bool {
    let filter = EnvFilter::try_new(&settings.level).unwrap_or_else(|e| {
        eprintln!(
            "invalid log filter '{}': {}; falling back to 'info'",
            settings.level, e
        );
        EnvFilter::new("info")
    });

    let output: Box<dyn Layer<Registry> + Send + Sync> = match settings.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
    };

    let subscriber = Registry::default().with(output).with(filter);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }

    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::warn!("log records will not be forwarded to tracing: {}", e);
    }
    true
}
