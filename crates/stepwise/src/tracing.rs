//! Tracing configuration for the stepwise CLI
//!
//! Diagnostics go to stderr through a `fmt` layer; structured pipeline events
//! (targets under `stepwise::` carrying an `event_type` field) are routed to
//! the run's event channel instead, where the CLI or JSON renderer picks them up.

use std::io;
use stepwise_events::{EVENT_TARGET_PREFIX, EventReceiver, StepwiseEventLayer, event_channel};
pub use tracing::Level;
use tracing::Metadata;
use tracing_subscriber::filter::{EnvFilter, FilterExt, filter_fn};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Tracing output format options
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum TracingFormat {
    /// Pretty-printed human-readable format
    Pretty,
    /// Compact single-line format
    Compact,
    /// Structured JSON format
    Json,
}

/// Log level options for CLI
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogLevel {
    /// Show all logs (trace level)
    Trace,
    /// Show debug and above
    Debug,
    /// Show info and above
    Info,
    /// Show warnings and above (default)
    Warn,
    /// Show errors only
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

impl std::str::FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown tracing format: {s}")),
        }
    }
}

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Diagnostic output format
    pub format: TracingFormat,
    /// Maximum level for stepwise crates
    pub level: Level,
    /// Explicit filter directives, overriding `RUST_LOG` and `level`
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::Compact,
            level: Level::WARN,
            filter: None,
        }
    }
}

fn env_filter(config: &TracingConfig) -> miette::Result<EnvFilter> {
    config
        .filter
        .as_ref()
        .map_or_else(
            || {
                EnvFilter::try_from_default_env().or_else(|_| {
                    let level = config.level.as_str().to_lowercase();
                    EnvFilter::try_new(format!(
                        "stepwise={level},stepwise_ci={level},stepwise_core={level},stepwise_events={level}"
                    ))
                })
            },
            EnvFilter::try_new,
        )
        .map_err(|e| miette::miette!("Failed to create tracing filter: {e}"))
}

/// Structured events go to the renderer, never to the fmt layer.
fn is_structured_event(metadata: &Metadata<'_>) -> bool {
    metadata.target().starts_with(EVENT_TARGET_PREFIX)
        && metadata.fields().field("event_type").is_some()
}

/// Initialize tracing and route structured events into a new event channel.
///
/// The returned receiver sees every event emitted after this call, up to
/// the shutdown event.
///
/// # Errors
///
/// Returns an error if the filter is invalid or a global subscriber is
/// already installed.
pub fn init_tracing_with_events(config: &TracingConfig) -> miette::Result<EventReceiver> {
    let (sender, receiver) = event_channel();
    let event_layer = StepwiseEventLayer::new(sender);

    let diagnostics = env_filter(config)?.and(filter_fn(|metadata| !is_structured_event(metadata)));
    let registry = tracing_subscriber::registry().with(event_layer);

    let result = match config.format {
        TracingFormat::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(io::stderr)
                .with_target(true)
                .with_filter(diagnostics);
            registry.with(layer).try_init()
        }
        TracingFormat::Compact => {
            let layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(diagnostics);
            registry.with(layer).try_init()
        }
        TracingFormat::Json => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_current_span(true)
                .with_filter(diagnostics);
            registry.with(layer).try_init()
        }
    };
    result.map_err(|e| miette::miette!("Failed to initialize tracing: {e}"))?;

    tracing::debug!(
        correlation_id = %stepwise_events::correlation_id(),
        version = env!("CARGO_PKG_VERSION"),
        format = ?config.format,
        "Tracing initialized"
    );

    Ok(receiver)
}
