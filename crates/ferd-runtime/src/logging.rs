//! Logging setup for Ferd bots.
//!
//! Every Ferd crate logs through `tracing`; this module installs the global
//! subscriber from a [`LoggingConfig`]. Each inbound message is dispatched
//! inside a `dispatch` span carrying the sender's `user_id`, so turning on
//! `span_events.new` and `span_events.close` brackets everything the
//! listeners log for one message.
//!
//! `RUST_LOG`, when set, replaces the configured base level. The per-module
//! `filters` are applied on top in both cases.
//!
//! ```rust,ignore
//! let config = ferd_runtime::config::load_config()?;
//! ferd_runtime::logging::try_init_from_config(&config.logging)?;
//! ```

use std::ffi::OsStr;
use std::path::Path;

use thiserror::Error;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogOutput, LogRotation, LoggingConfig, SpanEventConfig};

const DEFAULT_LOG_FILE: &str = "ferd.log";

/// Errors raised while installing the subscriber.
#[derive(Error, Debug)]
pub enum LoggingError {
    /// The log file or its directory could not be opened.
    #[error("cannot open log file: {0}")]
    File(#[from] InitError),

    /// A global subscriber is already installed.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Installs the global subscriber, ignoring failures.
///
/// Returns `true` if this call installed it.
pub fn init_from_config(config: &LoggingConfig) -> bool {
    try_init_from_config(config).is_ok()
}

/// Installs the global subscriber described by `config`.
pub fn try_init_from_config(config: &LoggingConfig) -> Result<(), LoggingError> {
    let writer = make_writer(config)?;

    tracing_subscriber::registry()
        .with(fmt_layer(config, writer))
        .with(build_filter(config))
        .try_init()?;
    Ok(())
}

/// Builds the level filter: `RUST_LOG` or the configured level, then the
/// per-module overrides.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let base = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    filter_directives(config)
        .into_iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(base, EnvFilter::add_directive)
}

/// Per-module directives in module order, e.g. `ferd_core=debug`.
fn filter_directives(config: &LoggingConfig) -> Vec<String> {
    let mut directives: Vec<String> = config
        .filters
        .iter()
        .map(|(module, level)| format!("{module}={}", level.as_str()))
        .collect();
    directives.sort();
    directives
}

fn fmt_span(events: &SpanEventConfig) -> FmtSpan {
    [
        (events.new, FmtSpan::NEW),
        (events.enter, FmtSpan::ENTER),
        (events.exit, FmtSpan::EXIT),
        (events.close, FmtSpan::CLOSE),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .fold(FmtSpan::NONE, |acc, (_, flag)| acc | flag)
}

fn fmt_layer(config: &LoggingConfig, writer: BoxMakeWriter) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = fmt::layer()
        .with_writer(writer)
        .with_span_events(fmt_span(&config.span_events))
        .with_thread_ids(config.thread_ids)
        .with_file(config.file_location)
        .with_line_number(config.file_location);

    match config.format {
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Full => layer.boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        #[cfg(feature = "json-log")]
        LogFormat::Json => layer.json().boxed(),
    }
}

fn make_writer(config: &LoggingConfig) -> Result<BoxMakeWriter, InitError> {
    let writer = match (config.output, &config.file_path) {
        (LogOutput::Stderr, _) => BoxMakeWriter::new(std::io::stderr),
        (LogOutput::File, Some(path)) => BoxMakeWriter::new(open_log_file(path, config.rotation)?),
        // File output without a path is rejected by `validate_config`.
        (LogOutput::Stdout | LogOutput::File, _) => BoxMakeWriter::new(std::io::stdout),
    };
    Ok(writer)
}

fn open_log_file(path: &Path, rotation: LogRotation) -> Result<RollingFileAppender, InitError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path.file_name().unwrap_or_else(|| OsStr::new(DEFAULT_LOG_FILE));
    let rotation = match rotation {
        LogRotation::Never => Rotation::NEVER,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
    };

    RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(name.to_string_lossy().into_owned())
        .build(dir)
}
