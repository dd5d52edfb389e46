//! Logging setup
//!
//! `Telemetry::init` installs the global `tracing` subscriber: an `EnvFilter`,
//! a stderr formatting layer and, when a log directory is configured, a
//! daily-rolling file layer behind a non-blocking writer. The returned
//! handle owns the writer guard; dropping it (or calling `shutdown`) flushes
//! buffered file output.

use crate::error::{QualityError, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

const DEFAULT_FILTER: &str = "beverage_quality=info";
const LOG_FILE_PREFIX: &str = "beverage_quality.log";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub default_filter: String,
    /// Directory for daily-rolling log files; `None` logs to stderr only
    pub log_dir: Option<PathBuf>,
    /// Show module targets in stderr output
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            default_filter: DEFAULT_FILTER.to_string(),
            log_dir: None,
            with_target: false,
        }
    }
}

impl TelemetryConfig {
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    /// Map a `-v` count to a filter: 0 info, 1 debug, 2+ trace
    pub fn with_verbosity(self, verbose: u8) -> Self {
        let level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        self.with_filter(format!("beverage_quality={}", level))
    }
}

/// Handle to the installed subscriber
pub struct Telemetry {
    guard: Option<WorkerGuard>,
    installed: bool,
}

impl Telemetry {
    /// Install the global subscriber. A second installation in the same
    /// process leaves the first one in place and returns an inert handle.
    pub fn init(config: TelemetryConfig) -> Result<Self> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.default_filter))
            .map_err(|e| QualityError::InvalidConfig(format!("log filter: {}", e)))?;

        let console = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(config.with_target)
            .boxed();

        let (file, guard) = match &config.log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let (writer, guard) = non_blocking(rolling::daily(dir, LOG_FILE_PREFIX));
                let layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_line_number(true)
                    .boxed();
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        let layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = std::iter::once(console).chain(file).collect();
        let installed = Registry::default()
            .with(layers)
            .with(filter)
            .try_init()
            .is_ok();

        if installed {
            tracing::debug!(log_dir = ?config.log_dir, "Telemetry initialised");
        }
        Ok(Self { guard, installed })
    }

    /// Whether this handle installed the global subscriber
    pub fn is_installed(&self) -> bool {
        self.installed
    }

    /// Flush and release the file writer
    pub fn shutdown(mut self) {
        self.guard.take();
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        self.guard.take();
    }
}
