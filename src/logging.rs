//! Logging setup for component-injector
//!
//! The container emits `tracing` events under the `component_injector`
//! target: container lifecycle at INFO, construction and scanning at DEBUG,
//! registry hits and field injection at TRACE, cycles and failed bootstraps
//! at ERROR. This module installs a subscriber for applications that do not
//! bring their own.
//!
//! # Features
//!
//! - `logging` - Emit events (default)
//! - `logging-json` - JSON subscriber output
//! - `logging-pretty` - Human-readable subscriber output
//!
//! A `RUST_LOG` environment variable always takes precedence over the level
//! configured here.
//!
//! # Example
//!
//! ```rust,ignore
//! use component_injector::logging;
//!
//! logging::builder()
//!     .trace()
//!     .injector_only()
//!     .pretty()
//!     .init();
//! ```

use tracing::Level;

/// Target used by every event this crate emits
pub const TARGET: &str = "component_injector";

/// Subscriber output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Multi-line, human-readable
    Pretty,
    /// Single line per event
    Compact,
}

/// Builder for the global subscriber
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    with_file: bool,
    with_line_number: bool,
    with_thread_ids: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::default(),
            target: None,
            with_file: false,
            with_line_number: false,
            with_thread_ids: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Everything, including registry hits
    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    /// Construction, scanning and hook execution
    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    /// Container lifecycle only
    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    /// Only show events from `target`
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only show events from this crate
    pub fn injector_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    pub fn with_thread_ids(mut self) -> Self {
        self.with_thread_ids = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Filter directive used when `RUST_LOG` is not set
    pub fn directive(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        match self.target {
            Some(target) => format!("{target}={level}"),
            None => level,
        }
    }

    /// Install the subscriber globally. Returns `false` when another
    /// subscriber was installed first.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) -> bool {
        use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()));

        let output: Box<dyn Layer<Registry> + Send + Sync> = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => fmt::layer()
                .json()
                .with_file(self.with_file)
                .with_line_number(self.with_line_number)
                .with_thread_ids(self.with_thread_ids)
                .boxed(),
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => fmt::layer()
                .with_file(self.with_file)
                .with_line_number(self.with_line_number)
                .with_thread_ids(self.with_thread_ids)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_file(self.with_file)
                .with_line_number(self.with_line_number)
                .with_thread_ids(self.with_thread_ids)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .compact()
                .with_file(self.with_file)
                .with_line_number(self.with_line_number)
                .with_thread_ids(self.with_thread_ids)
                .boxed(),
        };

        tracing_subscriber::registry()
            .with(output)
            .with(filter)
            .try_init()
            .is_ok()
    }

    /// Without a subscriber feature there is nothing to install
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) -> bool {
        false
    }
}

pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Install the default subscriber: JSON when `logging-json` is enabled,
/// pretty otherwise.
pub fn init() -> bool {
    if cfg!(feature = "logging-json") {
        init_json()
    } else {
        init_pretty()
    }
}

pub fn init_json() -> bool {
    builder().json().debug().init()
}

pub fn init_pretty() -> bool {
    builder().pretty().debug().init()
}

/// Debug output from this crate only
pub fn init_injector_only() -> bool {
    builder().injector_only().debug().init()
}
