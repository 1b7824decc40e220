//! Logging Module
//!
//! Structured logging through the `tracing` crate. The binary installs a
//! global `FmtSubscriber`; library code only emits events.

use std::str::FromStr;
use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use super::error::{PlateOcrError, Result};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include the target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose config, shows every block as it is built
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Errors only
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl FromStr for LogLevel {
    type Err = PlateOcrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(PlateOcrError::Config(format!("unknown log level '{}'", other))),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Initialize logging with the given configuration
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| PlateOcrError::Config(format!("Failed to initialize logging: {}", e)))
}

/// Progress logger for long-running loops
pub struct ProgressLogger {
    operation: String,
    total: usize,
    current: usize,
    /// Log every N items
    log_interval: usize,
    start_time: Instant,
}

impl ProgressLogger {
    pub fn new(operation: &str, total: usize) -> Self {
        Self {
            operation: operation.to_string(),
            total,
            current: 0,
            log_interval: (total / 10).max(1),
            start_time: Instant::now(),
        }
    }

    /// Create with custom log interval
    pub fn with_interval(mut self, interval: usize) -> Self {
        self.log_interval = interval.max(1);
        self
    }

    /// Update progress
    pub fn update(&mut self, count: usize) {
        self.current = count.min(self.total);

        if self.current % self.log_interval == 0 || self.current == self.total {
            let percentage = if self.total == 0 {
                100.0
            } else {
                100.0 * self.current as f64 / self.total as f64
            };
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let items_per_sec = if elapsed > 0.0 {
                self.current as f64 / elapsed
            } else {
                0.0
            };

            tracing::debug!(
                "{}: {}/{} ({:.1}%) - {:.1} items/s",
                self.operation,
                self.current,
                self.total,
                percentage,
                items_per_sec,
            );
        }
    }

    /// Increment progress by 1
    pub fn increment(&mut self) {
        self.update(self.current + 1);
    }

    /// Log completion
    pub fn finish(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();

        tracing::info!(
            "{}: Completed {} items in {:.2}s",
            self.operation,
            self.total,
            elapsed,
        );
    }
}
