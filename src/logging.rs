//! Diagnostic logging.
//!
//! Maps [`ValidationLevel`] onto `tracing` levels and emits accumulated
//! diagnostics through whatever subscriber the host installed:
//! - FATAL and ERROR log at `ERROR`
//! - WARN, INFO and DEBUG log at the matching level

use crate::validation::{ValidationError, ValidationLevel};
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};
use tracing::Level;

/// Atomic threshold for which diagnostics get logged.
///
/// Stored as a u8: 0=Debug, 1=Info, 2=Warn, 3=Error, 4=Fatal.
#[derive(Debug)]
pub struct LevelThreshold(AtomicU8);

impl LevelThreshold {
    pub fn new(level: ValidationLevel) -> Self {
        Self(AtomicU8::new(level_to_u8(level)))
    }

    pub fn get(&self) -> ValidationLevel {
        u8_to_level(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, level: ValidationLevel) {
        self.0.store(level_to_u8(level), Ordering::Relaxed);
    }

    /// Check if a diagnostic at the given level should be logged.
    pub fn should_log(&self, level: ValidationLevel) -> bool {
        level_to_u8(level) >= self.0.load(Ordering::Relaxed)
    }
}

impl Default for LevelThreshold {
    fn default() -> Self {
        Self::new(ValidationLevel::Debug)
    }
}

fn level_to_u8(level: ValidationLevel) -> u8 {
    match level {
        ValidationLevel::Debug => 0,
        ValidationLevel::Info => 1,
        ValidationLevel::Warn => 2,
        ValidationLevel::Error => 3,
        ValidationLevel::Fatal => 4,
    }
}

fn u8_to_level(val: u8) -> ValidationLevel {
    match val {
        1 => ValidationLevel::Info,
        2 => ValidationLevel::Warn,
        3 => ValidationLevel::Error,
        4 => ValidationLevel::Fatal,
        _ => ValidationLevel::Debug,
    }
}

pub fn validation_level_to_tracing(level: ValidationLevel) -> Level {
    match level {
        ValidationLevel::Debug => Level::DEBUG,
        ValidationLevel::Info => Level::INFO,
        ValidationLevel::Warn => Level::WARN,
        ValidationLevel::Error | ValidationLevel::Fatal => Level::ERROR,
    }
}

fn emit(logger: Option<&str>, context: &str, error: &ValidationError) {
    let level = error.level();
    let logger = logger.unwrap_or("layerconf");
    match validation_level_to_tracing(level) {
        Level::ERROR => tracing::error!(logger, context, %level, "{}", error),
        Level::WARN => tracing::warn!(logger, context, %level, "{}", error),
        Level::INFO => tracing::info!(logger, context, %level, "{}", error),
        Level::DEBUG => tracing::debug!(logger, context, %level, "{}", error),
        Level::TRACE => tracing::trace!(logger, context, %level, "{}", error),
    }
}

/// Named diagnostic logger gated by a shared [`LevelThreshold`].
#[derive(Debug, Clone)]
pub struct DiagnosticLogger {
    threshold: Arc<LevelThreshold>,
    name: Option<String>,
}

impl DiagnosticLogger {
    pub fn new() -> Self {
        Self {
            threshold: Arc::new(LevelThreshold::default()),
            name: None,
        }
    }

    pub fn with_threshold(mut self, threshold: Arc<LevelThreshold>) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn threshold(&self) -> &Arc<LevelThreshold> {
        &self.threshold
    }

    /// Log every diagnostic at or above the threshold. Returns how many were logged.
    pub fn log(&self, context: &str, errors: &[ValidationError]) -> usize {
        let mut logged = 0;
        for error in errors {
            if self.threshold.should_log(error.level()) {
                emit(self.name.as_deref(), context, error);
                logged += 1;
            }
        }
        logged
    }
}

impl Default for DiagnosticLogger {
    fn default() -> Self {
        Self::new()
    }
}
