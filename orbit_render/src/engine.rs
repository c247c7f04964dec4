/// Orbit Engine - global logging façade
///
/// Every component reports through the `engine_*!` macros, which land here.
/// The active logger lives in thread-safe static storage so backends and
/// applications can swap it without threading a handle through every call.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

// ===== INTERNAL STATE =====

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Lowest severity forwarded to the logger (stored as `LogSeverity as u8`)
static MIN_SEVERITY: AtomicU8 = AtomicU8::new(LogSeverity::Trace as u8);

fn logger_lock() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)))
}

fn severity_from_u8(value: u8) -> LogSeverity {
    match value {
        0 => LogSeverity::Trace,
        1 => LogSeverity::Debug,
        2 => LogSeverity::Info,
        3 => LogSeverity::Warn,
        _ => LogSeverity::Error,
    }
}

// ===== PUBLIC API =====

/// Engine-wide services shared by every Orbit crate
///
/// # Example
///
/// ```no_run
/// use orbit_render::orbit::Engine;
/// use orbit_render::orbit::log::LogSeverity;
///
/// Engine::set_min_severity(LogSeverity::Info);
/// Engine::log(LogSeverity::Info, "orbit::demo", "Starting".to_string());
/// ```
pub struct Engine;

impl Engine {
    /// Set a custom logger
    ///
    /// Replaces the current logger (DefaultLogger by default).
    ///
    /// # Example
    ///
    /// ```no_run
    /// use orbit_render::orbit::Engine;
    /// use orbit_render::orbit::log::{Logger, LogEntry};
    ///
    /// struct FileLogger;
    ///
    /// impl Logger for FileLogger {
    ///     fn log(&self, entry: &LogEntry) {
    ///         // Write to file...
    ///     }
    /// }
    ///
    /// Engine::set_logger(FileLogger);
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        if let Ok(mut lock) = logger_lock().write() {
            *lock = Box::new(logger);
        }
    }

    /// Reset logger to default (DefaultLogger) and severity threshold to Trace
    pub fn reset_logger() {
        if let Ok(mut lock) = logger_lock().write() {
            *lock = Box::new(DefaultLogger);
        }
        MIN_SEVERITY.store(LogSeverity::Trace as u8, Ordering::Relaxed);
    }

    /// Drop every entry whose severity is below `severity`
    pub fn set_min_severity(severity: LogSeverity) {
        MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
    }

    /// Current severity threshold
    pub fn min_severity() -> LogSeverity {
        severity_from_u8(MIN_SEVERITY.load(Ordering::Relaxed))
    }

    /// Internal logging method (for simple logs without file:line)
    ///
    /// Used by macros like engine_info!, engine_warn!, etc.
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        Self::dispatch(LogEntry {
            severity,
            timestamp: SystemTime::now(),
            source: source.to_string(),
            message,
            file: None,
            line: None,
        });
    }

    /// Internal logging method with file:line information (for ERROR logs)
    ///
    /// Used by engine_error!, engine_err! and engine_bail! to include source location.
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        Self::dispatch(LogEntry {
            severity,
            timestamp: SystemTime::now(),
            source: source.to_string(),
            message,
            file: Some(file),
            line: Some(line),
        });
    }

    fn dispatch(entry: LogEntry) {
        if entry.severity < Self::min_severity() {
            return;
        }
        if let Ok(lock) = logger_lock().read() {
            lock.log(&entry);
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
