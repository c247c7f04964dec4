//! Shared helpers for unit tests

use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use crate::log::{LogEntry, LogSeverity, Logger};

/// Logger that keeps every entry emitted from the thread that installed it
///
/// Tests run on their own threads, so filtering by thread keeps entries
/// from concurrently running tests out of the capture.
#[derive(Clone)]
pub(crate) struct CaptureLogger {
    pub entries: Arc<Mutex<Vec<LogEntry>>>,
    thread: ThreadId,
}

impl CaptureLogger {
    /// Install a fresh capture logger as the engine logger
    pub fn install() -> Self {
        let logger = Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            thread: thread::current().id(),
        };
        crate::engine::Engine::set_logger(logger.clone());
        logger
    }

    pub fn count(&self, severity: LogSeverity) -> usize {
        self.entries.lock().unwrap().iter().filter(|e| e.severity == severity).count()
    }

    pub fn contains(&self, severity: LogSeverity, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.severity == severity && e.message.contains(needle))
    }
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        if thread::current().id() == self.thread {
            self.entries.lock().unwrap().push(entry.clone());
        }
    }
}
