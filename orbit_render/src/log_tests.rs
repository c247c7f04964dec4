//! Unit tests for log.rs
//!
//! The global-logger paths live in engine_tests.rs; these cover the entry
//! type, the severity order the threshold relies on and the macros that
//! build errors.

use serial_test::serial;
use std::time::SystemTime;
use super::*;
use crate::orbit::{Engine, Error};
use crate::test_utils::CaptureLogger;

fn entry(severity: LogSeverity, file: Option<&'static str>, line: Option<u32>) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "orbit::buffer".to_string(),
        message: "'instances' capacity 4 → 8".to_string(),
        file,
        line,
    }
}

#[test]
fn test_severity_order_matches_threshold() {
    let ordered = [
        LogSeverity::Trace,
        LogSeverity::Debug,
        LogSeverity::Info,
        LogSeverity::Warn,
        LogSeverity::Error,
    ];
    for pair in ordered.windows(2) {
        assert!(pair[0] < pair[1], "{:?} should sort below {:?}", pair[0], pair[1]);
    }
    assert_eq!(ordered.iter().max(), Some(&LogSeverity::Error));
}

#[test]
fn test_default_logger_accepts_plain_and_located_entries() {
    let logger = DefaultLogger;
    logger.log(&entry(LogSeverity::Debug, None, None));
    logger.log(&entry(LogSeverity::Error, Some("frame_loop.rs"), Some(252)));
}

#[test]
#[serial]
fn test_engine_err_records_call_site() {
    Engine::reset_logger();
    let logger = CaptureLogger::install();

    let line = line!() + 1;
    let err = crate::engine_err!("orbit::frame", "Swapchain lost on frame {}", 7);

    assert_eq!(err, Error::BackendError("Swapchain lost on frame 7".to_string()));
    let entries = logger.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].source, "orbit::frame");
    assert_eq!(entries[0].file, Some(file!()));
    assert_eq!(entries[0].line, Some(line));
    drop(entries);
    Engine::reset_logger();
}

#[test]
#[serial]
fn test_engine_bail_skips_rest_of_function() {
    Engine::reset_logger();
    let logger = CaptureLogger::install();

    fn reserve(capacity: u32, reached: &mut bool) -> crate::orbit::Result<u32> {
        if capacity == 0 {
            crate::engine_bail!("orbit::buffer", "capacity must be non-zero");
        }
        *reached = true;
        Ok(capacity)
    }

    let mut reached = false;
    assert!(matches!(reserve(0, &mut reached), Err(Error::BackendError(_))));
    assert!(!reached);
    assert!(logger.contains(LogSeverity::Error, "capacity must be non-zero"));

    assert_eq!(reserve(4, &mut reached), Ok(4));
    assert!(reached);
    Engine::reset_logger();
}

#[test]
#[serial]
fn test_filtered_macros_do_not_reach_logger() {
    Engine::reset_logger();
    let logger = CaptureLogger::install();
    Engine::set_min_severity(LogSeverity::Info);

    crate::engine_trace!("orbit::buffer", "uploaded {} vertices", 3);
    crate::engine_debug!("orbit::frame", "Descriptor sets rebuilt");
    crate::engine_info!("orbit::frame", "Frame loop ready");

    assert_eq!(logger.count(LogSeverity::Trace), 0);
    assert_eq!(logger.count(LogSeverity::Debug), 0);
    assert_eq!(logger.count(LogSeverity::Info), 1);
    Engine::reset_logger();
}
