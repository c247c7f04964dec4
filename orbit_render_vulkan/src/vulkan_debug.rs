/// Vulkan debug messenger - validation layer messages with colored output
///
/// Only compiled with the `vulkan-validation` feature. Severity filtering is
/// done by the messenger's severity flags; the callback prints and counts.

use ash::vk;
use colored::*;
use std::ffi::CStr;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::vulkan_config::DebugSeverity;

static ERRORS: AtomicU32 = AtomicU32::new(0);
static WARNINGS: AtomicU32 = AtomicU32::new(0);
static OTHERS: AtomicU32 = AtomicU32::new(0);

/// Validation message counters since the last device creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    /// Info and verbose messages
    pub others: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.others
    }
}

pub fn validation_stats() -> ValidationStats {
    ValidationStats {
        errors: ERRORS.load(Ordering::Relaxed),
        warnings: WARNINGS.load(Ordering::Relaxed),
        others: OTHERS.load(Ordering::Relaxed),
    }
}

pub(crate) fn reset_validation_stats() {
    ERRORS.store(0, Ordering::Relaxed);
    WARNINGS.store(0, Ordering::Relaxed);
    OTHERS.store(0, Ordering::Relaxed);
}

pub(crate) fn severity_flags(severity: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    match severity {
        DebugSeverity::ErrorsOnly => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        DebugSeverity::ErrorsAndWarnings => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        }
        DebugSeverity::All => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        }
    }
}

/// Vulkan debug messenger callback
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = *p_callback_data;
    let message_id_name = if callback_data.p_message_id_name.is_null() {
        "Unknown"
    } else {
        CStr::from_ptr(callback_data.p_message_id_name)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };
    let message = if callback_data.p_message.is_null() {
        "No message"
    } else {
        CStr::from_ptr(callback_data.p_message)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };

    let severity_colored =
        if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            ERRORS.fetch_add(1, Ordering::Relaxed);
            "ERROR".red().bold()
        } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            WARNINGS.fetch_add(1, Ordering::Relaxed);
            "WARNING".yellow().bold()
        } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            OTHERS.fetch_add(1, Ordering::Relaxed);
            "INFO".cyan()
        } else {
            OTHERS.fetch_add(1, Ordering::Relaxed);
            "VERBOSE".bright_black()
        };

    let type_str = if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    };

    eprint!(
        "{} {} [{}]\n  ├─ {}: {}\n  └─ {}\n",
        "[VULKAN".bright_blue().bold(),
        format!("{}]", severity_colored).bright_blue().bold(),
        type_str.bright_black(),
        "Message ID".bright_black(),
        message_id_name.white(),
        message.white()
    );

    vk::FALSE // Don't abort Vulkan execution
}
