//! Error types for the Orbit renderer
//!
//! This module defines the error types used throughout the renderer,
//! including device resource creation, uniform layout validation and
//! swapchain invalidation.

use std::fmt;

/// Result type for Orbit renderer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Orbit renderer errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Backend-specific error (Vulkan, allocator, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (buffer, descriptor layout, shader, etc.)
    InvalidResource(String),

    /// Initialization failed (device, swapchain, subsystems)
    InitializationFailed(String),

    /// A uniform data set does not match the layout bound to a buffer
    LayoutMismatch(LayoutMismatch),

    /// The swapchain could not be brought back to a presentable state
    SwapchainOutOfDate,
}

/// Reason a uniform data set was rejected by a buffer's bound layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMismatch {
    /// The data set provides a binding point the layout does not declare
    UnknownBinding(u32),

    /// The layout declares a binding point the data set does not provide
    MissingBinding(u32),

    /// The data for a binding point has the wrong byte size
    SizeMismatch {
        binding: u32,
        expected: u64,
        actual: u64,
    },
}

impl LayoutMismatch {
    /// Binding point that caused the mismatch
    pub fn binding(&self) -> u32 {
        match *self {
            LayoutMismatch::UnknownBinding(binding) => binding,
            LayoutMismatch::MissingBinding(binding) => binding,
            LayoutMismatch::SizeMismatch { binding, .. } => binding,
        }
    }
}

impl fmt::Display for LayoutMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutMismatch::UnknownBinding(binding) => {
                write!(f, "binding {} is not part of the bound layout", binding)
            }
            LayoutMismatch::MissingBinding(binding) => {
                write!(f, "binding {} is required by the bound layout but missing", binding)
            }
            LayoutMismatch::SizeMismatch { binding, expected, actual } => write!(
                f,
                "binding {} expects {} bytes but data holds {} bytes",
                binding, expected, actual
            ),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::LayoutMismatch(mismatch) => write!(f, "Layout mismatch: {}", mismatch),
            Error::SwapchainOutOfDate => write!(f, "Swapchain out of date"),
        }
    }
}

impl std::error::Error for Error {}

impl From<LayoutMismatch> for Error {
    fn from(mismatch: LayoutMismatch) -> Self {
        Error::LayoutMismatch(mismatch)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
