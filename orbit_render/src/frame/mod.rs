/// Frame module - frame-in-flight loop and the swapchain rebuild cascade

pub mod frame_backend;
pub mod frame_loop;

pub use frame_backend::*;
pub use frame_loop::*;

// Mock backend for tests (no GPU required)
#[cfg(test)]
pub mod mock_frame_backend;
