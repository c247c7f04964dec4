/// FrameBackend trait - swapchain, command and synchronization plumbing
/// driven by the frame loop

use crate::device::{CommandRecorder, UniformDescriptor};
use crate::error::Result;

/// Default number of frames the host may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Outcome of acquiring the next presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// Image acquired, swapchain matches the surface
    Ready(u32),
    /// Image acquired, but the swapchain no longer matches the surface exactly
    Suboptimal(u32),
    /// Swapchain unusable; it must be rebuilt before acquiring again
    OutOfDate,
}

/// Presentation state reported after a swapchain (re)creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainInfo {
    pub image_count: u32,
    /// Width and height in pixels
    pub extent: (u32, u32),
}

/// What the record callback knows about the frame being built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Presented frames before this one
    pub frame_number: u64,
    /// In-flight slot (frame number modulo the ring size)
    pub slot: usize,
    /// Acquired swapchain image
    pub image_index: u32,
    pub extent: (u32, u32),
}

/// Backend half of the frame loop
///
/// The frame loop owns the ordering; a backend only executes each step
/// against its API. `slot` always indexes the ring of per-frame objects
/// (fence, image-available semaphore, command buffer).
pub trait FrameBackend {
    // ===== PER FRAME =====

    /// Block until the slot's previous submission completed
    fn wait_for_frame_fence(&mut self, slot: usize) -> Result<()>;

    /// Acquire the next image, signaling the slot's image-available semaphore
    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireResult>;

    /// Reset and begin the slot's command buffer; copies recorded here run
    /// before the frame's draw commands
    fn begin_transfer_commands(&mut self, slot: usize) -> Result<&mut dyn CommandRecorder>;

    /// Begin the render pass on `image_index`, pipeline bound
    fn begin_frame_commands(&mut self, slot: usize, image_index: u32) -> Result<&mut dyn CommandRecorder>;

    /// End the render pass and the command buffer
    fn end_frame_commands(&mut self, slot: usize) -> Result<()>;

    /// Unsignal the slot's fence right before it is handed to a submit
    fn reset_frame_fence(&mut self, slot: usize) -> Result<()>;

    /// Submit the slot's command buffer (waits on image-available at the
    /// color-attachment-output stage, signals render-finished and the fence)
    fn submit_frame(&mut self, slot: usize, image_index: u32) -> Result<()>;

    /// Present `image_index` once render-finished is signaled
    fn present(&mut self, slot: usize, image_index: u32) -> Result<()>;

    fn wait_idle(&mut self) -> Result<()>;

    // ===== SWAPCHAIN-DEPENDENT RESOURCES =====

    fn destroy_descriptor_pool(&mut self);

    fn destroy_sync_objects(&mut self);

    fn destroy_command_buffers(&mut self);

    fn destroy_framebuffers(&mut self);

    fn destroy_pipeline(&mut self);

    /// Create the swapchain (replacing the current one, if any)
    fn recreate_swapchain(&mut self) -> Result<SwapchainInfo>;

    /// Descriptor pool plus one descriptor set per entry of `descriptors`
    fn create_descriptor_infrastructure(&mut self, descriptors: &[UniformDescriptor]) -> Result<()>;

    /// Pipeline whose layout holds the set layouts of `descriptors`, in order
    fn create_pipeline(&mut self, descriptors: &[UniformDescriptor]) -> Result<()>;

    fn create_framebuffers(&mut self) -> Result<()>;

    fn create_command_buffers(&mut self, count: usize) -> Result<()>;

    /// Fences are created signaled so the first wait on each slot returns
    fn create_sync_objects(&mut self, frames_in_flight: usize) -> Result<()>;
}
