/// Mock frame backend for unit tests (no GPU required)
///
/// Every call is appended to `calls` by name so tests can check the exact
/// ordering of the rebuild cascade. Acquire results are scripted; once the
/// script runs out images are handed out round-robin.

use std::collections::VecDeque;
use crate::device::mock_device::MockCommandRecorder;
use crate::device::{CommandRecorder, UniformDescriptor};
use crate::error::{Error, Result};
use super::frame_backend::{AcquireResult, FrameBackend, SwapchainInfo};

/// One submitted frame as seen by the mock queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockSubmission {
    pub slot: usize,
    pub image_index: u32,
    /// Swapchain generation the frame was recorded against
    pub generation: u32,
}

#[derive(Debug)]
pub struct MockFrameBackend {
    pub calls: Vec<&'static str>,
    pub acquire_script: VecDeque<Result<AcquireResult>>,
    /// Number of upcoming presents that fail
    pub fail_presents: usize,
    pub image_count: u32,
    pub extent: (u32, u32),
    /// Incremented by every `recreate_swapchain`
    pub generation: u32,
    pub submissions: Vec<MockSubmission>,
    /// Descriptors passed to the last `create_descriptor_infrastructure`
    pub descriptor_sets: Vec<UniformDescriptor>,
    /// Descriptors passed to the last `create_pipeline`
    pub pipeline_descriptors: Vec<UniformDescriptor>,
    pub transfer: MockCommandRecorder,
    pub frame: MockCommandRecorder,
    next_image: u32,
    recording: bool,
}

impl MockFrameBackend {
    pub fn new(image_count: u32) -> Self {
        Self {
            calls: Vec::new(),
            acquire_script: VecDeque::new(),
            fail_presents: 0,
            image_count,
            extent: (800, 600),
            generation: 0,
            submissions: Vec::new(),
            descriptor_sets: Vec::new(),
            pipeline_descriptors: Vec::new(),
            transfer: MockCommandRecorder::new(),
            frame: MockCommandRecorder::new(),
            next_image: 0,
            recording: false,
        }
    }

    /// Queue an acquire result ahead of the round-robin default
    pub fn script_acquire(&mut self, result: AcquireResult) {
        self.acquire_script.push_back(Ok(result));
    }

    /// Forget recorded calls (e.g. after initialization)
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }
}

impl FrameBackend for MockFrameBackend {
    fn wait_for_frame_fence(&mut self, _slot: usize) -> Result<()> {
        self.calls.push("wait_for_frame_fence");
        Ok(())
    }

    fn acquire_next_image(&mut self, _slot: usize) -> Result<AcquireResult> {
        self.calls.push("acquire_next_image");
        if let Some(result) = self.acquire_script.pop_front() {
            return result;
        }
        let image = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(AcquireResult::Ready(image))
    }

    fn begin_transfer_commands(&mut self, _slot: usize) -> Result<&mut dyn CommandRecorder> {
        self.calls.push("begin_transfer_commands");
        self.recording = true;
        self.transfer.commands.clear();
        Ok(&mut self.transfer)
    }

    fn begin_frame_commands(&mut self, _slot: usize, _image_index: u32) -> Result<&mut dyn CommandRecorder> {
        self.calls.push("begin_frame_commands");
        if !self.recording {
            return Err(Error::BackendError("render pass begun outside a command buffer".to_string()));
        }
        self.frame.commands.clear();
        Ok(&mut self.frame)
    }

    fn end_frame_commands(&mut self, _slot: usize) -> Result<()> {
        self.calls.push("end_frame_commands");
        self.recording = false;
        Ok(())
    }

    fn reset_frame_fence(&mut self, _slot: usize) -> Result<()> {
        self.calls.push("reset_frame_fence");
        Ok(())
    }

    fn submit_frame(&mut self, slot: usize, image_index: u32) -> Result<()> {
        self.calls.push("submit_frame");
        self.submissions.push(MockSubmission {
            slot,
            image_index,
            generation: self.generation,
        });
        Ok(())
    }

    fn present(&mut self, _slot: usize, _image_index: u32) -> Result<()> {
        self.calls.push("present");
        if self.fail_presents > 0 {
            self.fail_presents -= 1;
            return Err(Error::BackendError("mock present failure".to_string()));
        }
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.calls.push("wait_idle");
        Ok(())
    }

    fn destroy_descriptor_pool(&mut self) {
        self.calls.push("destroy_descriptor_pool");
    }

    fn destroy_sync_objects(&mut self) {
        self.calls.push("destroy_sync_objects");
    }

    fn destroy_command_buffers(&mut self) {
        self.calls.push("destroy_command_buffers");
    }

    fn destroy_framebuffers(&mut self) {
        self.calls.push("destroy_framebuffers");
    }

    fn destroy_pipeline(&mut self) {
        self.calls.push("destroy_pipeline");
    }

    fn recreate_swapchain(&mut self) -> Result<SwapchainInfo> {
        self.calls.push("recreate_swapchain");
        self.generation += 1;
        self.next_image = 0;
        Ok(SwapchainInfo {
            image_count: self.image_count,
            extent: self.extent,
        })
    }

    fn create_descriptor_infrastructure(&mut self, descriptors: &[UniformDescriptor]) -> Result<()> {
        self.calls.push("create_descriptor_infrastructure");
        self.descriptor_sets = descriptors.to_vec();
        Ok(())
    }

    fn create_pipeline(&mut self, descriptors: &[UniformDescriptor]) -> Result<()> {
        self.calls.push("create_pipeline");
        self.pipeline_descriptors = descriptors.to_vec();
        Ok(())
    }

    fn create_framebuffers(&mut self) -> Result<()> {
        self.calls.push("create_framebuffers");
        Ok(())
    }

    fn create_command_buffers(&mut self, _count: usize) -> Result<()> {
        self.calls.push("create_command_buffers");
        Ok(())
    }

    fn create_sync_objects(&mut self, _frames_in_flight: usize) -> Result<()> {
        self.calls.push("create_sync_objects");
        Ok(())
    }
}
