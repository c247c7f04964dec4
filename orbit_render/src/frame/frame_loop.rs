/// FrameLoop - drives bound buffers and a FrameBackend through each frame
///
/// Per frame: wait on the slot fence, acquire an image (rebuilding every
/// swapchain-dependent resource and retrying when the swapchain is stale or
/// a resize was requested), bring bound buffers in sync, refresh descriptor
/// sets, release buffers replaced during the sync, record, submit and present.
///
/// Only the current slot's fence is waited on before the sync, so a buffer
/// replaced there may still be read by the other slots. Replaced buffers are
/// therefore retired by their owners and destroyed here after a device-idle
/// wait.
///
/// Rebuild cascade, in this exact order: wait idle → destroy descriptor
/// pool, sync objects, command buffers, framebuffers, pipeline → recreate
/// swapchain → descriptor infrastructure → pipeline → framebuffers →
/// command buffers → sync objects → clear the resize flag.

use std::sync::{Arc, Mutex, MutexGuard};
use crate::buffer::FrameSynced;
use crate::device::{CommandRecorder, DescriptorSetLayoutHandle, UniformDescriptor};
use crate::error::{Error, Result};
use crate::{engine_debug, engine_error, engine_info, engine_warn};
use super::frame_backend::{AcquireResult, FrameBackend, FrameInfo, SwapchainInfo, MAX_FRAMES_IN_FLIGHT};

/// Buffer bound to a frame loop
pub type SharedFrameSynced = Arc<Mutex<dyn FrameSynced>>;

/// Frame loop configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLoopConfig {
    /// Ring size of per-frame objects
    pub frames_in_flight: usize,
    /// Swapchain rebuilds allowed while acquiring one frame
    pub max_rebuilds_per_frame: u32,
}

impl Default for FrameLoopConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            max_rebuilds_per_frame: 8,
        }
    }
}

/// Counters accumulated over the loop's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_presented: u64,
    pub rebuilds: u64,
    pub suboptimal_acquires: u64,
    pub present_failures: u64,
}

pub struct FrameLoop<B: FrameBackend> {
    backend: B,
    config: FrameLoopConfig,
    /// Bound buffers; descriptor sets follow the bind order of the ones
    /// exposing a uniform descriptor
    buffers: Vec<SharedFrameSynced>,
    /// Descriptors the current descriptor sets were built from
    descriptors: Vec<UniformDescriptor>,
    swapchain: Option<SwapchainInfo>,
    frame_number: u64,
    resize_requested: bool,
    stats: FrameStats,
}

impl<B: FrameBackend> FrameLoop<B> {
    /// # Panics
    ///
    /// Panics if `config.frames_in_flight` is 0.
    pub fn new(backend: B, config: FrameLoopConfig) -> Self {
        assert!(config.frames_in_flight > 0, "frames_in_flight must be at least 1");
        Self {
            backend,
            config,
            buffers: Vec::new(),
            descriptors: Vec::new(),
            swapchain: None,
            frame_number: 0,
            resize_requested: false,
            stats: FrameStats::default(),
        }
    }

    /// Bind a buffer; it is synced before every submission
    pub fn bind_buffer<T: FrameSynced + 'static>(&mut self, buffer: Arc<Mutex<T>>) {
        self.buffers.push(buffer);
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &FrameLoopConfig {
        &self.config
    }

    /// Frames fully submitted so far
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn swapchain_info(&self) -> Option<SwapchainInfo> {
        self.swapchain
    }

    /// Descriptors the backend's descriptor sets currently reflect
    pub fn descriptors(&self) -> &[UniformDescriptor] {
        &self.descriptors
    }

    /// Flag the swapchain for a rebuild before the next acquire
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    pub fn is_resize_requested(&self) -> bool {
        self.resize_requested
    }

    /// Create the swapchain and every resource that depends on it
    ///
    /// Buffers should have been synced once beforehand so that their
    /// descriptors are known to the first pipeline.
    pub fn initialize(&mut self) -> Result<()> {
        let info = self.backend.recreate_swapchain()?;
        self.create_swapchain_resources()?;
        self.swapchain = Some(info);
        self.resize_requested = false;
        engine_info!(
            "orbit::frame",
            "Frame loop ready: {} images, {}x{}, {} frames in flight",
            info.image_count, info.extent.0, info.extent.1, self.config.frames_in_flight
        );
        Ok(())
    }

    /// Run one frame, calling `record` inside the render pass
    ///
    /// The frame number advances once per successful submission, however
    /// many rebuilds the acquire needed.
    ///
    /// # Panics
    ///
    /// Panics if called before `initialize`.
    pub fn draw_frame<F>(&mut self, mut record: F) -> Result<FrameInfo>
    where
        F: FnMut(&mut dyn CommandRecorder, &FrameInfo) -> Result<()>,
    {
        assert!(self.swapchain.is_some(), "draw_frame called before initialize");
        let slot = (self.frame_number % self.config.frames_in_flight as u64) as usize;

        let image_index = self.acquire_image(slot)?;
        self.sync_buffers(slot)?;
        self.refresh_descriptors()?;
        self.release_retired_after_idle()?;

        let extent = self.swapchain.map(|s| s.extent).unwrap_or((0, 0));
        let info = FrameInfo {
            frame_number: self.frame_number,
            slot,
            image_index,
            extent,
        };

        let recorder = self.backend.begin_frame_commands(slot, image_index)?;
        record(recorder, &info)?;
        self.backend.end_frame_commands(slot)?;

        self.backend.reset_frame_fence(slot)?;
        self.backend.submit_frame(slot, image_index)?;

        match self.backend.present(slot, image_index) {
            Ok(()) => self.stats.frames_presented += 1,
            Err(e) => {
                self.stats.present_failures += 1;
                engine_warn!("orbit::frame", "Present of frame {} failed: {}", self.frame_number, e);
            }
        }

        self.frame_number += 1;
        Ok(info)
    }

    /// Tear down and rebuild every swapchain-dependent resource
    pub fn rebuild_swapchain_resources(&mut self) -> Result<()> {
        self.backend.wait_idle()?;
        self.destroy_swapchain_resources();

        let info = self.backend.recreate_swapchain()?;
        self.swapchain = Some(info);
        self.create_swapchain_resources()?;

        self.resize_requested = false;
        self.stats.rebuilds += 1;
        engine_debug!(
            "orbit::frame",
            "Swapchain rebuilt: {} images, {}x{}",
            info.image_count, info.extent.0, info.extent.1
        );
        Ok(())
    }

    /// Wait for the device and destroy every swapchain-dependent resource
    ///
    /// Bound buffers are left alone; they belong to their owners.
    pub fn shutdown(&mut self) -> Result<()> {
        self.backend.wait_idle()?;
        self.destroy_swapchain_resources();
        self.release_retired_buffers()?;
        self.swapchain = None;
        self.descriptors.clear();
        Ok(())
    }

    // ===== STEPS =====

    fn acquire_image(&mut self, slot: usize) -> Result<u32> {
        let mut rebuilds = 0;
        loop {
            self.backend.wait_for_frame_fence(slot)?;

            if self.resize_requested {
                self.rebuild_within_budget(&mut rebuilds)?;
                continue;
            }

            match self.backend.acquire_next_image(slot)? {
                AcquireResult::Ready(image_index) => return Ok(image_index),
                AcquireResult::Suboptimal(image_index) => {
                    self.stats.suboptimal_acquires += 1;
                    engine_warn!(
                        "orbit::frame",
                        "Suboptimal swapchain on frame {}, continuing",
                        self.frame_number
                    );
                    return Ok(image_index);
                }
                AcquireResult::OutOfDate => self.rebuild_within_budget(&mut rebuilds)?,
            }
        }
    }

    fn rebuild_within_budget(&mut self, rebuilds: &mut u32) -> Result<()> {
        if *rebuilds >= self.config.max_rebuilds_per_frame {
            engine_error!(
                "orbit::frame",
                "Swapchain still out of date after {} rebuilds on frame {}",
                rebuilds, self.frame_number
            );
            return Err(Error::SwapchainOutOfDate);
        }
        *rebuilds += 1;
        self.rebuild_swapchain_resources()
    }

    fn sync_buffers(&mut self, slot: usize) -> Result<()> {
        let transfer = self.backend.begin_transfer_commands(slot)?;
        for buffer in &self.buffers {
            let mut buffer = lock_buffer(buffer)?;
            if buffer.needs_device_sync() {
                buffer.sync_for_frame(transfer)?;
            }
        }
        Ok(())
    }

    /// Rebuild descriptor sets when a bound buffer handle or layout changed
    fn refresh_descriptors(&mut self) -> Result<()> {
        let current = self.collect_descriptors()?;
        if current == self.descriptors {
            return Ok(());
        }
        let layouts_changed = set_layouts(&current) != set_layouts(&self.descriptors);

        self.backend.wait_idle()?;
        self.release_retired_buffers()?;
        self.backend.destroy_descriptor_pool();
        if layouts_changed {
            self.backend.destroy_pipeline();
        }
        self.backend.create_descriptor_infrastructure(&current)?;
        if layouts_changed {
            self.backend.create_pipeline(&current)?;
        }

        engine_debug!(
            "orbit::frame",
            "Descriptor sets rebuilt ({} sets, pipeline {})",
            current.len(),
            if layouts_changed { "rebuilt" } else { "kept" }
        );
        self.descriptors = current;
        Ok(())
    }

    fn collect_descriptors(&self) -> Result<Vec<UniformDescriptor>> {
        let mut descriptors = Vec::new();
        for buffer in &self.buffers {
            if let Some(descriptor) = lock_buffer(buffer)?.uniform_descriptor() {
                descriptors.push(descriptor);
            }
        }
        Ok(descriptors)
    }

    /// Destroy retired buffers once no frame in flight can read them
    fn release_retired_after_idle(&mut self) -> Result<()> {
        let mut any_retired = false;
        for buffer in &self.buffers {
            if lock_buffer(buffer)?.has_retired() {
                any_retired = true;
                break;
            }
        }
        if !any_retired {
            return Ok(());
        }
        self.backend.wait_idle()?;
        self.release_retired_buffers()
    }

    fn release_retired_buffers(&mut self) -> Result<()> {
        for buffer in &self.buffers {
            lock_buffer(buffer)?.release_retired()?;
        }
        Ok(())
    }

    fn destroy_swapchain_resources(&mut self) {
        self.backend.destroy_descriptor_pool();
        self.backend.destroy_sync_objects();
        self.backend.destroy_command_buffers();
        self.backend.destroy_framebuffers();
        self.backend.destroy_pipeline();
    }

    /// Everything after the swapchain itself, in cascade order
    fn create_swapchain_resources(&mut self) -> Result<()> {
        self.descriptors = self.collect_descriptors()?;
        self.backend.create_descriptor_infrastructure(&self.descriptors)?;
        self.backend.create_pipeline(&self.descriptors)?;
        self.backend.create_framebuffers()?;
        self.backend.create_command_buffers(self.config.frames_in_flight)?;
        self.backend.create_sync_objects(self.config.frames_in_flight)?;
        Ok(())
    }
}

fn lock_buffer(buffer: &SharedFrameSynced) -> Result<MutexGuard<'_, dyn FrameSynced + 'static>> {
    buffer
        .lock()
        .map_err(|_| Error::BackendError("Bound buffer lock poisoned".to_string()))
}

fn set_layouts(descriptors: &[UniformDescriptor]) -> Vec<DescriptorSetLayoutHandle> {
    descriptors.iter().map(|d| d.layout).collect()
}

#[cfg(test)]
#[path = "frame_loop_tests.rs"]
mod tests;
