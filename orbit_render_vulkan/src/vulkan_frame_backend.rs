/// VulkanFrameBackend - Vulkan implementation of the FrameBackend trait
///
/// Owns every swapchain-dependent object: swapchain, render pass,
/// framebuffers, pipeline, descriptor pool and sets, per-slot command
/// buffers and the sync ring (one fence and one image-available semaphore
/// per in-flight slot, one render-finished semaphore per swapchain image).
/// The frame loop decides when each is destroyed and rebuilt.

use ash::vk::{self, Handle};
use std::sync::Arc;
use orbit_render::orbit::{Error, Result};
use orbit_render::orbit::device::{CommandRecorder, DescriptorType, UniformDescriptor};
use orbit_render::orbit::frame::{AcquireResult, FrameBackend, SwapchainInfo};
use orbit_render::{engine_debug, engine_err, engine_error};

use crate::vulkan_command_list::CommandList;
use crate::vulkan_device::VulkanDevice;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::descriptor_type_to_vk;
use crate::vulkan_pipeline::{create_render_pass, Pipeline, PipelineConfig};
use crate::vulkan_shader::ShaderCache;
use crate::vulkan_swapchain::Swapchain;

pub struct VulkanFrameBackend {
    ctx: Arc<GpuContext>,
    pipeline_config: PipelineConfig,
    shaders: ShaderCache,
    /// Window size in pixels, used when the surface leaves the extent to us
    window_extent: (u32, u32),

    swapchain: Option<Swapchain>,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    pipeline: Option<Pipeline>,

    descriptor_pool: vk::DescriptorPool,
    descriptor_sets: Vec<vk::DescriptorSet>,

    /// Created once; command buffers are allocated from it per rebuild
    command_pool: vk::CommandPool,
    command_lists: Vec<CommandList>,

    in_flight_fences: Vec<vk::Fence>,
    image_available_semaphores: Vec<vk::Semaphore>,
    render_finished_semaphores: Vec<vk::Semaphore>,
}

impl VulkanFrameBackend {
    /// Create a backend presenting to `device`'s surface
    ///
    /// `shaders` must hold the modules named by `pipeline_config`.
    pub fn new(
        device: &VulkanDevice,
        pipeline_config: PipelineConfig,
        shaders: ShaderCache,
        window_extent: (u32, u32),
    ) -> Result<Self> {
        let ctx = Arc::clone(device.context());

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(ctx.graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let command_pool = unsafe { ctx.device.create_command_pool(&pool_info, None) }
            .map_err(|e| {
                engine_error!("orbit::vulkan", "Failed to create command pool: {:?}", e);
                Error::InitializationFailed(format!("Failed to create command pool: {:?}", e))
            })?;

        Ok(Self {
            ctx,
            pipeline_config,
            shaders,
            window_extent,
            swapchain: None,
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            pipeline: None,
            descriptor_pool: vk::DescriptorPool::null(),
            descriptor_sets: Vec::new(),
            command_pool,
            command_lists: Vec::new(),
            in_flight_fences: Vec::new(),
            image_available_semaphores: Vec::new(),
            render_finished_semaphores: Vec::new(),
        })
    }

    /// Record the new window size; takes effect on the next swapchain rebuild
    pub fn set_window_extent(&mut self, width: u32, height: u32) {
        self.window_extent = (width, height);
    }

    pub fn pipeline_config(&self) -> &PipelineConfig {
        &self.pipeline_config
    }

    pub fn shaders(&self) -> &ShaderCache {
        &self.shaders
    }

    pub fn shaders_mut(&mut self) -> &mut ShaderCache {
        &mut self.shaders
    }

    /// Number of descriptor sets currently allocated
    pub fn descriptor_set_count(&self) -> usize {
        self.descriptor_sets.len()
    }

    fn swapchain(&self) -> Result<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| Error::BackendError("Swapchain not created".to_string()))
    }

    fn command_list(&mut self, slot: usize) -> Result<&mut CommandList> {
        let count = self.command_lists.len();
        self.command_lists
            .get_mut(slot)
            .ok_or_else(|| Error::BackendError(format!("No command buffer for slot {} ({} allocated)", slot, count)))
    }

    fn fence(&self, slot: usize) -> Result<vk::Fence> {
        self.in_flight_fences
            .get(slot)
            .copied()
            .ok_or_else(|| Error::BackendError(format!("No fence for slot {}", slot)))
    }

    fn image_available(&self, slot: usize) -> Result<vk::Semaphore> {
        self.image_available_semaphores
            .get(slot)
            .copied()
            .ok_or_else(|| Error::BackendError(format!("No image-available semaphore for slot {}", slot)))
    }

    fn render_finished(&self, image_index: u32) -> Result<vk::Semaphore> {
        self.render_finished_semaphores
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| Error::BackendError(format!("No render-finished semaphore for image {}", image_index)))
    }

    fn destroy_render_pass(&mut self) {
        if self.render_pass != vk::RenderPass::null() {
            unsafe {
                self.ctx.device.destroy_render_pass(self.render_pass, None);
            }
            self.render_pass = vk::RenderPass::null();
        }
    }
}

impl FrameBackend for VulkanFrameBackend {
    fn wait_for_frame_fence(&mut self, slot: usize) -> Result<()> {
        let fence = self.fence(slot)?;
        unsafe {
            self.ctx.device
                .wait_for_fences(std::slice::from_ref(&fence), true, u64::MAX)
                .map_err(|e| engine_err!("orbit::vulkan", "Failed to wait for frame fence {}: {:?}", slot, e))
        }
    }

    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireResult> {
        let semaphore = self.image_available(slot)?;
        self.swapchain()?.acquire_next_image(semaphore)
    }

    fn begin_transfer_commands(&mut self, slot: usize) -> Result<&mut dyn CommandRecorder> {
        let list = self.command_list(slot)?;
        list.begin()?;
        Ok(list)
    }

    fn begin_frame_commands(&mut self, slot: usize, image_index: u32) -> Result<&mut dyn CommandRecorder> {
        let extent = self.swapchain()?.extent;
        let framebuffer = self
            .framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| Error::BackendError(format!("No framebuffer for image {}", image_index)))?;
        let (pipeline, pipeline_layout) = self
            .pipeline
            .as_ref()
            .map(|p| (p.pipeline, p.pipeline_layout))
            .ok_or_else(|| Error::BackendError("Pipeline not created".to_string()))?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.pipeline_config.clear_color,
            },
        }];
        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        let descriptor_sets = self.descriptor_sets.clone();
        let list = self.command_list(slot)?;
        list.begin_render_pass(&render_pass_info, pipeline, pipeline_layout, &descriptor_sets, extent)?;
        Ok(list)
    }

    fn end_frame_commands(&mut self, slot: usize) -> Result<()> {
        self.command_list(slot)?.end()
    }

    fn reset_frame_fence(&mut self, slot: usize) -> Result<()> {
        let fence = self.fence(slot)?;
        unsafe {
            self.ctx.device
                .reset_fences(std::slice::from_ref(&fence))
                .map_err(|e| engine_err!("orbit::vulkan", "Failed to reset frame fence {}: {:?}", slot, e))
        }
    }

    fn submit_frame(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let fence = self.fence(slot)?;
        let wait_semaphores = [self.image_available(slot)?];
        let signal_semaphores = [self.render_finished(image_index)?];
        let command_buffers = [self.command_list(slot)?.command_buffer()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.ctx.device
                .queue_submit(self.ctx.graphics_queue, std::slice::from_ref(&submit_info), fence)
                .map_err(|e| engine_err!("orbit::vulkan", "Failed to submit frame on slot {}: {:?}", slot, e))
        }
    }

    fn present(&mut self, _slot: usize, image_index: u32) -> Result<()> {
        let render_finished = self.render_finished(image_index)?;
        self.swapchain()?.present(self.ctx.present_queue, image_index, render_finished)
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.ctx.wait_idle()
    }

    fn destroy_descriptor_pool(&mut self) {
        if self.descriptor_pool != vk::DescriptorPool::null() {
            unsafe {
                // Sets are freed with their pool
                self.ctx.device.destroy_descriptor_pool(self.descriptor_pool, None);
            }
            self.descriptor_pool = vk::DescriptorPool::null();
        }
        self.descriptor_sets.clear();
    }

    fn destroy_sync_objects(&mut self) {
        unsafe {
            for fence in self.in_flight_fences.drain(..) {
                self.ctx.device.destroy_fence(fence, None);
            }
            for semaphore in self.image_available_semaphores.drain(..) {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
            for semaphore in self.render_finished_semaphores.drain(..) {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
        }
    }

    fn destroy_command_buffers(&mut self) {
        if self.command_lists.is_empty() {
            return;
        }
        let buffers: Vec<vk::CommandBuffer> = self
            .command_lists
            .drain(..)
            .map(|list| list.command_buffer())
            .collect();
        unsafe {
            self.ctx.device.free_command_buffers(self.command_pool, &buffers);
        }
    }

    fn destroy_framebuffers(&mut self) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.ctx.device.destroy_framebuffer(framebuffer, None);
            }
        }
    }

    fn destroy_pipeline(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.destroy(&self.ctx.device);
        }
    }

    fn recreate_swapchain(&mut self) -> Result<SwapchainInfo> {
        let old = self.swapchain.take();
        let old_handle = old.as_ref().map_or(vk::SwapchainKHR::null(), |s| s.swapchain);
        let swapchain = Swapchain::new(Arc::clone(&self.ctx), self.window_extent, old_handle)?;
        drop(old);

        // Pipelines and framebuffers are already gone at this point
        self.destroy_render_pass();
        self.render_pass = create_render_pass(&self.ctx.device, swapchain.format)?;

        let info = SwapchainInfo {
            image_count: swapchain.image_count(),
            extent: (swapchain.extent.width, swapchain.extent.height),
        };
        engine_debug!(
            "orbit::vulkan",
            "Swapchain created: {} images, {}x{}, {:?}",
            info.image_count, info.extent.0, info.extent.1, swapchain.format
        );
        self.swapchain = Some(swapchain);
        Ok(info)
    }

    fn create_descriptor_infrastructure(&mut self, descriptors: &[UniformDescriptor]) -> Result<()> {
        if descriptors.is_empty() {
            return Ok(());
        }

        let count_of = |ty: DescriptorType| -> u32 {
            descriptors
                .iter()
                .flat_map(|d| d.ranges.iter())
                .filter(|r| r.descriptor_type == ty)
                .count() as u32
        };
        let pool_sizes: Vec<vk::DescriptorPoolSize> = [DescriptorType::UniformBuffer, DescriptorType::UniformBufferDynamic]
            .into_iter()
            .map(|ty| (ty, count_of(ty)))
            .filter(|(_, count)| *count > 0)
            .map(|(ty, count)| vk::DescriptorPoolSize {
                ty: descriptor_type_to_vk(ty),
                descriptor_count: count,
            })
            .collect();

        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(descriptors.len() as u32);

        unsafe {
            self.descriptor_pool = self.ctx.device.create_descriptor_pool(&pool_info, None)
                .map_err(|e| engine_err!("orbit::vulkan", "Failed to create descriptor pool: {:?}", e))?;

            let set_layouts: Vec<vk::DescriptorSetLayout> = descriptors
                .iter()
                .map(|d| vk::DescriptorSetLayout::from_raw(d.layout.0))
                .collect();
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(self.descriptor_pool)
                .set_layouts(&set_layouts);

            self.descriptor_sets = self.ctx.device.allocate_descriptor_sets(&allocate_info)
                .map_err(|e| engine_err!("orbit::vulkan", "Failed to allocate descriptor sets: {:?}", e))?;

            for (descriptor, &set) in descriptors.iter().zip(&self.descriptor_sets) {
                let buffer_infos: Vec<vk::DescriptorBufferInfo> = descriptor
                    .ranges
                    .iter()
                    .map(|range| vk::DescriptorBufferInfo {
                        buffer: vk::Buffer::from_raw(descriptor.buffer.0),
                        offset: range.offset,
                        range: range.range,
                    })
                    .collect();
                let writes: Vec<vk::WriteDescriptorSet> = descriptor
                    .ranges
                    .iter()
                    .zip(&buffer_infos)
                    .map(|(range, info)| {
                        vk::WriteDescriptorSet::default()
                            .dst_set(set)
                            .dst_binding(range.binding)
                            .descriptor_type(descriptor_type_to_vk(range.descriptor_type))
                            .buffer_info(std::slice::from_ref(info))
                    })
                    .collect();
                self.ctx.device.update_descriptor_sets(&writes, &[]);
            }
        }
        Ok(())
    }

    fn create_pipeline(&mut self, descriptors: &[UniformDescriptor]) -> Result<()> {
        let pipeline = Pipeline::new(
            &self.ctx.device,
            self.render_pass,
            &self.pipeline_config,
            &self.shaders,
            descriptors,
        )?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn create_framebuffers(&mut self) -> Result<()> {
        let swapchain = self.swapchain()?;
        let extent = swapchain.extent;
        let views = swapchain.image_views.clone();

        for view in views {
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(std::slice::from_ref(&view))
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe { self.ctx.device.create_framebuffer(&framebuffer_info, None) }
                .map_err(|e| engine_err!("orbit::vulkan", "Failed to create framebuffer: {:?}", e))?;
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    fn create_command_buffers(&mut self, count: usize) -> Result<()> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count as u32);

        let buffers = unsafe { self.ctx.device.allocate_command_buffers(&allocate_info) }
            .map_err(|e| engine_err!("orbit::vulkan", "Failed to allocate command buffers: {:?}", e))?;

        self.command_lists = buffers
            .into_iter()
            .map(|buffer| CommandList::new(self.ctx.device.clone(), buffer))
            .collect();
        Ok(())
    }

    fn create_sync_objects(&mut self, frames_in_flight: usize) -> Result<()> {
        let image_count = self.swapchain()?.image_count();
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Signaled so the first wait on each slot returns immediately
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            for _ in 0..frames_in_flight {
                self.in_flight_fences.push(
                    self.ctx.device.create_fence(&fence_info, None)
                        .map_err(|e| engine_err!("orbit::vulkan", "Failed to create frame fence: {:?}", e))?,
                );
                self.image_available_semaphores.push(
                    self.ctx.device.create_semaphore(&semaphore_info, None)
                        .map_err(|e| engine_err!("orbit::vulkan", "Failed to create image-available semaphore: {:?}", e))?,
                );
            }
            for _ in 0..image_count {
                self.render_finished_semaphores.push(
                    self.ctx.device.create_semaphore(&semaphore_info, None)
                        .map_err(|e| engine_err!("orbit::vulkan", "Failed to create render-finished semaphore: {:?}", e))?,
                );
            }
        }
        Ok(())
    }
}

impl Drop for VulkanFrameBackend {
    fn drop(&mut self) {
        let _ = self.ctx.wait_idle();
        self.destroy_descriptor_pool();
        self.destroy_sync_objects();
        self.destroy_command_buffers();
        self.destroy_framebuffers();
        self.destroy_pipeline();
        self.destroy_render_pass();
        self.swapchain = None;
        unsafe {
            self.ctx.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
