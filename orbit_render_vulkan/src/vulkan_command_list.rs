/// CommandList - Vulkan implementation of the CommandRecorder trait
///
/// Wraps one primary command buffer of a frame slot. The frame backend
/// drives its lifecycle (begin, render pass, end); buffers and the record
/// callback only see the `CommandRecorder` side.

use ash::vk::{self, Handle};
use orbit_render::orbit::{Error, Result};
use orbit_render::orbit::device::{BufferCopyRegion, BufferHandle, CommandRecorder};

/// Vulkan command list implementation
pub struct CommandList {
    device: ash::Device,
    command_buffer: vk::CommandBuffer,
    /// Whether the command buffer is currently recording
    is_recording: bool,
    /// Whether we're inside a render pass
    in_render_pass: bool,
    /// Layout of the pipeline bound for this frame
    pipeline_layout: vk::PipelineLayout,
    /// Descriptor sets indexed by uniform descriptor order
    descriptor_sets: Vec<vk::DescriptorSet>,
}

impl CommandList {
    pub(crate) fn new(device: ash::Device, command_buffer: vk::CommandBuffer) -> Self {
        Self {
            device,
            command_buffer,
            is_recording: false,
            in_render_pass: false,
            pipeline_layout: vk::PipelineLayout::null(),
            descriptor_sets: Vec::new(),
        }
    }

    /// Get the underlying Vulkan command buffer
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Reset and begin recording
    ///
    /// A recording left open by an aborted frame is discarded by the reset.
    pub(crate) fn begin(&mut self) -> Result<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| Error::BackendError(format!("Failed to reset command buffer: {:?}", e)))?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| Error::BackendError(format!("Failed to begin command buffer: {:?}", e)))?;
        }

        self.is_recording = true;
        self.in_render_pass = false;
        self.pipeline_layout = vk::PipelineLayout::null();
        self.descriptor_sets.clear();
        Ok(())
    }

    /// Make transfer writes visible to vertex input and uniform reads, then
    /// open the render pass with `pipeline` bound
    pub(crate) fn begin_render_pass(
        &mut self,
        render_pass_info: &vk::RenderPassBeginInfo,
        pipeline: vk::Pipeline,
        pipeline_layout: vk::PipelineLayout,
        descriptor_sets: &[vk::DescriptorSet],
        extent: vk::Extent2D,
    ) -> Result<()> {
        if !self.is_recording {
            return Err(Error::BackendError("Command list not recording".to_string()));
        }
        if self.in_render_pass {
            return Err(Error::BackendError("Already inside a render pass".to_string()));
        }

        unsafe {
            let barrier = vk::MemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::UNIFORM_READ);
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::VERTEX_INPUT
                    | vk::PipelineStageFlags::VERTEX_SHADER
                    | vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                std::slice::from_ref(&barrier),
                &[],
                &[],
            );

            self.device.cmd_begin_render_pass(
                self.command_buffer,
                render_pass_info,
                vk::SubpassContents::INLINE,
            );
            self.device.cmd_bind_pipeline(self.command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            self.device.cmd_set_viewport(self.command_buffer, 0, std::slice::from_ref(&viewport));

            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            self.device.cmd_set_scissor(self.command_buffer, 0, std::slice::from_ref(&scissor));
        }

        self.in_render_pass = true;
        self.pipeline_layout = pipeline_layout;
        self.descriptor_sets = descriptor_sets.to_vec();
        Ok(())
    }

    /// Close the render pass (if open) and end recording
    pub(crate) fn end(&mut self) -> Result<()> {
        if !self.is_recording {
            return Err(Error::BackendError("Command list not recording".to_string()));
        }

        unsafe {
            if self.in_render_pass {
                self.device.cmd_end_render_pass(self.command_buffer);
                self.in_render_pass = false;
            }
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| Error::BackendError(format!("Failed to end command buffer: {:?}", e)))?;
        }

        self.is_recording = false;
        Ok(())
    }
}

impl CommandRecorder for CommandList {
    fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, region: BufferCopyRegion) -> Result<()> {
        if !self.is_recording {
            return Err(Error::BackendError("Command list not recording".to_string()));
        }
        if self.in_render_pass {
            return Err(Error::BackendError("Buffer copies are not allowed inside a render pass".to_string()));
        }

        let copy = vk::BufferCopy {
            src_offset: region.src_offset,
            dst_offset: region.dst_offset,
            size: region.size,
        };
        unsafe {
            self.device.cmd_copy_buffer(
                self.command_buffer,
                vk::Buffer::from_raw(src.0),
                vk::Buffer::from_raw(dst.0),
                std::slice::from_ref(&copy),
            );
        }
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: BufferHandle, offset: u64) -> Result<()> {
        if !self.in_render_pass {
            return Err(Error::BackendError("Not inside a render pass".to_string()));
        }

        unsafe {
            self.device.cmd_bind_vertex_buffers(
                self.command_buffer,
                binding,
                &[vk::Buffer::from_raw(buffer.0)],
                &[offset],
            );
        }
        Ok(())
    }

    fn bind_uniform_set(&mut self, set: u32, dynamic_offsets: &[u32]) -> Result<()> {
        if !self.in_render_pass {
            return Err(Error::BackendError("Not inside a render pass".to_string()));
        }
        let descriptor_set = self
            .descriptor_sets
            .get(set as usize)
            .copied()
            .ok_or_else(|| {
                Error::InvalidResource(format!(
                    "Descriptor set {} out of range ({} sets bound)",
                    set, self.descriptor_sets.len()
                ))
            })?;

        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                set,
                std::slice::from_ref(&descriptor_set),
                dynamic_offsets,
            );
        }
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()> {
        if !self.in_render_pass {
            return Err(Error::BackendError("Not inside a render pass".to_string()));
        }

        unsafe {
            self.device.cmd_draw(self.command_buffer, vertex_count, instance_count, first_vertex, first_instance);
        }
        Ok(())
    }
}
