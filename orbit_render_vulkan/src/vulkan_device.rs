/// VulkanDevice - Vulkan implementation of the GraphicsDevice trait

use ash::vk::{self, Handle};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use orbit_render::orbit::Result;
use orbit_render::orbit::device::{
    DescriptorBinding, DescriptorSetLayoutHandle, DeviceHandlePair, DeviceLimits, GraphicsDevice,
    MemoryAllocator,
};
use orbit_render::engine_err;

use crate::vulkan_allocator::VulkanAllocator;
use crate::vulkan_config::Config;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{descriptor_type_to_vk, shader_stages_to_vk};

/// Vulkan logical device bound to one window surface
///
/// Register it with an `AllocatorHost` to get the `DeviceContext` buffers
/// are created against, and hand it to `VulkanFrameBackend::new` to drive
/// presentation.
pub struct VulkanDevice {
    ctx: Arc<GpuContext>,
}

impl VulkanDevice {
    /// Create the instance, surface and logical device for `window`
    ///
    /// The window must outlive the device.
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: Config) -> Result<Self> {
        let ctx = GpuContext::new(window, &config)?;
        Ok(Self { ctx: Arc::new(ctx) })
    }

    /// Shared GPU context (device, queues, surface)
    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.ctx.wait_idle()
    }
}

impl GraphicsDevice for VulkanDevice {
    fn handle_pair(&self) -> DeviceHandlePair {
        let (logical, physical) = self.ctx.raw_handles();
        DeviceHandlePair::new(logical, physical)
    }

    fn limits(&self) -> DeviceLimits {
        self.ctx.limits
    }

    fn create_allocator(&self) -> Result<Box<dyn MemoryAllocator>> {
        Ok(Box::new(VulkanAllocator::new(Arc::clone(&self.ctx))?))
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<DescriptorSetLayoutHandle> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|entry| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(entry.binding)
                    .descriptor_type(descriptor_type_to_vk(entry.descriptor_type))
                    .descriptor_count(1)
                    .stage_flags(shader_stages_to_vk(entry.stages))
            })
            .collect();

        let layout_create = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&vk_bindings);

        let layout = unsafe { self.ctx.device.create_descriptor_set_layout(&layout_create, None) }
            .map_err(|e| engine_err!("orbit::vulkan", "Failed to create descriptor set layout: {:?}", e))?;

        Ok(DescriptorSetLayoutHandle(layout.as_raw()))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        unsafe {
            self.ctx
                .device
                .destroy_descriptor_set_layout(vk::DescriptorSetLayout::from_raw(layout.0), None);
        }
    }
}
