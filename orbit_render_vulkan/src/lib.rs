/*!
# Orbit Render - Vulkan Backend

Vulkan implementation of the Orbit renderer.

This crate implements the `orbit_render` device traits and frame backend
using the Ash library for Vulkan bindings and gpu-allocator for memory
management.

```no_run
use std::sync::Arc;
use orbit_render::orbit::AllocatorHost;
use orbit_render::orbit::frame::{FrameLoop, FrameLoopConfig};
use orbit_render_vulkan::orbit::{Config, PipelineConfig, ShaderCache, VulkanDevice, VulkanFrameBackend};
# fn run(window: &winit::window::Window) -> orbit_render::orbit::Result<()> {
let device = Arc::new(VulkanDevice::new(window, Config::default())?);
let mut host = AllocatorHost::new();
let context = host.device_context(device.clone())?;

let shaders = ShaderCache::new(device.context().clone());
let backend = VulkanFrameBackend::new(&device, PipelineConfig::default(), shaders, (800, 600))?;
let _frame_loop = FrameLoop::new(backend, FrameLoopConfig::default());
# let _ = context;
# Ok(())
# }
```
*/

mod vulkan_config;
mod vulkan_context;
mod vulkan_device;
mod vulkan_allocator;
mod vulkan_format;
mod vulkan_shader;
mod vulkan_pipeline;
mod vulkan_swapchain;
mod vulkan_command_list;
mod vulkan_frame_backend;

#[cfg(feature = "vulkan-validation")]
mod vulkan_debug;

// Main orbit namespace module
pub mod orbit {
    pub use crate::vulkan_config::{Config, DebugSeverity};
    pub use crate::vulkan_context::GpuContext;
    pub use crate::vulkan_device::VulkanDevice;
    pub use crate::vulkan_allocator::VulkanAllocator;
    pub use crate::vulkan_shader::ShaderCache;
    pub use crate::vulkan_pipeline::PipelineConfig;
    pub use crate::vulkan_swapchain::Swapchain;
    pub use crate::vulkan_command_list::CommandList;
    pub use crate::vulkan_frame_backend::VulkanFrameBackend;

    // Validation statistics
    #[cfg(feature = "vulkan-validation")]
    pub use crate::vulkan_debug::{validation_stats, ValidationStats};
}
