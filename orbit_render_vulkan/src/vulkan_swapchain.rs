/// Swapchain - presentable images of the window surface
///
/// Recreated wholesale by the frame backend; the previous swapchain is
/// passed as `old_swapchain` and destroyed once its replacement exists.

use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;
use orbit_render::orbit::{Error, Result};
use orbit_render::orbit::frame::AcquireResult;
use orbit_render::{engine_bail, engine_err, engine_error};

use crate::vulkan_context::GpuContext;

pub struct Swapchain {
    ctx: Arc<GpuContext>,
    loader: ash::khr::swapchain::Device,
    pub(crate) swapchain: vk::SwapchainKHR,
    pub(crate) image_views: Vec<vk::ImageView>,
    pub(crate) format: vk::Format,
    pub(crate) extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain sized to the surface (or to `window_extent` when
    /// the surface leaves the choice to the application)
    pub fn new(
        ctx: Arc<GpuContext>,
        window_extent: (u32, u32),
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self> {
        unsafe {
            let capabilities = ctx
                .surface_loader
                .get_physical_device_surface_capabilities(ctx.physical_device, ctx.surface)
                .map_err(|e| {
                    engine_error!("orbit::vulkan", "Failed to get surface capabilities: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface capabilities: {:?}", e))
                })?;

            let surface_formats = ctx
                .surface_loader
                .get_physical_device_surface_formats(ctx.physical_device, ctx.surface)
                .map_err(|e| {
                    engine_error!("orbit::vulkan", "Failed to query surface formats: {:?}", e);
                    Error::InitializationFailed(format!("Failed to get surface formats: {:?}", e))
                })?;

            let surface_format = choose_surface_format(&surface_formats).ok_or_else(|| {
                engine_error!("orbit::vulkan", "Surface reports no formats");
                Error::InitializationFailed("Surface reports no formats".to_string())
            })?;

            let extent = choose_extent(&capabilities, window_extent);
            if extent.width == 0 || extent.height == 0 {
                engine_bail!("orbit::vulkan", "Cannot create a swapchain for a zero-sized surface");
            }

            let create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(ctx.surface)
                .min_image_count(choose_image_count(&capabilities))
                .image_format(surface_format.format)
                .image_color_space(surface_format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(vk::PresentModeKHR::FIFO)
                .clipped(true)
                .old_swapchain(old_swapchain);

            let loader = ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device);
            let swapchain = loader
                .create_swapchain(&create_info, None)
                .map_err(|e| {
                    engine_error!("orbit::vulkan", "Failed to create swapchain: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create swapchain: {:?}", e))
                })?;

            let images = match loader.get_swapchain_images(swapchain) {
                Ok(images) => images,
                Err(e) => {
                    loader.destroy_swapchain(swapchain, None);
                    return Err(engine_err!("orbit::vulkan", "Failed to get swapchain images: {:?}", e));
                }
            };

            let mut image_views = Vec::with_capacity(images.len());
            for &image in &images {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                match ctx.device.create_image_view(&view_info, None) {
                    Ok(view) => image_views.push(view),
                    Err(e) => {
                        for view in image_views {
                            ctx.device.destroy_image_view(view, None);
                        }
                        loader.destroy_swapchain(swapchain, None);
                        return Err(engine_err!("orbit::vulkan", "Failed to create swapchain image view: {:?}", e));
                    }
                }
            }

            Ok(Self {
                ctx,
                loader,
                swapchain,
                image_views,
                format: surface_format.format,
                extent,
            })
        }
    }

    pub fn image_count(&self) -> u32 {
        self.image_views.len() as u32
    }

    /// Acquire the next image, signaling `image_available`
    pub fn acquire_next_image(&self, image_available: vk::Semaphore) -> Result<AcquireResult> {
        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        };
        acquire_result(result)
    }

    /// Queue `image_index` for presentation once `render_finished` signals
    ///
    /// Out-of-date maps to `Error::SwapchainOutOfDate`; suboptimal counts as
    /// success.
    pub fn present(&self, queue: vk::Queue, image_index: u32, render_finished: vk::Semaphore) -> Result<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [render_finished];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(queue, &present_info) } {
            Ok(_suboptimal) => Ok(()),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(Error::SwapchainOutOfDate),
            Err(e) => Err(Error::BackendError(format!("Failed to present: {:?}", e))),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.ctx.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Map a raw acquire result onto the frame loop's vocabulary
pub(crate) fn acquire_result(result: VkResult<(u32, bool)>) -> Result<AcquireResult> {
    match result {
        Ok((image_index, false)) => Ok(AcquireResult::Ready(image_index)),
        Ok((image_index, true)) => Ok(AcquireResult::Suboptimal(image_index)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
        Err(e) => Err(engine_err!("orbit::vulkan", "Failed to acquire next swapchain image: {:?}", e)),
    }
}

/// Prefer an sRGB 8-bit BGRA/RGBA format, else the first one offered
pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            (f.format == vk::Format::B8G8R8A8_SRGB || f.format == vk::Format::R8G8B8A8_SRGB)
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// The surface's current extent, or the window size clamped to the
/// supported range when the surface reports the "undefined" sentinel
pub(crate) fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window_extent: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: window_extent.0.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: window_extent.1.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One image above the minimum, capped by the maximum (0 means unbounded)
pub(crate) fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
