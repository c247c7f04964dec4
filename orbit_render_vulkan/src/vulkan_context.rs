/// GpuContext - instance, surface, device and queues shared by every Vulkan object
///
/// Shared via `Arc` by the device, the allocators and the frame backend.
/// The last owner to go away destroys the logical device, the surface, the
/// debug messenger and the instance, in that order, so every allocation and
/// swapchain is already gone by then.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use orbit_render::orbit::{Error, Result};
use orbit_render::orbit::device::DeviceLimits;
use orbit_render::{engine_err, engine_error, engine_info};

use crate::vulkan_config::Config;

pub struct GpuContext {
    /// Vulkan library entry (must outlive the instance)
    _entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    /// Vulkan logical device
    pub device: ash::Device,

    pub(crate) graphics_queue: vk::Queue,
    pub(crate) graphics_queue_family: u32,
    pub(crate) present_queue: vk::Queue,

    /// Window surface presented to
    pub(crate) surface: vk::SurfaceKHR,
    pub(crate) surface_loader: ash::khr::surface::Instance,

    pub(crate) limits: DeviceLimits,

    debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl GpuContext {
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &Config) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| {
                    engine_error!("orbit::vulkan", "Failed to load Vulkan library: {:?}", e);
                    Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
                })?;

            let app_name = std::ffi::CString::new(config.app_name.as_str())
                .map_err(|_| Error::InitializationFailed("Application name contains a NUL byte".to_string()))?;
            let (major, minor, patch) = config.app_version;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, major, minor, patch))
                .engine_name(c"Orbit")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_2);

            let display_handle = window.display_handle()
                .map_err(|e| {
                    engine_error!("orbit::vulkan", "Failed to get display handle: {}", e);
                    Error::InitializationFailed(format!("Failed to get display handle: {}", e))
                })?;
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| {
                    engine_error!("orbit::vulkan", "Failed to get required extensions: {}", e);
                    Error::InitializationFailed(format!("Failed to get required extensions: {}", e))
                })?
                .to_vec();

            let validation = validation_enabled(&entry, config)?;
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }
            let layer_names = if validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| {
                    engine_error!("orbit::vulkan", "Failed to create Vulkan instance: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
                })?;

            let (debug_utils_loader, debug_messenger) = if validation {
                create_debug_messenger(&entry, &instance, config)?
            } else {
                (None, None)
            };

            let window_handle = window.window_handle()
                .map_err(|e| {
                    engine_error!("orbit::vulkan", "Failed to get window handle: {}", e);
                    Error::InitializationFailed(format!("Failed to get window handle: {}", e))
                })?;
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                engine_error!("orbit::vulkan", "Failed to create surface: {:?}", e);
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?;

            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            // Pick Physical Device
            let physical_devices = instance
                .enumerate_physical_devices()
                .map_err(|e| {
                    engine_error!("orbit::vulkan", "Failed to enumerate physical devices: {:?}", e);
                    Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
                })?;

            let physical_device = physical_devices
                .into_iter()
                .next()
                .ok_or_else(|| {
                    engine_error!("orbit::vulkan", "No Vulkan-capable GPU found");
                    Error::InitializationFailed("No Vulkan-capable GPU found".to_string())
                })?;

            // Find Queue Families
            let queue_families = instance.get_physical_device_queue_family_properties(physical_device);

            let graphics_family_index = queue_families
                .iter()
                .enumerate()
                .find(|(_, qf)| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                .map(|(i, _)| i as u32)
                .ok_or_else(|| {
                    engine_error!("orbit::vulkan", "No graphics queue family found");
                    Error::InitializationFailed("No graphics queue family found".to_string())
                })?;

            let present_family_index = (0..queue_families.len() as u32)
                .find(|&i| {
                    surface_loader
                        .get_physical_device_surface_support(physical_device, i, surface)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    engine_error!("orbit::vulkan", "No present queue family found");
                    Error::InitializationFailed("No present queue family found".to_string())
                })?;

            // Create Logical Device
            let queue_priorities = [1.0];
            let mut queue_create_infos = vec![
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(graphics_family_index)
                    .queue_priorities(&queue_priorities),
            ];
            if present_family_index != graphics_family_index {
                queue_create_infos.push(
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(present_family_index)
                        .queue_priorities(&queue_priorities),
                );
            }

            let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    engine_error!("orbit::vulkan", "Failed to create logical device: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                })?;

            let graphics_queue = device.get_device_queue(graphics_family_index, 0);
            let present_queue = device.get_device_queue(present_family_index, 0);

            let properties = instance.get_physical_device_properties(physical_device);
            let limits = DeviceLimits {
                min_uniform_buffer_offset_alignment: properties.limits.min_uniform_buffer_offset_alignment.max(1),
            };

            let device_name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "Unknown".to_string());
            engine_info!(
                "orbit::vulkan",
                "Using {} (uniform offset alignment {})",
                device_name, limits.min_uniform_buffer_offset_alignment
            );

            Ok(Self {
                _entry: entry,
                instance,
                physical_device,
                device,
                graphics_queue,
                graphics_queue_family: graphics_family_index,
                present_queue,
                surface,
                surface_loader,
                limits,
                debug_utils_loader,
                debug_messenger,
            })
        }
    }

    /// Raw logical and physical device handles
    pub fn raw_handles(&self) -> (u64, u64) {
        use ash::vk::Handle;
        (self.device.handle().as_raw(), self.physical_device.as_raw())
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| engine_err!("orbit::vulkan", "Failed to wait for device idle: {:?}", e))
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);

            self.surface_loader.destroy_surface(self.surface, None);

            if let (Some(loader), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                loader.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Resolve whether validation layers are turned on for this instance
///
/// A requested layer that is not installed is a fatal configuration error.
#[cfg(feature = "vulkan-validation")]
fn validation_enabled(entry: &ash::Entry, config: &Config) -> Result<bool> {
    if !config.enable_validation {
        return Ok(false);
    }
    let layers = unsafe { entry.enumerate_instance_layer_properties() }
        .map_err(|e| {
            engine_error!("orbit::vulkan", "Failed to enumerate instance layers: {:?}", e);
            Error::InitializationFailed(format!("Failed to enumerate instance layers: {:?}", e))
        })?;
    let available = layers.iter().any(|layer| {
        layer
            .layer_name_as_c_str()
            .map(|name| name == c"VK_LAYER_KHRONOS_validation")
            .unwrap_or(false)
    });
    if !available {
        engine_error!("orbit::vulkan", "VK_LAYER_KHRONOS_validation requested but not installed");
        return Err(Error::InitializationFailed(
            "Validation layer VK_LAYER_KHRONOS_validation is not available".to_string(),
        ));
    }
    Ok(true)
}

#[cfg(not(feature = "vulkan-validation"))]
fn validation_enabled(_entry: &ash::Entry, config: &Config) -> Result<bool> {
    if config.enable_validation {
        orbit_render::engine_warn!(
            "orbit::vulkan",
            "Validation requested but the vulkan-validation feature is disabled, continuing without it"
        );
    }
    Ok(false)
}

type DebugMessenger = (Option<ash::ext::debug_utils::Instance>, Option<vk::DebugUtilsMessengerEXT>);

#[cfg(feature = "vulkan-validation")]
fn create_debug_messenger(entry: &ash::Entry, instance: &ash::Instance, config: &Config) -> Result<DebugMessenger> {
    let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
    crate::vulkan_debug::reset_validation_stats();

    let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(crate::vulkan_debug::severity_flags(config.debug_severity))
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
        )
        .pfn_user_callback(Some(crate::vulkan_debug::vulkan_debug_callback));

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&debug_info, None) }
        .map_err(|e| {
            engine_error!("orbit::vulkan", "Failed to create debug messenger: {:?}", e);
            Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
        })?;

    Ok((Some(debug_utils), Some(messenger)))
}

#[cfg(not(feature = "vulkan-validation"))]
fn create_debug_messenger(_entry: &ash::Entry, _instance: &ash::Instance, _config: &Config) -> Result<DebugMessenger> {
    Ok((None, None))
}
