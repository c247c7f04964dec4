/// GraphicsDevice trait and the device context handed to buffers

use std::sync::{Arc, Mutex, MutexGuard};
use crate::error::{Error, Result};
use super::descriptor::DescriptorBinding;
use super::handles::{DescriptorSetLayoutHandle, DeviceHandlePair, DeviceLimits};
use super::memory_allocator::MemoryAllocator;

/// Allocator shared by every buffer created against the same device pair
pub type SharedAllocator = Arc<Mutex<Box<dyn MemoryAllocator>>>;

/// Logical device as seen by the core
///
/// Implemented by backend-specific devices (e.g., VulkanDevice).
pub trait GraphicsDevice: Send + Sync {
    /// Raw (logical, physical) handles identifying this device
    fn handle_pair(&self) -> DeviceHandlePair;

    /// Limits queried at device creation
    fn limits(&self) -> DeviceLimits;

    /// Create a new memory allocator for this device
    fn create_allocator(&self) -> Result<Box<dyn MemoryAllocator>>;

    /// Create a descriptor set layout
    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<DescriptorSetLayoutHandle>;

    /// Destroy a descriptor set layout
    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle);
}

/// Device plus the allocator registered for it
///
/// Cloning is cheap. Every synced buffer holds one as its device affinity.
#[derive(Clone)]
pub struct DeviceContext {
    device: Arc<dyn GraphicsDevice>,
    allocator: SharedAllocator,
}

impl DeviceContext {
    pub fn new(device: Arc<dyn GraphicsDevice>, allocator: SharedAllocator) -> Self {
        Self { device, allocator }
    }

    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    pub fn allocator(&self) -> &SharedAllocator {
        &self.allocator
    }

    pub fn handle_pair(&self) -> DeviceHandlePair {
        self.device.handle_pair()
    }

    pub fn limits(&self) -> DeviceLimits {
        self.device.limits()
    }

    /// Lock the allocator, mapping a poisoned lock to a backend error
    pub fn lock_allocator(&self) -> Result<MutexGuard<'_, Box<dyn MemoryAllocator>>> {
        self.allocator
            .lock()
            .map_err(|_| Error::BackendError("Allocator lock poisoned".to_string()))
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("device", &self.device.handle_pair())
            .finish()
    }
}
