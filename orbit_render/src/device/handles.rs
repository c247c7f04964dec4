/// Opaque handles exchanged between the core and a backend

/// Identifies a (logical device, physical device) combination
///
/// Used as the allocator registry key and as the device affinity every
/// synced buffer carries. The values are the backend's raw handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandlePair {
    pub logical: u64,
    pub physical: u64,
}

impl DeviceHandlePair {
    pub fn new(logical: u64, physical: u64) -> Self {
        Self { logical, physical }
    }
}

/// Device buffer owned by a `MemoryAllocator`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Descriptor set layout created by a `GraphicsDevice`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutHandle(pub u64);

/// Device limits the core depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// `minUniformBufferOffsetAlignment` (always a power of two)
    pub min_uniform_buffer_offset_alignment: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_uniform_buffer_offset_alignment: 256,
        }
    }
}
