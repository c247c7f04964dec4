/// Descriptor set layout bindings and the uniform descriptors buffers expose

use bitflags::bitflags;
use super::handles::{BufferHandle, DescriptorSetLayoutHandle};

bitflags! {
    /// Shader stages a binding is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX   = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE  = 1 << 2;
    }
}

/// Kind of uniform descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    /// Fixed offset, bound once
    UniformBuffer,
    /// Offset supplied per draw call when the set is bound
    UniformBufferDynamic,
}

/// One binding of a descriptor set layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub stages: ShaderStageFlags,
}

/// Buffer window written into one binding of a descriptor set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformDescriptorRange {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    /// Base offset (dynamic offsets are added on top at bind time)
    pub offset: u64,
    pub range: u64,
}

/// Everything a backend needs to build a descriptor set for a uniform buffer
///
/// Descriptor pools are swapchain-dependent, so the frame loop rebuilds the
/// sets from these records whenever the swapchain or a buffer handle changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDescriptor {
    pub layout: DescriptorSetLayoutHandle,
    pub buffer: BufferHandle,
    pub ranges: Vec<UniformDescriptorRange>,
}

impl UniformDescriptor {
    /// Number of dynamic offsets expected when binding this set
    pub fn dynamic_offset_count(&self) -> usize {
        self.ranges
            .iter()
            .filter(|r| r.descriptor_type == DescriptorType::UniformBufferDynamic)
            .count()
    }
}
