/// Conversions from core descriptor types to Vulkan enums and flags

use ash::vk;
use gpu_allocator::MemoryLocation;
use orbit_render::orbit::device::{
    BufferFormat, BufferUsageFlags, DescriptorType, MemoryProperties, ShaderStageFlags,
};

/// Convert BufferFormat to Vulkan format
pub(crate) fn buffer_format_to_vk(format: BufferFormat) -> vk::Format {
    match format {
        // Float formats
        BufferFormat::R32_SFLOAT => vk::Format::R32_SFLOAT,
        BufferFormat::R32G32_SFLOAT => vk::Format::R32G32_SFLOAT,
        BufferFormat::R32G32B32_SFLOAT => vk::Format::R32G32B32_SFLOAT,
        BufferFormat::R32G32B32A32_SFLOAT => vk::Format::R32G32B32A32_SFLOAT,
        // Integer formats
        BufferFormat::R32_SINT => vk::Format::R32_SINT,
        BufferFormat::R32G32_SINT => vk::Format::R32G32_SINT,
        BufferFormat::R32_UINT => vk::Format::R32_UINT,
        BufferFormat::R32G32_UINT => vk::Format::R32G32_UINT,
        // Packed color
        BufferFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
    }
}

pub(crate) fn buffer_usage_to_vk(usage: BufferUsageFlags) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsageFlags::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsageFlags::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsageFlags::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsageFlags::TRANSFER_SRC) {
        flags |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsageFlags::TRANSFER_DST) {
        flags |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    flags
}

/// Pick the gpu-allocator location matching the requested memory properties
///
/// Host-visible locations are host-coherent in gpu-allocator, so mapped
/// writes need no explicit flush.
pub(crate) fn memory_location(memory: MemoryProperties) -> MemoryLocation {
    if !memory.is_host_visible() {
        MemoryLocation::GpuOnly
    } else if memory.contains(MemoryProperties::HOST_CACHED) {
        MemoryLocation::GpuToCpu
    } else {
        MemoryLocation::CpuToGpu
    }
}

pub(crate) fn descriptor_type_to_vk(descriptor_type: DescriptorType) -> vk::DescriptorType {
    match descriptor_type {
        DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorType::UniformBufferDynamic => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
    }
}

pub(crate) fn shader_stages_to_vk(stages: ShaderStageFlags) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStageFlags::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStageFlags::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    if stages.contains(ShaderStageFlags::COMPUTE) {
        flags |= vk::ShaderStageFlags::COMPUTE;
    }
    flags
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
