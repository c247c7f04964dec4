/// Buffer descriptors, usage/memory flags and vertex formats

use bitflags::bitflags;

bitflags! {
    /// How a device buffer will be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsageFlags: u32 {
        const VERTEX       = 1 << 0;
        const INDEX        = 1 << 1;
        const UNIFORM      = 1 << 2;
        const TRANSFER_SRC = 1 << 3;
        const TRANSFER_DST = 1 << 4;
    }
}

bitflags! {
    /// Memory-type properties requested for a device buffer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryProperties: u32 {
        const DEVICE_LOCAL  = 1 << 0;
        const HOST_VISIBLE  = 1 << 1;
        const HOST_COHERENT = 1 << 2;
        const HOST_CACHED   = 1 << 3;
    }
}

impl MemoryProperties {
    /// Host-visible + host-coherent: written directly from the CPU
    pub fn host_mapped() -> Self {
        MemoryProperties::HOST_VISIBLE | MemoryProperties::HOST_COHERENT
    }

    /// True when the CPU can map this memory
    pub fn is_host_visible(&self) -> bool {
        self.contains(MemoryProperties::HOST_VISIBLE)
    }
}

/// Descriptor for creating a device buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Size in bytes (must be non-zero)
    pub size: u64,
    pub usage: BufferUsageFlags,
    pub memory: MemoryProperties,
    /// Debug name forwarded to the allocator
    pub name: String,
}

/// Region copied by `CommandRecorder::copy_buffer`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopyRegion {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

impl BufferCopyRegion {
    /// Full-size copy starting at offset 0 on both sides
    pub fn whole(size: u64) -> Self {
        Self {
            src_offset: 0,
            dst_offset: 0,
            size,
        }
    }
}

/// Buffer data format for vertex attributes
///
/// Defines the data type and component count of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum BufferFormat {
    // Float formats
    R32_SFLOAT,         // float (4 bytes)
    R32G32_SFLOAT,      // vec2 (8 bytes)
    R32G32B32_SFLOAT,   // vec3 (12 bytes)
    R32G32B32A32_SFLOAT, // vec4 (16 bytes)

    // Integer formats (signed)
    R32_SINT,
    R32G32_SINT,

    // Integer formats (unsigned)
    R32_UINT,
    R32G32_UINT,

    // Packed color
    R8G8B8A8_UNORM,
}

impl BufferFormat {
    /// Returns size in bytes for this format
    pub fn size_bytes(&self) -> u32 {
        match self {
            BufferFormat::R32_SFLOAT | BufferFormat::R32_SINT | BufferFormat::R32_UINT => 4,
            BufferFormat::R32G32_SFLOAT | BufferFormat::R32G32_SINT | BufferFormat::R32G32_UINT => 8,
            BufferFormat::R32G32B32_SFLOAT => 12,
            BufferFormat::R32G32B32A32_SFLOAT => 16,
            BufferFormat::R8G8B8A8_UNORM => 4,
        }
    }
}

/// One vertex attribute inside an interleaved vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Shader input location
    pub location: u32,
    pub format: BufferFormat,
    /// Byte offset inside the vertex
    pub offset: u32,
}
