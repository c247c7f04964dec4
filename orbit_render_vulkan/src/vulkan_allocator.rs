/// VulkanAllocator - gpu-allocator backed implementation of MemoryAllocator
///
/// Buffers are keyed by their raw `vk::Buffer` handle, which is also the
/// value of the `BufferHandle` handed to the core. Host-visible allocations
/// are persistently mapped and host-coherent, so writes and reads are plain
/// copies through the mapped pointer.

use ash::vk::{self, Handle};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use rustc_hash::FxHashMap;
use std::mem::ManuallyDrop;
use std::sync::Arc;
use orbit_render::orbit::{Error, Result};
use orbit_render::orbit::device::{BufferDesc, BufferHandle, MemoryAllocator};
use orbit_render::{engine_bail, engine_err, engine_error, engine_warn};

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{buffer_usage_to_vk, memory_location};

struct AllocatedBuffer {
    buffer: vk::Buffer,
    allocation: Allocation,
    size: u64,
}

pub struct VulkanAllocator {
    /// Keeps the device alive for as long as allocations exist
    ctx: Arc<GpuContext>,
    /// Dropped in `Drop` before `ctx` releases the device
    allocator: ManuallyDrop<Allocator>,
    buffers: FxHashMap<u64, AllocatedBuffer>,
    allocated_bytes: u64,
}

impl VulkanAllocator {
    pub fn new(ctx: Arc<GpuContext>) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: ctx.instance.clone(),
            device: ctx.device.clone(),
            physical_device: ctx.physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| {
            engine_error!("orbit::vulkan", "Failed to create GPU allocator: {:?}", e);
            Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
        })?;

        Ok(Self {
            ctx,
            allocator: ManuallyDrop::new(allocator),
            buffers: FxHashMap::default(),
            allocated_bytes: 0,
        })
    }

    fn lookup(&self, buffer: BufferHandle) -> Result<&AllocatedBuffer> {
        self.buffers
            .get(&buffer.0)
            .ok_or_else(|| Error::InvalidResource(format!("Unknown buffer handle {:#x}", buffer.0)))
    }

    /// Mapped pointer of `buffer` at `offset`, after checking the range fits
    fn mapped_range(&self, buffer: BufferHandle, offset: u64, len: usize) -> Result<*mut u8> {
        let entry = self.lookup(buffer)?;
        let end = offset.checked_add(len as u64);
        if end.map_or(true, |end| end > entry.size) {
            engine_bail!(
                "orbit::vulkan",
                "Range {}..{} is outside buffer {:#x} of {} bytes",
                offset, offset.saturating_add(len as u64), buffer.0, entry.size
            );
        }
        let mapped = entry
            .allocation
            .mapped_ptr()
            .ok_or_else(|| Error::InvalidResource(format!("Buffer {:#x} is not host-visible", buffer.0)))?;
        Ok(unsafe { (mapped.as_ptr() as *mut u8).add(offset as usize) })
    }

    fn free_entry(&mut self, entry: AllocatedBuffer) -> Result<()> {
        self.allocated_bytes -= entry.size;
        let result = self.allocator.free(entry.allocation);
        unsafe {
            self.ctx.device.destroy_buffer(entry.buffer, None);
        }
        result.map_err(|e| engine_err!("orbit::vulkan", "Failed to free buffer memory: {:?}", e))
    }
}

impl MemoryAllocator for VulkanAllocator {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle> {
        if desc.size == 0 {
            engine_bail!("orbit::vulkan", "Buffer '{}' requested with size 0", desc.name);
        }

        unsafe {
            let buffer_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(buffer_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = self.ctx.device.create_buffer(&buffer_info, None)
                .map_err(|e| engine_err!("orbit::vulkan", "Failed to create buffer '{}': {:?}", desc.name, e))?;

            let requirements = self.ctx.device.get_buffer_memory_requirements(buffer);

            let allocation = match self.allocator.allocate(&AllocationCreateDesc {
                name: &desc.name,
                requirements,
                location: memory_location(desc.memory),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            }) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.ctx.device.destroy_buffer(buffer, None);
                    engine_error!("orbit::vulkan", "Failed to allocate memory for '{}': {:?}", desc.name, e);
                    return Err(Error::OutOfMemory);
                }
            };

            if let Err(e) = self.ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                let _ = self.allocator.free(allocation);
                self.ctx.device.destroy_buffer(buffer, None);
                return Err(engine_err!("orbit::vulkan", "Failed to bind memory of '{}': {:?}", desc.name, e));
            }

            self.allocated_bytes += desc.size;
            self.buffers.insert(buffer.as_raw(), AllocatedBuffer {
                buffer,
                allocation,
                size: desc.size,
            });
            Ok(BufferHandle(buffer.as_raw()))
        }
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        let entry = self
            .buffers
            .remove(&buffer.0)
            .ok_or_else(|| Error::InvalidResource(format!("Unknown buffer handle {:#x}", buffer.0)))?;
        self.free_entry(entry)
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let dst = self.mapped_range(buffer, offset, data.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferHandle, offset: u64, dst: &mut [u8]) -> Result<()> {
        let src = self.mapped_range(buffer, offset, dst.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.buffers.get(&buffer.0).map(|entry| entry.size)
    }

    fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }
}

impl Drop for VulkanAllocator {
    fn drop(&mut self) {
        if !self.buffers.is_empty() {
            engine_warn!(
                "orbit::vulkan",
                "Allocator dropped with {} live buffers ({} bytes), freeing them",
                self.buffers.len(), self.allocated_bytes
            );
        }
        let _ = self.ctx.wait_idle();
        let leftovers: Vec<AllocatedBuffer> = self.buffers.drain().map(|(_, entry)| entry).collect();
        for entry in leftovers {
            let _ = self.free_entry(entry);
        }
        unsafe {
            ManuallyDrop::drop(&mut self.allocator);
        }
    }
}
