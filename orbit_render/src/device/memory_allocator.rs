/// Memory allocator trait

use crate::error::Result;
use super::buffer::BufferDesc;
use super::handles::BufferHandle;

/// Allocates and owns device buffers for one device pair
///
/// Implemented by backend-specific allocators (e.g., VulkanAllocator).
/// Host access goes through `write_buffer` / `read_buffer`, each of which
/// maps the allocation, copies, flushes the mapped range and unmaps.
pub trait MemoryAllocator: Send {
    /// Create a buffer and bind freshly allocated memory to it
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle>;

    /// Destroy a buffer and release its memory
    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<()>;

    /// Copy `data` into a host-visible buffer at `offset`
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()>;

    /// Copy `dst.len()` bytes out of a host-visible buffer starting at `offset`
    fn read_buffer(&mut self, buffer: BufferHandle, offset: u64, dst: &mut [u8]) -> Result<()>;

    /// Size of a live buffer, None if the handle is unknown
    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64>;

    /// Number of buffers currently alive
    fn live_buffer_count(&self) -> usize;

    /// Total bytes requested by live buffers
    fn allocated_bytes(&self) -> u64;
}
