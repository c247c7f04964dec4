/// Command recording trait

use crate::error::Result;
use super::buffer::BufferCopyRegion;
use super::handles::BufferHandle;

/// Recording target for transfer and draw commands
///
/// The core never submits: it only records into a recorder handed to it by
/// the frame loop, which owns submission.
pub trait CommandRecorder {
    /// Copy `region` from `src` into `dst`
    fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, region: BufferCopyRegion) -> Result<()>;

    /// Bind a vertex buffer to a binding slot
    fn bind_vertex_buffer(&mut self, binding: u32, buffer: BufferHandle, offset: u64) -> Result<()>;

    /// Bind the descriptor set built for the `set`-th uniform descriptor
    ///
    /// `dynamic_offsets` must hold one entry per dynamic binding, in binding order.
    fn bind_uniform_set(&mut self, set: u32, dynamic_offsets: &[u32]) -> Result<()>;

    /// Draw non-indexed primitives
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()>;
}
