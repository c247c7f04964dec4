/// Host-visible vertex attribute buffer.
///
/// The CPU vector is the source of truth until `flush_cpu_data` discards it.
/// The device buffer stays host-visible and host-coherent, so an update maps
/// it and rewrites the whole vector; there is no staging hop and no partial
/// update.
///
/// A size change moves the vertices to a new device buffer. The old one may
/// still be read by frames in flight, so it is retired until
/// `release_retired` runs on an idle device.

use bytemuck::Pod;
use crate::buffer::synced_buffer::{FrameSynced, SyncState, SyncedBuffer};
use crate::device::{
    BufferDesc, BufferHandle, BufferUsageFlags, CommandRecorder, DeviceContext, DeviceHandlePair,
    MemoryProperties,
};
use crate::error::Result;
use crate::{engine_trace, engine_warn};

pub struct HostVisibleVertexBuffer<V: Pod + Send> {
    context: Option<DeviceContext>,
    name: String,
    vertices: Vec<V>,
    buffer: Option<BufferHandle>,
    buffer_size: u64,
    device_vertex_count: u32,
    /// Buffers replaced by a size change, awaiting an idle device
    retired: Vec<BufferHandle>,
    state: SyncState,
}

impl<V: Pod + Send> HostVisibleVertexBuffer<V> {
    /// Create the buffer and upload `vertices` right away
    ///
    /// An empty vector leaves the buffer in `SyncState::Empty`.
    pub fn new(context: DeviceContext, name: &str, vertices: Vec<V>) -> Result<Self> {
        let mut buffer = Self {
            context: Some(context),
            name: name.to_string(),
            vertices,
            buffer: None,
            buffer_size: 0,
            device_vertex_count: 0,
            retired: Vec::new(),
            state: SyncState::Empty,
        };
        if !buffer.vertices.is_empty() {
            buffer.upload()?;
        }
        Ok(buffer)
    }

    pub fn vertices(&self) -> &[V] {
        &self.vertices
    }

    /// Mutable access to the CPU vertices
    ///
    /// Marks the buffer out of sync even if nothing is changed; call
    /// `update_device` afterwards.
    pub fn vertices_mut(&mut self) -> &mut Vec<V> {
        if self.state != SyncState::Empty {
            self.state = SyncState::OutOfSync;
        }
        &mut self.vertices
    }

    /// Number of vertices a draw should use
    ///
    /// After a flush this is the count last uploaded to the device.
    pub fn vertex_count(&self) -> u32 {
        match self.state {
            SyncState::CpuFlushed => self.device_vertex_count,
            _ => self.vertices.len() as u32,
        }
    }

    /// Upload the CPU vector if it is newer than the device copy
    pub fn update_device(&mut self) -> Result<()> {
        match self.state {
            SyncState::InSync | SyncState::CpuFlushed => Ok(()),
            SyncState::Empty | SyncState::OutOfSync => self.upload(),
        }
    }

    /// Drop the CPU copy and keep the device buffer
    ///
    /// Pending changes are uploaded first, so a flush never discards data
    /// the device has not seen. Flushing an empty buffer does nothing.
    pub fn flush_cpu_data(&mut self) -> Result<()> {
        match self.state {
            SyncState::Empty | SyncState::CpuFlushed => return Ok(()),
            SyncState::OutOfSync => self.upload()?,
            SyncState::InSync => {}
        }
        if self.state == SyncState::InSync {
            self.vertices = Vec::new();
            self.state = SyncState::CpuFlushed;
        }
        Ok(())
    }

    /// Free everything, then bind the buffer to another device
    ///
    /// The CPU vector is kept and uploaded again on the next update.
    pub fn retarget(&mut self, context: DeviceContext) -> Result<()> {
        self.free_and_reset()?;
        self.context = Some(context);
        Ok(())
    }

    fn context_or_panic(&self) -> &DeviceContext {
        match self.context.as_ref() {
            Some(context) => context,
            None => panic!("vertex buffer '{}' has no device affinity", self.name),
        }
    }

    fn upload(&mut self) -> Result<()> {
        let size = std::mem::size_of_val(self.vertices.as_slice()) as u64;
        if size == 0 {
            self.retire_buffer();
            self.device_vertex_count = 0;
            self.state = SyncState::Empty;
            return Ok(());
        }

        if self.buffer_size != size {
            self.retire_buffer();
        }
        let context = self.context_or_panic().clone();
        let mut allocator = context.lock_allocator()?;
        let buffer = match self.buffer {
            Some(buffer) => buffer,
            None => {
                let buffer = allocator.create_buffer(&BufferDesc {
                    size,
                    usage: BufferUsageFlags::VERTEX,
                    memory: MemoryProperties::host_mapped(),
                    name: self.name.clone(),
                })?;
                self.buffer = Some(buffer);
                self.buffer_size = size;
                buffer
            }
        };

        allocator.write_buffer(buffer, 0, bytemuck::cast_slice(&self.vertices))?;
        self.device_vertex_count = self.vertices.len() as u32;
        self.state = SyncState::InSync;
        engine_trace!("orbit::buffer", "'{}' uploaded {} vertices", self.name, self.device_vertex_count);
        Ok(())
    }

    fn retire_buffer(&mut self) {
        if let Some(previous) = self.buffer.take() {
            self.retired.push(previous);
        }
        self.buffer_size = 0;
    }

    fn destroy_buffer(&mut self) -> Result<()> {
        if self.buffer.is_some() || !self.retired.is_empty() {
            let context = self.context_or_panic().clone();
            let mut allocator = context.lock_allocator()?;
            for buffer in self.buffer.take().into_iter().chain(self.retired.drain(..)) {
                allocator.destroy_buffer(buffer)?;
            }
        }
        self.buffer_size = 0;
        self.device_vertex_count = 0;
        Ok(())
    }
}

impl<V: Pod + Send> SyncedBuffer for HostVisibleVertexBuffer<V> {
    fn device_sync_state(&self) -> SyncState {
        self.state
    }

    fn device_pair(&self) -> Option<DeviceHandlePair> {
        self.context.as_ref().map(|c| c.handle_pair())
    }

    fn device_buffer(&self) -> Option<BufferHandle> {
        self.buffer
    }

    fn free_and_reset(&mut self) -> Result<()> {
        self.destroy_buffer()?;
        self.state = SyncState::Empty;
        Ok(())
    }
}

impl<V: Pod + Send> FrameSynced for HostVisibleVertexBuffer<V> {
    fn needs_device_sync(&mut self) -> bool {
        match self.state {
            SyncState::OutOfSync => true,
            SyncState::Empty => !self.vertices.is_empty(),
            SyncState::InSync | SyncState::CpuFlushed => false,
        }
    }

    fn sync_for_frame(&mut self, _transfer: &mut dyn CommandRecorder) -> Result<()> {
        self.update_device()
    }

    fn has_retired(&self) -> bool {
        !self.retired.is_empty()
    }

    fn release_retired(&mut self) -> Result<()> {
        if self.retired.is_empty() {
            return Ok(());
        }
        let context = self.context_or_panic().clone();
        let mut allocator = context.lock_allocator()?;
        for buffer in self.retired.drain(..) {
            allocator.destroy_buffer(buffer)?;
        }
        Ok(())
    }
}

impl<V: Pod + Send> Drop for HostVisibleVertexBuffer<V> {
    fn drop(&mut self) {
        if self.buffer.is_none() && self.retired.is_empty() {
            return;
        }
        engine_warn!(
            "orbit::buffer",
            "'{}' dropped with a live device buffer, freeing it now",
            self.name
        );
        if let Err(e) = self.destroy_buffer() {
            engine_warn!("orbit::buffer", "'{}' failed to free device buffer: {}", self.name, e);
        }
    }
}

#[cfg(test)]
#[path = "vertex_buffer_tests.rs"]
mod tests;
