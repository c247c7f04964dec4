/// Uniform buffer holding a single POD struct.
///
/// Nothing touches the device until the first `update_device`, which
/// allocates a host-visible buffer sized exactly to `T` and creates the
/// descriptor set layout for its binding. Each update rewrites the whole
/// struct.

use bytemuck::Pod;
use crate::buffer::synced_buffer::{FrameSynced, SyncState, SyncedBuffer};
use crate::device::{
    BufferDesc, BufferHandle, BufferUsageFlags, CommandRecorder, DescriptorBinding,
    DescriptorSetLayoutHandle, DescriptorType, DeviceContext, DeviceHandlePair, MemoryProperties,
    ShaderStageFlags, UniformDescriptor, UniformDescriptorRange,
};
use crate::error::Result;
use crate::{engine_debug, engine_warn};

pub struct UniformBuffer<T: Pod + Send> {
    context: Option<DeviceContext>,
    name: String,
    data: T,
    binding: DescriptorBinding,
    buffer: Option<BufferHandle>,
    layout: Option<DescriptorSetLayoutHandle>,
    state: SyncState,
}

impl<T: Pod + Send> UniformBuffer<T> {
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    pub fn new(context: DeviceContext, name: &str, data: T, binding: u32, stages: ShaderStageFlags) -> Self {
        assert!(
            std::mem::size_of::<T>() > 0,
            "uniform buffer '{}' cannot hold a zero-sized struct",
            name
        );
        Self {
            context: Some(context),
            name: name.to_string(),
            data,
            binding: DescriptorBinding {
                binding,
                descriptor_type: DescriptorType::UniformBuffer,
                stages,
            },
            buffer: None,
            layout: None,
            state: SyncState::Empty,
        }
    }

    pub fn uniform_data(&self) -> &T {
        &self.data
    }

    /// Mutable access to the struct; marks the buffer out of sync
    pub fn uniform_data_mut(&mut self) -> &mut T {
        if self.state != SyncState::Empty {
            self.state = SyncState::OutOfSync;
        }
        &mut self.data
    }

    pub fn binding(&self) -> u32 {
        self.binding.binding
    }

    /// Change the binding point
    ///
    /// Only the binding record changes: a descriptor set layout that already
    /// exists keeps the old binding, so call this before the first update.
    pub fn set_binding(&mut self, binding: u32) {
        self.binding.binding = binding;
    }

    pub fn descriptor_set_layout(&self) -> Option<DescriptorSetLayoutHandle> {
        self.layout
    }

    /// Upload the struct when it changed or was never uploaded
    pub fn update_device(&mut self) -> Result<()> {
        if !matches!(self.state, SyncState::Empty | SyncState::OutOfSync) {
            return Ok(());
        }
        let context = self.context_or_panic().clone();

        if self.buffer.is_none() {
            self.create_device_objects(&context)?;
        }
        if let Some(buffer) = self.buffer {
            context
                .lock_allocator()?
                .write_buffer(buffer, 0, bytemuck::bytes_of(&self.data))?;
        }
        self.state = SyncState::InSync;
        Ok(())
    }

    /// Free everything, then recreate against another device on the next update
    pub fn retarget(&mut self, context: DeviceContext) -> Result<()> {
        self.free_and_reset()?;
        self.context = Some(context);
        Ok(())
    }

    fn context_or_panic(&self) -> &DeviceContext {
        match self.context.as_ref() {
            Some(context) => context,
            None => panic!("uniform buffer '{}' has no device affinity", self.name),
        }
    }

    fn create_device_objects(&mut self, context: &DeviceContext) -> Result<()> {
        let size = std::mem::size_of::<T>() as u64;
        let buffer = context.lock_allocator()?.create_buffer(&BufferDesc {
            size,
            usage: BufferUsageFlags::UNIFORM,
            memory: MemoryProperties::host_mapped(),
            name: self.name.clone(),
        })?;

        let layout = match context.device().create_descriptor_set_layout(&[self.binding]) {
            Ok(layout) => layout,
            Err(e) => {
                context.lock_allocator()?.destroy_buffer(buffer)?;
                return Err(e);
            }
        };

        self.buffer = Some(buffer);
        self.layout = Some(layout);
        engine_debug!("orbit::buffer", "'{}' created uniform buffer ({} bytes)", self.name, size);
        Ok(())
    }

    fn destroy_device_objects(&mut self) -> Result<()> {
        if self.buffer.is_none() && self.layout.is_none() {
            return Ok(());
        }
        let context = self.context_or_panic().clone();
        if let Some(buffer) = self.buffer.take() {
            context.lock_allocator()?.destroy_buffer(buffer)?;
        }
        if let Some(layout) = self.layout.take() {
            context.device().destroy_descriptor_set_layout(layout);
        }
        Ok(())
    }
}

impl<T: Pod + Send> SyncedBuffer for UniformBuffer<T> {
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
        self.destroy_device_objects()?;
        self.state = SyncState::Empty;
        Ok(())
    }
}

impl<T: Pod + Send> FrameSynced for UniformBuffer<T> {
    fn needs_device_sync(&mut self) -> bool {
        matches!(self.state, SyncState::Empty | SyncState::OutOfSync)
    }

    fn sync_for_frame(&mut self, _transfer: &mut dyn CommandRecorder) -> Result<()> {
        self.update_device()
    }

    fn uniform_descriptor(&self) -> Option<UniformDescriptor> {
        Some(UniformDescriptor {
            layout: self.layout?,
            buffer: self.buffer?,
            ranges: vec![UniformDescriptorRange {
                binding: self.binding.binding,
                descriptor_type: DescriptorType::UniformBuffer,
                offset: 0,
                range: std::mem::size_of::<T>() as u64,
            }],
        })
    }
}

impl<T: Pod + Send> Drop for UniformBuffer<T> {
    fn drop(&mut self) {
        if self.buffer.is_none() && self.layout.is_none() {
            return;
        }
        engine_warn!(
            "orbit::buffer",
            "'{}' dropped with live device objects, freeing them now",
            self.name
        );
        if let Err(e) = self.destroy_device_objects() {
            engine_warn!("orbit::buffer", "'{}' failed to free device objects: {}", self.name, e);
        }
    }
}

#[cfg(test)]
#[path = "uniform_buffer_tests.rs"]
mod tests;
