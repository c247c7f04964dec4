/// Growable array of uniform instance blocks addressed through dynamic offsets.
///
/// Every instance holds one data interface per binding of the bound
/// `UniformDataLayoutSet`. All instances live in a single host-visible device
/// buffer of `padded_size × capacity` bytes, so draws sharing a pipeline only
/// swap dynamic offsets between calls:
///
/// ```text
/// | instance 0            | instance 1            | ...
/// | b0 | pad | b1 | pad   | b0 | pad | b1 | pad   |
/// ^ 0        ^ offset(b1) ^ padded_size
/// ```
///
/// Growing the capacity allocates a new buffer and re-uploads every
/// materialized instance. The replaced buffer may still be read by frames in
/// flight, so it is retired and only destroyed by `release_retired` (called by
/// the frame loop once the device is idle) or `free_and_reset`.

use crate::buffer::synced_buffer::{FrameSynced, SyncState, SyncedBuffer};
use crate::buffer::uniform_data::{lock_data, InstanceDataSet, UniformDataLayoutSet};
use crate::device::{
    BufferDesc, BufferHandle, BufferUsageFlags, CommandRecorder, DescriptorBinding,
    DescriptorSetLayoutHandle, DescriptorType, DeviceContext, DeviceHandlePair, MemoryProperties,
    ShaderStageFlags, UniformDescriptor, UniformDescriptorRange,
};
use crate::error::Result;
use crate::utils::GrowthPolicy;
use crate::{engine_debug, engine_warn};

/// Creation parameters for a `MultiInstanceUniformBuffer`
#[derive(Debug, Clone)]
pub struct MultiInstanceUniformBufferDesc {
    /// Debug name
    pub name: String,
    /// Binding point → layout of every instance block
    pub layouts: UniformDataLayoutSet,
    /// Initial instance count
    pub instance_count: u32,
    /// Initial capacity (defaults to `instance_count`, never below it)
    pub capacity_hint: Option<u32>,
    /// Shader stages the bindings are visible to
    pub stages: ShaderStageFlags,
    /// Capacity growth policy when instances no longer fit
    pub growth: GrowthPolicy,
}

impl MultiInstanceUniformBufferDesc {
    /// Descriptor with no instances, vertex+fragment visibility and exponential growth
    pub fn new(name: &str, layouts: UniformDataLayoutSet) -> Self {
        Self {
            name: name.to_string(),
            layouts,
            instance_count: 0,
            capacity_hint: None,
            stages: ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
            growth: GrowthPolicy::default(),
        }
    }
}

pub struct MultiInstanceUniformBuffer {
    context: Option<DeviceContext>,
    name: String,
    layouts: UniformDataLayoutSet,
    stages: ShaderStageFlags,
    growth: GrowthPolicy,
    instance_count: u32,
    capacity: u32,
    /// One entry per instance; None until first accessed or explicitly set
    instances: Vec<Option<InstanceDataSet>>,
    buffer: Option<BufferHandle>,
    layout: Option<DescriptorSetLayoutHandle>,
    /// Buffers replaced by a reallocation, awaiting an idle device
    retired: Vec<BufferHandle>,
    cached_state: SyncState,
}

impl MultiInstanceUniformBuffer {
    /// Create the buffer and its descriptor set layout
    ///
    /// The layout set's alignment is taken from the device's minimum
    /// uniform-buffer offset alignment.
    ///
    /// # Panics
    ///
    /// Panics if the layout set is empty.
    pub fn new(context: DeviceContext, desc: MultiInstanceUniformBufferDesc) -> Result<Self> {
        assert!(
            !desc.layouts.is_empty(),
            "multi-instance uniform buffer '{}' needs at least one binding",
            desc.name
        );
        let mut layouts = desc.layouts;
        layouts.set_alignment(context.limits().min_uniform_buffer_offset_alignment);

        let capacity = desc
            .capacity_hint
            .unwrap_or(desc.instance_count)
            .max(desc.instance_count);

        let mut buffer = Self {
            context: Some(context),
            name: desc.name,
            layouts,
            stages: desc.stages,
            growth: desc.growth,
            instance_count: desc.instance_count,
            capacity: 0,
            instances: (0..desc.instance_count).map(|_| None).collect(),
            buffer: None,
            layout: None,
            retired: Vec::new(),
            cached_state: SyncState::Empty,
        };
        buffer.ensure_descriptor_set_layout()?;
        if capacity > 0 {
            buffer.reallocate(capacity)?;
        }
        Ok(buffer)
    }

    // ===== INSTANCES =====

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn growth_policy(&self) -> GrowthPolicy {
        self.growth
    }

    /// Resize to `count` instances, growing the capacity first when needed
    ///
    /// Instances past the new count are dropped; new ones start without data.
    pub fn set_instance_count(&mut self, count: u32) -> Result<()> {
        if count > self.capacity {
            self.reallocate(self.growth.capacity_for(count))?;
        }
        self.instances.resize_with(count as usize, || None);
        self.instance_count = count;
        Ok(())
    }

    /// Reallocate to hold exactly `capacity` instances
    ///
    /// A capacity below the instance count is clamped to the instance count.
    pub fn set_capacity(&mut self, capacity: u32) -> Result<()> {
        let capacity = if capacity < self.instance_count {
            engine_warn!(
                "orbit::buffer",
                "'{}' capacity {} is below the instance count, clamping to {}",
                self.name, capacity, self.instance_count
            );
            self.instance_count
        } else {
            capacity
        };
        if capacity == self.capacity {
            return Ok(());
        }
        self.reallocate(capacity)
    }

    /// Shrink or grow the capacity to the instance count
    pub fn resize_to_fit(&mut self) -> Result<()> {
        self.set_capacity(self.instance_count)
    }

    /// Append one instance and return its index
    pub fn push_back_instance(&mut self) -> Result<u32> {
        let index = self.instance_count;
        self.set_instance_count(index + 1)?;
        Ok(index)
    }

    /// Append one instance backed by `data`
    ///
    /// `data` is validated before anything changes, so a mismatch leaves the
    /// instance count untouched.
    pub fn push_back_instance_with(&mut self, data: InstanceDataSet) -> Result<u32> {
        self.layouts.validate(&data)?;
        let index = self.push_back_instance()?;
        self.attach(index, data)?;
        Ok(index)
    }

    /// Replace the data interfaces of instance `index`
    ///
    /// On a layout mismatch the stored interfaces stay unchanged. Accepted
    /// data is marked dirty so the next sync writes it.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn set_instance_data_interfaces(&mut self, index: u32, data: InstanceDataSet) -> Result<()> {
        self.check_index(index);
        self.layouts.validate(&data)?;
        self.attach(index, data)
    }

    /// Data interfaces of instance `index`, created zeroed on first access
    ///
    /// The returned handles are live: writing through them and marking them
    /// dirty schedules the write for the next sync.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn instance_data_interfaces(&mut self, index: u32) -> &InstanceDataSet {
        self.check_index(index);
        let slot = index as usize;
        if self.instances[slot].is_none() && self.buffer.is_some() {
            self.cached_state = SyncState::OutOfSync;
        }
        let layouts = &self.layouts;
        self.instances[slot].get_or_insert_with(|| layouts.create_default_set())
    }

    /// Detach the data interfaces of instance `index`
    ///
    /// The device slot keeps its last content until the buffer is reallocated.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn free_instance_data_interfaces(&mut self, index: u32) {
        self.check_index(index);
        self.instances[index as usize] = None;
    }

    // ===== ADDRESSING =====

    pub fn layouts(&self) -> &UniformDataLayoutSet {
        &self.layouts
    }

    /// Padded size of one instance block
    pub fn instance_data_size(&self) -> u64 {
        self.layouts.padded_size()
    }

    /// Offset of `binding` inside an instance block
    pub fn bound_data_offset(&self, binding: u32) -> Option<u64> {
        self.layouts.offset(binding)
    }

    /// Absolute offset of `binding` for instance `index`
    ///
    /// This is the dynamic offset to bind for a draw of that instance.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn bound_data_offset_for_instance(&self, binding: u32, index: u32) -> Option<u64> {
        self.check_index(index);
        self.layouts
            .offset(binding)
            .map(|offset| self.layouts.padded_size() * index as u64 + offset)
    }

    /// Dynamic offsets of instance `index` for every binding, in binding order
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn dynamic_offsets(&self, index: u32) -> Vec<u32> {
        self.check_index(index);
        let base = self.layouts.padded_size() * index as u64;
        self.layouts
            .bindings()
            .filter_map(|binding| self.layouts.offset(binding))
            .map(|offset| (base + offset) as u32)
            .collect()
    }

    pub fn descriptor_set_layout(&self) -> Option<DescriptorSetLayoutHandle> {
        self.layout
    }

    // ===== SYNC =====

    /// Scan every bound data interface for a dirty flag
    ///
    /// A poisoned interface counts as dirty.
    pub fn is_bound_data_dirty(&self) -> bool {
        self.instances.iter().flatten().flat_map(|set| set.values()).any(|data| {
            data.lock().map(|guard| guard.is_dirty()).unwrap_or(true)
        })
    }

    /// Rescan the bound data and refresh the cached sync state
    pub fn poll_bound_data(&mut self) -> SyncState {
        self.cached_state = if self.buffer.is_none() {
            SyncState::Empty
        } else if self.is_bound_data_dirty() {
            SyncState::OutOfSync
        } else {
            SyncState::InSync
        };
        self.cached_state
    }

    /// Write every dirty (instance, binding) window into the device buffer
    ///
    /// Dirty flags are cleared only once every write of the pass succeeded.
    pub fn update_device(&mut self) -> Result<()> {
        let Some(buffer) = self.buffer else {
            return Ok(());
        };
        let context = self.context_or_panic().clone();
        let padded = self.layouts.padded_size();
        let mut written = Vec::new();
        {
            let mut allocator = context.lock_allocator()?;
            for (index, set) in self.instances.iter().enumerate() {
                let Some(set) = set else { continue };
                for (binding, data) in set {
                    let Some(offset) = self.layouts.offset(*binding) else { continue };
                    let guard = lock_data(data)?;
                    if !guard.is_dirty() {
                        continue;
                    }
                    allocator.write_buffer(buffer, padded * index as u64 + offset, guard.bytes())?;
                    written.push(data.clone());
                }
            }
        }
        for data in &written {
            lock_data(data)?.set_dirty(false);
        }
        self.cached_state = SyncState::InSync;
        Ok(())
    }

    /// Free everything, then rebuild the layout against another device
    ///
    /// The buffer comes back with no instances.
    pub fn retarget(&mut self, context: DeviceContext) -> Result<()> {
        self.free_and_reset()?;
        self.layouts
            .set_alignment(context.limits().min_uniform_buffer_offset_alignment);
        self.context = Some(context);
        self.ensure_descriptor_set_layout()
    }

    // ===== INTERNALS =====

    fn check_index(&self, index: u32) {
        assert!(
            index < self.instance_count,
            "'{}': instance index {} out of range (instance count {})",
            self.name, index, self.instance_count
        );
    }

    fn context_or_panic(&self) -> &DeviceContext {
        match self.context.as_ref() {
            Some(context) => context,
            None => panic!("multi-instance uniform buffer '{}' has no device affinity", self.name),
        }
    }

    fn attach(&mut self, index: u32, data: InstanceDataSet) -> Result<()> {
        for entry in data.values() {
            lock_data(entry)?.set_dirty(true);
        }
        self.instances[index as usize] = Some(data);
        if self.buffer.is_some() {
            self.cached_state = SyncState::OutOfSync;
        }
        Ok(())
    }

    fn ensure_descriptor_set_layout(&mut self) -> Result<()> {
        if self.layout.is_some() {
            return Ok(());
        }
        let bindings: Vec<DescriptorBinding> = self
            .layouts
            .bindings()
            .map(|binding| DescriptorBinding {
                binding,
                descriptor_type: DescriptorType::UniformBufferDynamic,
                stages: self.stages,
            })
            .collect();
        let layout = self
            .context_or_panic()
            .device()
            .create_descriptor_set_layout(&bindings)?;
        self.layout = Some(layout);
        Ok(())
    }

    /// Move to a new device buffer holding `capacity` instances
    fn reallocate(&mut self, capacity: u32) -> Result<()> {
        let context = self.context_or_panic().clone();
        if capacity > 0 {
            // Gone after free_and_reset
            self.ensure_descriptor_set_layout()?;
        }
        let new_buffer = if capacity > 0 {
            let size = self.layouts.padded_size() * capacity as u64;
            let mut allocator = context.lock_allocator()?;
            let handle = allocator.create_buffer(&BufferDesc {
                size,
                usage: BufferUsageFlags::UNIFORM,
                memory: MemoryProperties::host_mapped(),
                name: self.name.clone(),
            })?;
            // Instances never written must not read stale memory
            if let Err(e) = allocator.write_buffer(handle, 0, &vec![0u8; size as usize]) {
                allocator.destroy_buffer(handle)?;
                return Err(e);
            }
            Some(handle)
        } else {
            None
        };

        if let Some(old) = self.buffer.take() {
            self.retired.push(old);
        }
        engine_debug!(
            "orbit::buffer",
            "'{}' capacity {} → {} ({} bytes per instance)",
            self.name, self.capacity, capacity, self.layouts.padded_size()
        );
        self.buffer = new_buffer;
        self.capacity = capacity;

        for data in self.instances.iter().flatten().flat_map(|set| set.values()) {
            lock_data(data)?.set_dirty(true);
        }
        self.cached_state = if self.buffer.is_some() {
            SyncState::OutOfSync
        } else {
            SyncState::Empty
        };
        Ok(())
    }

    fn has_device_objects(&self) -> bool {
        self.buffer.is_some() || self.layout.is_some() || !self.retired.is_empty()
    }

    fn destroy_device_objects(&mut self) -> Result<()> {
        if !self.has_device_objects() {
            return Ok(());
        }
        let context = self.context_or_panic().clone();
        {
            let mut allocator = context.lock_allocator()?;
            for buffer in self.buffer.take().into_iter().chain(self.retired.drain(..)) {
                allocator.destroy_buffer(buffer)?;
            }
        }
        if let Some(layout) = self.layout.take() {
            context.device().destroy_descriptor_set_layout(layout);
        }
        Ok(())
    }
}

impl SyncedBuffer for MultiInstanceUniformBuffer {
    fn device_sync_state(&self) -> SyncState {
        if self.buffer.is_none() {
            SyncState::Empty
        } else {
            self.cached_state
        }
    }

    fn device_pair(&self) -> Option<DeviceHandlePair> {
        self.context.as_ref().map(|c| c.handle_pair())
    }

    fn device_buffer(&self) -> Option<BufferHandle> {
        self.buffer
    }

    /// Destroy the device buffer and the layout; data handles held elsewhere
    /// stay valid but no longer feed this buffer
    fn free_and_reset(&mut self) -> Result<()> {
        self.destroy_device_objects()?;
        self.instances.clear();
        self.instance_count = 0;
        self.capacity = 0;
        self.cached_state = SyncState::Empty;
        Ok(())
    }
}

impl FrameSynced for MultiInstanceUniformBuffer {
    fn needs_device_sync(&mut self) -> bool {
        self.poll_bound_data() == SyncState::OutOfSync
    }

    fn sync_for_frame(&mut self, _transfer: &mut dyn CommandRecorder) -> Result<()> {
        self.update_device()
    }

    fn uniform_descriptor(&self) -> Option<UniformDescriptor> {
        Some(UniformDescriptor {
            layout: self.layout?,
            buffer: self.buffer?,
            ranges: self
                .layouts
                .iter()
                .map(|(binding, layout)| UniformDescriptorRange {
                    binding,
                    descriptor_type: DescriptorType::UniformBufferDynamic,
                    offset: 0,
                    range: layout.size(),
                })
                .collect(),
        })
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

impl Drop for MultiInstanceUniformBuffer {
    fn drop(&mut self) {
        if !self.has_device_objects() || self.context.is_none() {
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
#[path = "multi_instance_uniform_buffer_tests.rs"]
mod tests;
