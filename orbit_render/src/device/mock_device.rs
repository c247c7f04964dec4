/// Mock graphics device for unit tests (no GPU required)
///
/// Buffers are plain byte vectors held in a `MockMemory` shared between
/// the device, every allocator it creates and the mock command recorder,
/// so tests can check exactly which bytes reached "device" memory.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use rustc_hash::FxHashMap;

use crate::device::{
    BufferCopyRegion, BufferDesc, BufferHandle, CommandRecorder, DescriptorBinding,
    DescriptorSetLayoutHandle, DeviceContext, DeviceHandlePair, DeviceLimits, GraphicsDevice,
    MemoryAllocator,
};
use crate::error::{Error, Result};

// ============================================================================
// Mock Memory
// ============================================================================

#[derive(Debug)]
pub struct MockBuffer {
    pub desc: BufferDesc,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct MockMemory {
    pub buffers: FxHashMap<u64, MockBuffer>,
    next_handle: u64,
    /// (buffer, offset, len) of every host write, in call order
    pub writes: Vec<(BufferHandle, u64, usize)>,
    pub reads: usize,
    pub created: usize,
    pub destroyed: usize,
    /// Remaining `create_buffer` calls allowed before OutOfMemory (None = unlimited)
    pub allocation_budget: Option<usize>,
    /// Number of upcoming `write_buffer` calls that fail
    pub fail_writes: usize,
}

impl MockMemory {
    pub fn bytes(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(|b| b.bytes.as_slice())
    }

    pub fn desc(&self, buffer: BufferHandle) -> Option<&BufferDesc> {
        self.buffers.get(&buffer.0).map(|b| &b.desc)
    }

    pub fn contains(&self, buffer: BufferHandle) -> bool {
        self.buffers.contains_key(&buffer.0)
    }

    fn copy(&mut self, src: BufferHandle, dst: BufferHandle, region: BufferCopyRegion) -> Result<()> {
        let src_range = region.src_offset as usize..(region.src_offset + region.size) as usize;
        let data = self
            .buffers
            .get(&src.0)
            .and_then(|b| b.bytes.get(src_range))
            .ok_or_else(|| Error::InvalidResource(format!("copy source {:?} out of range", src)))?
            .to_vec();
        let dst_buffer = self
            .buffers
            .get_mut(&dst.0)
            .ok_or_else(|| Error::InvalidResource(format!("copy destination {:?} unknown", dst)))?;
        let start = region.dst_offset as usize;
        let end = start + data.len();
        if end > dst_buffer.bytes.len() {
            return Err(Error::InvalidResource(format!("copy destination {:?} out of range", dst)));
        }
        dst_buffer.bytes[start..end].copy_from_slice(&data);
        Ok(())
    }
}

pub type SharedMockMemory = Arc<Mutex<MockMemory>>;

// ============================================================================
// Mock Allocator
// ============================================================================

pub struct MockAllocator {
    memory: SharedMockMemory,
}

impl MockAllocator {
    pub fn new(memory: SharedMockMemory) -> Self {
        Self { memory }
    }
}

impl MemoryAllocator for MockAllocator {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle> {
        let mut memory = self.memory.lock().unwrap();
        match memory.allocation_budget {
            Some(0) => return Err(Error::OutOfMemory),
            Some(remaining) => memory.allocation_budget = Some(remaining - 1),
            None => {}
        }
        if desc.size == 0 {
            return Err(Error::InvalidResource("zero-sized buffer".to_string()));
        }
        memory.next_handle += 1;
        let handle = BufferHandle(memory.next_handle);
        memory.created += 1;
        memory.buffers.insert(
            handle.0,
            MockBuffer {
                desc: desc.clone(),
                bytes: vec![0; desc.size as usize],
            },
        );
        Ok(handle)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<()> {
        let mut memory = self.memory.lock().unwrap();
        match memory.buffers.remove(&buffer.0) {
            Some(_) => {
                memory.destroyed += 1;
                Ok(())
            }
            None => Err(Error::InvalidResource(format!("unknown buffer {:?}", buffer))),
        }
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        let mut memory = self.memory.lock().unwrap();
        if memory.fail_writes > 0 {
            memory.fail_writes -= 1;
            return Err(Error::BackendError("injected map failure".to_string()));
        }
        let target = memory
            .buffers
            .get_mut(&buffer.0)
            .ok_or_else(|| Error::InvalidResource(format!("unknown buffer {:?}", buffer)))?;
        if !target.desc.memory.is_host_visible() {
            return Err(Error::InvalidResource("buffer is not host visible".to_string()));
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > target.bytes.len() {
            return Err(Error::InvalidResource("write out of range".to_string()));
        }
        target.bytes[start..end].copy_from_slice(data);
        memory.writes.push((buffer, offset, data.len()));
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferHandle, offset: u64, dst: &mut [u8]) -> Result<()> {
        let mut memory = self.memory.lock().unwrap();
        let source = memory
            .buffers
            .get(&buffer.0)
            .ok_or_else(|| Error::InvalidResource(format!("unknown buffer {:?}", buffer)))?;
        if !source.desc.memory.is_host_visible() {
            return Err(Error::InvalidResource("buffer is not host visible".to_string()));
        }
        let start = offset as usize;
        let end = start + dst.len();
        if end > source.bytes.len() {
            return Err(Error::InvalidResource("read out of range".to_string()));
        }
        dst.copy_from_slice(&source.bytes[start..end]);
        memory.reads += 1;
        Ok(())
    }

    fn buffer_size(&self, buffer: BufferHandle) -> Option<u64> {
        self.memory.lock().unwrap().buffers.get(&buffer.0).map(|b| b.desc.size)
    }

    fn live_buffer_count(&self) -> usize {
        self.memory.lock().unwrap().buffers.len()
    }

    fn allocated_bytes(&self) -> u64 {
        self.memory.lock().unwrap().buffers.values().map(|b| b.desc.size).sum()
    }
}

// ============================================================================
// Mock Graphics Device
// ============================================================================

pub struct MockGraphicsDevice {
    pub pair: DeviceHandlePair,
    pub limits: DeviceLimits,
    pub memory: SharedMockMemory,
    pub layouts: Mutex<FxHashMap<u64, Vec<DescriptorBinding>>>,
    next_layout: AtomicU64,
    pub allocators_created: AtomicUsize,
    pub fail_allocator_creation: bool,
}

impl MockGraphicsDevice {
    pub fn new(logical: u64, physical: u64, alignment: u64) -> Self {
        Self {
            pair: DeviceHandlePair::new(logical, physical),
            limits: DeviceLimits {
                min_uniform_buffer_offset_alignment: alignment,
            },
            memory: Arc::new(Mutex::new(MockMemory::default())),
            layouts: Mutex::new(FxHashMap::default()),
            next_layout: AtomicU64::new(1),
            allocators_created: AtomicUsize::new(0),
            fail_allocator_creation: false,
        }
    }

    pub fn live_layout_count(&self) -> usize {
        self.layouts.lock().unwrap().len()
    }

    pub fn layout_bindings(&self, layout: DescriptorSetLayoutHandle) -> Option<Vec<DescriptorBinding>> {
        self.layouts.lock().unwrap().get(&layout.0).cloned()
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn handle_pair(&self) -> DeviceHandlePair {
        self.pair
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_allocator(&self) -> Result<Box<dyn MemoryAllocator>> {
        if self.fail_allocator_creation {
            return Err(Error::InitializationFailed("mock allocator creation failed".to_string()));
        }
        self.allocators_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockAllocator::new(self.memory.clone())))
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<DescriptorSetLayoutHandle> {
        let id = self.next_layout.fetch_add(1, Ordering::SeqCst);
        self.layouts.lock().unwrap().insert(id, bindings.to_vec());
        Ok(DescriptorSetLayoutHandle(id))
    }

    fn destroy_descriptor_set_layout(&self, layout: DescriptorSetLayoutHandle) {
        self.layouts.lock().unwrap().remove(&layout.0);
    }
}

// ============================================================================
// Mock Command Recorder
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum MockCommand {
    CopyBuffer {
        src: BufferHandle,
        dst: BufferHandle,
        region: BufferCopyRegion,
    },
    BindVertexBuffer {
        binding: u32,
        buffer: BufferHandle,
        offset: u64,
    },
    BindUniformSet {
        set: u32,
        dynamic_offsets: Vec<u32>,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
}

#[derive(Debug, Default)]
pub struct MockCommandRecorder {
    pub commands: Vec<MockCommand>,
}

impl MockCommandRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every recorded copy to `memory`, as a queue submit would
    pub fn execute(&mut self, memory: &SharedMockMemory) -> Result<()> {
        let mut memory = memory.lock().unwrap();
        for command in self.commands.drain(..) {
            if let MockCommand::CopyBuffer { src, dst, region } = command {
                memory.copy(src, dst, region)?;
            }
        }
        Ok(())
    }

    pub fn copy_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, MockCommand::CopyBuffer { .. }))
            .count()
    }
}

impl CommandRecorder for MockCommandRecorder {
    fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, region: BufferCopyRegion) -> Result<()> {
        self.commands.push(MockCommand::CopyBuffer { src, dst, region });
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, binding: u32, buffer: BufferHandle, offset: u64) -> Result<()> {
        self.commands.push(MockCommand::BindVertexBuffer { binding, buffer, offset });
        Ok(())
    }

    fn bind_uniform_set(&mut self, set: u32, dynamic_offsets: &[u32]) -> Result<()> {
        self.commands.push(MockCommand::BindUniformSet {
            set,
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, _first_vertex: u32, _first_instance: u32) -> Result<()> {
        self.commands.push(MockCommand::Draw { vertex_count, instance_count });
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Device context backed by a fresh mock device with the given alignment
pub fn mock_context_with_alignment(alignment: u64) -> (DeviceContext, Arc<MockGraphicsDevice>) {
    let device = Arc::new(MockGraphicsDevice::new(0x10, 0x20, alignment));
    let allocator = device.create_allocator().unwrap();
    let context = DeviceContext::new(device.clone(), Arc::new(Mutex::new(allocator)));
    (context, device)
}

/// Device context backed by a mock device reporting 16-byte alignment
pub fn mock_context() -> (DeviceContext, Arc<MockGraphicsDevice>) {
    mock_context_with_alignment(16)
}
