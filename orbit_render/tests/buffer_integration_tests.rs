//! Integration tests for the synced buffer family
//!
//! Drives the public buffer API against a host-memory device defined in
//! this test crate. No GPU required.
//!
//! Run with: cargo test --test buffer_integration_tests


use orbit_render::orbit::AllocatorHost;
use orbit_render::orbit::buffer::{
    share, FrameSynced, HostVisibleVertexBuffer, InstanceDataSet, MultiInstanceUniformBuffer,
    MultiInstanceUniformBufferDesc, StructUniformData, SyncState, SyncedBuffer, UniformBuffer,
    UniformDataLayout, UniformDataLayoutSet,
};
use orbit_render::orbit::device::{DescriptorType, GraphicsDevice, ShaderStageFlags};
use host_test_device::HostDevice;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct Light {
    position: [f32; 4],
    color: [f32; 4],
}

// ============================================================================
// ALLOCATOR HOST
// ============================================================================

#[test]
fn test_integration_one_allocator_per_device_pair() {
    let first = HostDevice::new(1, 16);
    let second = HostDevice::new(2, 16);
    let mut host = AllocatorHost::new();

    let a = host.device_context(first.clone()).unwrap();
    let b = host.device_context(first.clone()).unwrap();
    let _c = host.device_context(second.clone()).unwrap();

    assert!(std::sync::Arc::ptr_eq(a.allocator(), b.allocator()));
    assert_eq!(host.allocator_count(), 2);

    assert!(host.destroy_allocator(second.handle_pair()));
    assert!(!host.allocator_exists(second.handle_pair()));
    assert!(host.allocator_exists(first.handle_pair()));
}

// ============================================================================
// UNIFORM BUFFER
// ============================================================================

#[test]
fn test_integration_uniform_buffer_uploads_whole_struct() {
    let device = HostDevice::new(1, 64);
    let mut host = AllocatorHost::new();
    let context = host.device_context(device.clone()).unwrap();

    let light = Light { position: [1.0, 2.0, 3.0, 1.0], color: [1.0; 4] };
    let mut buffer = UniformBuffer::new(context, "light", light, 2, ShaderStageFlags::FRAGMENT);
    assert_eq!(buffer.device_sync_state(), SyncState::Empty);

    buffer.update_device().unwrap();
    assert_eq!(buffer.device_sync_state(), SyncState::InSync);
    let handle = buffer.device_buffer().unwrap();
    assert_eq!(device.bytes(handle).unwrap(), bytemuck::bytes_of(&light));

    buffer.uniform_data_mut().color = [0.5; 4];
    assert_eq!(buffer.device_sync_state(), SyncState::OutOfSync);
    assert!(buffer.needs_device_sync());

    buffer.update_device().unwrap();
    let stored: Light = bytemuck::pod_read_unaligned(&device.bytes(handle).unwrap());
    assert_eq!(stored.color, [0.5; 4]);

    let descriptor = buffer.uniform_descriptor().unwrap();
    assert_eq!(descriptor.buffer, handle);
    assert_eq!(descriptor.ranges[0].binding, 2);
    assert_eq!(descriptor.dynamic_offset_count(), 0);

    buffer.free_and_reset().unwrap();
    assert_eq!(buffer.device_sync_state(), SyncState::Empty);
    assert!(device.memory.lock().unwrap().is_empty());
}

// ============================================================================
// MULTI-INSTANCE UNIFORM BUFFER
// ============================================================================

#[test]
fn test_integration_multi_instance_dynamic_offsets() {
    let device = HostDevice::new(1, 16);
    let mut host = AllocatorHost::new();
    let context = host.device_context(device.clone()).unwrap();

    let layouts = UniformDataLayoutSet::new()
        .with(0, UniformDataLayout::from_size(8))
        .with(1, UniformDataLayout::from_size(136));
    let mut desc = MultiInstanceUniformBufferDesc::new("instances", layouts);
    desc.instance_count = 3;
    let mut buffer = MultiInstanceUniformBuffer::new(context, desc).unwrap();

    assert_eq!(buffer.instance_data_size(), 160);
    assert_eq!(buffer.dynamic_offsets(0), vec![0, 16]);
    assert_eq!(buffer.dynamic_offsets(2), vec![320, 336]);

    let descriptor = buffer.uniform_descriptor().unwrap();
    assert_eq!(descriptor.dynamic_offset_count(), 2);
    assert!(descriptor.ranges.iter().all(|r| r.descriptor_type == DescriptorType::UniformBufferDynamic));

    buffer.free_and_reset().unwrap();
}

#[test]
fn test_integration_multi_instance_growth_keeps_data() {
    let device = HostDevice::new(1, 16);
    let mut host = AllocatorHost::new();
    let context = host.device_context(device.clone()).unwrap();

    let layouts = UniformDataLayoutSet::new().with(0, UniformDataLayout::from_size(16));
    let mut buffer = MultiInstanceUniformBuffer::new(
        context,
        MultiInstanceUniformBufferDesc::new("growing", layouts),
    )
    .unwrap();

    for i in 0..3u32 {
        let value = [i as f32; 4];
        let data: InstanceDataSet = [(0u32, share(StructUniformData::new(value)))].into_iter().collect();
        buffer.push_back_instance_with(data).unwrap();
    }
    assert_eq!(buffer.instance_count(), 3);
    assert_eq!(buffer.capacity(), 4);

    buffer.update_device().unwrap();
    let bytes = device.bytes(buffer.device_buffer().unwrap()).unwrap();
    for i in 0..3usize {
        let offset = buffer.bound_data_offset_for_instance(0, i as u32).unwrap() as usize;
        let stored: [f32; 4] = bytemuck::pod_read_unaligned(&bytes[offset..offset + 16]);
        assert_eq!(stored, [i as f32; 4]);
    }
    assert_eq!(buffer.poll_bound_data(), SyncState::InSync);

    buffer.free_and_reset().unwrap();
}

// ============================================================================
// VERTEX BUFFER
// ============================================================================

#[test]
fn test_integration_vertex_buffer_flush_keeps_device_copy() {
    let device = HostDevice::new(1, 16);
    let mut host = AllocatorHost::new();
    let context = host.device_context(device.clone()).unwrap();

    let vertices = vec![[0.0f32, 1.0], [1.0, 0.0], [0.0, 0.0]];
    let mut buffer = HostVisibleVertexBuffer::new(context, "triangle", vertices).unwrap();
    assert_eq!(buffer.device_sync_state(), SyncState::InSync);
    assert_eq!(buffer.vertex_count(), 3);

    buffer.vertices_mut()[0] = [0.5, 0.5];
    buffer.flush_cpu_data().unwrap();
    assert_eq!(buffer.device_sync_state(), SyncState::CpuFlushed);
    assert!(buffer.vertices().is_empty());
    assert_eq!(buffer.vertex_count(), 3);

    let bytes = device.bytes(buffer.device_buffer().unwrap()).unwrap();
    let first: [f32; 2] = bytemuck::pod_read_unaligned(&bytes[..8]);
    assert_eq!(first, [0.5, 0.5]);

    buffer.free_and_reset().unwrap();
}
