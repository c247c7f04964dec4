use std::sync::{Arc, Mutex};
use serial_test::serial;

use super::*;
use crate::buffer::uniform_data::{share, RawUniformData, UniformData, UniformDataLayout};
use crate::device::mock_device::{mock_context, mock_context_with_alignment, MockCommandRecorder, MockGraphicsDevice};
use crate::error::{Error, LayoutMismatch};
use crate::log::LogSeverity;
use crate::orbit::Engine;
use crate::test_utils::CaptureLogger;

// ============================================================================
// HELPERS
// ============================================================================

/// Two bindings: 8 bytes at binding 0, 136 bytes at binding 1
fn two_binding_layouts() -> UniformDataLayoutSet {
    UniformDataLayoutSet::new()
        .with(0, UniformDataLayout::from_size(8))
        .with(1, UniformDataLayout::from_size(136))
}

fn create(count: u32, growth: GrowthPolicy) -> (MultiInstanceUniformBuffer, Arc<MockGraphicsDevice>) {
    let (context, device) = mock_context();
    let mut desc = MultiInstanceUniformBufferDesc::new("instances", two_binding_layouts());
    desc.instance_count = count;
    desc.growth = growth;
    (MultiInstanceUniformBuffer::new(context, desc).unwrap(), device)
}

fn writes(device: &MockGraphicsDevice) -> Vec<(BufferHandle, u64, usize)> {
    device.memory.lock().unwrap().writes.clone()
}

fn mark_dirty(buffer: &mut MultiInstanceUniformBuffer, index: u32, binding: u32) {
    let set = buffer.instance_data_interfaces(index);
    lock_data(&set[&binding]).unwrap().set_dirty(true);
}

// ============================================================================
// LAYOUT AND ADDRESSING
// ============================================================================

#[test]
fn test_instance_block_at_alignment_16() {
    let (mut buffer, device) = create(3, GrowthPolicy::Exponential);

    assert_eq!(buffer.instance_data_size(), 160);
    assert_eq!(buffer.bound_data_offset(0), Some(0));
    assert_eq!(buffer.bound_data_offset(1), Some(16));
    assert_eq!(buffer.capacity(), 3);

    let handle = buffer.device_buffer().unwrap();
    let memory = device.memory.lock().unwrap();
    let desc = memory.desc(handle).unwrap();
    assert_eq!(desc.size, 480);
    assert_eq!(desc.usage, BufferUsageFlags::UNIFORM);
    drop(memory);
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_alignment_comes_from_device_limits() {
    let (context, _device) = mock_context_with_alignment(256);
    let mut desc = MultiInstanceUniformBufferDesc::new("instances", two_binding_layouts());
    desc.instance_count = 1;
    let mut buffer = MultiInstanceUniformBuffer::new(context, desc).unwrap();

    assert_eq!(buffer.layouts().alignment(), 256);
    assert_eq!(buffer.instance_data_size(), 512);
    assert_eq!(buffer.bound_data_offset(1), Some(256));
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_absolute_offsets_do_not_overlap() {
    let (mut buffer, _device) = create(4, GrowthPolicy::Exponential);
    let mut windows = Vec::new();

    for index in 0..4 {
        for (binding, layout) in buffer.layouts().iter() {
            let absolute = buffer.bound_data_offset_for_instance(binding, index).unwrap();
            assert_eq!(
                absolute,
                buffer.instance_data_size() * index as u64 + buffer.bound_data_offset(binding).unwrap()
            );
            windows.push((absolute, absolute + layout.size()));
        }
    }

    windows.sort();
    for pair in windows.windows(2) {
        assert!(pair[0].1 <= pair[1].0, "{:?} overlaps {:?}", pair[0], pair[1]);
    }
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_unknown_binding_has_no_offset() {
    let (mut buffer, _device) = create(1, GrowthPolicy::Exponential);
    assert_eq!(buffer.bound_data_offset(7), None);
    assert_eq!(buffer.bound_data_offset_for_instance(7, 0), None);
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_dynamic_offsets_follow_binding_order() {
    let (mut buffer, _device) = create(3, GrowthPolicy::Exponential);
    assert_eq!(buffer.dynamic_offsets(0), vec![0, 16]);
    assert_eq!(buffer.dynamic_offsets(2), vec![320, 336]);
    buffer.free_and_reset().unwrap();
}

#[test]
#[should_panic(expected = "out of range")]
fn test_offset_for_missing_instance_panics() {
    let (buffer, _device) = create(2, GrowthPolicy::Exponential);
    buffer.bound_data_offset_for_instance(0, 2);
}

#[test]
fn test_descriptor_layout_uses_dynamic_bindings() {
    let (mut buffer, device) = create(1, GrowthPolicy::Exponential);

    let bindings = device.layout_bindings(buffer.descriptor_set_layout().unwrap()).unwrap();
    assert_eq!(bindings.len(), 2);
    assert!(bindings
        .iter()
        .all(|b| b.descriptor_type == DescriptorType::UniformBufferDynamic));

    let descriptor = buffer.uniform_descriptor().unwrap();
    assert_eq!(descriptor.buffer, buffer.device_buffer().unwrap());
    assert_eq!(descriptor.dynamic_offset_count(), 2);
    assert_eq!(descriptor.ranges[1].range, 136);
    assert_eq!(descriptor.ranges[1].offset, 0);
    buffer.free_and_reset().unwrap();
}

// ============================================================================
// CAPACITY
// ============================================================================

#[test]
fn test_push_back_at_capacity_grows_exponentially() {
    let (mut buffer, _device) = create(3, GrowthPolicy::Exponential);
    assert_eq!(buffer.capacity(), 3);

    let index = buffer.push_back_instance().unwrap();

    assert_eq!(index, 3);
    assert_eq!(buffer.instance_count(), 4);
    assert_eq!(buffer.capacity(), 4);
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_growth_policies() {
    let (mut exponential, _a) = create(0, GrowthPolicy::Exponential);
    exponential.set_instance_count(5).unwrap();
    assert_eq!(exponential.capacity(), 8);

    let (mut exact, _b) = create(0, GrowthPolicy::Exact);
    exact.set_instance_count(5).unwrap();
    assert_eq!(exact.capacity(), 5);

    exponential.free_and_reset().unwrap();
    exact.free_and_reset().unwrap();
}

#[test]
fn test_capacity_never_drops_below_instance_count() {
    let (mut buffer, _device) = create(2, GrowthPolicy::Exponential);

    buffer.push_back_instance().unwrap();
    assert!(buffer.capacity() >= buffer.instance_count());
    buffer.set_capacity(16).unwrap();
    assert_eq!(buffer.capacity(), 16);
    buffer.set_instance_count(9).unwrap();
    assert_eq!(buffer.capacity(), 16);
    buffer.set_capacity(1).unwrap();
    assert_eq!(buffer.capacity(), 9);
    buffer.set_instance_count(2).unwrap();
    assert!(buffer.capacity() >= buffer.instance_count());

    buffer.resize_to_fit().unwrap();
    assert_eq!(buffer.capacity(), buffer.instance_count());
    buffer.free_and_reset().unwrap();
}

#[test]
#[serial]
fn test_capacity_clamp_warns() {
    Engine::reset_logger();
    let logger = CaptureLogger::install();
    let (mut buffer, _device) = create(4, GrowthPolicy::Exponential);

    buffer.set_capacity(2).unwrap();

    assert_eq!(buffer.capacity(), 4);
    assert!(logger.contains(LogSeverity::Warn, "clamping to 4"));
    buffer.free_and_reset().unwrap();
    Engine::reset_logger();
}

#[test]
fn test_capacity_hint_preallocates() {
    let (context, device) = mock_context();
    let mut desc = MultiInstanceUniformBufferDesc::new("instances", two_binding_layouts());
    desc.instance_count = 2;
    desc.capacity_hint = Some(6);
    let mut buffer = MultiInstanceUniformBuffer::new(context, desc).unwrap();
    let handle = buffer.device_buffer().unwrap();

    buffer.set_instance_count(6).unwrap();

    assert_eq!(buffer.capacity(), 6);
    assert_eq!(buffer.device_buffer(), Some(handle));
    assert_eq!(device.memory.lock().unwrap().created, 1);
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_zero_instances_allocate_no_buffer() {
    let (mut buffer, device) = create(0, GrowthPolicy::Exponential);

    assert_eq!(buffer.device_sync_state(), SyncState::Empty);
    assert_eq!(buffer.device_buffer(), None);
    assert!(buffer.descriptor_set_layout().is_some());
    assert_eq!(device.memory.lock().unwrap().buffers.len(), 0);
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_growth_retires_old_buffer_until_released() {
    let (mut buffer, device) = create(1, GrowthPolicy::Exponential);
    let old = buffer.device_buffer().unwrap();

    buffer.set_instance_count(3).unwrap();
    let new = buffer.device_buffer().unwrap();
    assert_ne!(old, new);
    assert!(device.memory.lock().unwrap().contains(old));

    buffer.release_retired().unwrap();
    let memory = device.memory.lock().unwrap();
    assert!(!memory.contains(old));
    assert!(memory.contains(new));
    drop(memory);
    buffer.free_and_reset().unwrap();
}

// ============================================================================
// DATA INTERFACES
// ============================================================================

#[test]
fn test_data_interfaces_are_created_lazily() {
    let (mut buffer, _device) = create(2, GrowthPolicy::Exponential);
    assert!(!buffer.is_bound_data_dirty());

    let set = buffer.instance_data_interfaces(1);
    assert_eq!(set.len(), 2);
    assert_eq!(lock_data(&set[&1]).unwrap().size(), 136);

    assert!(buffer.is_bound_data_dirty());
    assert_eq!(buffer.device_sync_state(), SyncState::OutOfSync);
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_returned_handles_are_live() {
    let (mut buffer, _device) = create(1, GrowthPolicy::Exponential);
    let first = buffer.instance_data_interfaces(0)[&0].clone();
    let second = buffer.instance_data_interfaces(0)[&0].clone();
    assert!(Arc::ptr_eq(&first, &second));
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_mismatched_data_is_rejected_and_storage_unchanged() {
    let (mut buffer, _device) = create(3, GrowthPolicy::Exponential);
    let original = buffer.instance_data_interfaces(1)[&1].clone();

    let mut wrong = buffer.layouts().create_default_set();
    wrong.insert(1, share(RawUniformData::new(64)));
    let result = buffer.set_instance_data_interfaces(1, wrong);

    assert_eq!(
        result,
        Err(Error::LayoutMismatch(LayoutMismatch::SizeMismatch {
            binding: 1,
            expected: 136,
            actual: 64,
        }))
    );
    assert!(Arc::ptr_eq(&buffer.instance_data_interfaces(1)[&1], &original));
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_extra_binding_is_rejected() {
    let (mut buffer, _device) = create(1, GrowthPolicy::Exponential);
    let mut extra = buffer.layouts().create_default_set();
    extra.insert(5, share(RawUniformData::new(8)));

    let result = buffer.push_back_instance_with(extra);

    assert_eq!(result, Err(Error::LayoutMismatch(LayoutMismatch::UnknownBinding(5))));
    assert_eq!(buffer.instance_count(), 1);
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_attached_data_is_forced_dirty() {
    let (mut buffer, _device) = create(1, GrowthPolicy::Exponential);
    let data = buffer.layouts().create_default_set();
    for entry in data.values() {
        lock_data(entry).unwrap().set_dirty(false);
    }

    let index = buffer.push_back_instance_with(data.clone()).unwrap();

    assert_eq!(index, 1);
    assert!(data.values().all(|d| lock_data(d).unwrap().is_dirty()));
    buffer.free_and_reset().unwrap();
}

// ============================================================================
// DEVICE SYNC
// ============================================================================

#[test]
fn test_update_writes_each_dirty_window() {
    let (mut buffer, device) = create(3, GrowthPolicy::Exponential);
    buffer.instance_data_interfaces(2);
    buffer.update_device().unwrap();
    let before = writes(&device).len();

    mark_dirty(&mut buffer, 2, 1);
    mark_dirty(&mut buffer, 2, 0);
    buffer.update_device().unwrap();

    let handle = buffer.device_buffer().unwrap();
    let new_writes = writes(&device)[before..].to_vec();
    assert_eq!(new_writes, vec![(handle, 320, 8), (handle, 336, 136)]);
    assert_eq!(buffer.device_sync_state(), SyncState::InSync);
    assert!(!buffer.is_bound_data_dirty());
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_update_uploads_bytes_at_instance_offset() {
    let (mut buffer, device) = create(2, GrowthPolicy::Exponential);
    let typed = Arc::new(Mutex::new(RawUniformData::new(8)));
    let mut data = buffer.layouts().create_default_set();
    data.insert(0, typed.clone());
    buffer.set_instance_data_interfaces(1, data).unwrap();
    typed.lock().unwrap().write(0, &[7.0f32, 9.0f32]);

    buffer.update_device().unwrap();

    let memory = device.memory.lock().unwrap();
    let bytes = memory.bytes(buffer.device_buffer().unwrap()).unwrap();
    assert_eq!(&bytes[160..168], bytemuck::bytes_of(&[7.0f32, 9.0f32]));
    assert!(bytes[0..8].iter().all(|b| *b == 0));
    drop(memory);
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_clean_data_is_not_rewritten() {
    let (mut buffer, device) = create(2, GrowthPolicy::Exponential);
    buffer.instance_data_interfaces(0);
    buffer.instance_data_interfaces(1);
    buffer.update_device().unwrap();
    let before = writes(&device).len();

    buffer.update_device().unwrap();

    assert_eq!(writes(&device).len(), before);
    assert!(!buffer.needs_device_sync());
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_failed_write_keeps_every_flag() {
    let (mut buffer, device) = create(2, GrowthPolicy::Exponential);
    buffer.instance_data_interfaces(0);
    buffer.instance_data_interfaces(1);
    device.memory.lock().unwrap().fail_writes = 1;

    assert!(buffer.update_device().is_err());

    let all_dirty = (0..2).all(|i| {
        buffer
            .instance_data_interfaces(i)
            .values()
            .all(|d| lock_data(d).unwrap().is_dirty())
    });
    assert!(all_dirty);
    buffer.update_device().unwrap();
    assert!(!buffer.is_bound_data_dirty());
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_growth_reuploads_every_materialized_instance() {
    let (mut buffer, device) = create(2, GrowthPolicy::Exponential);
    buffer.instance_data_interfaces(0);
    buffer.instance_data_interfaces(1);
    buffer.update_device().unwrap();
    assert_eq!(buffer.poll_bound_data(), SyncState::InSync);

    buffer.push_back_instance().unwrap();
    assert_eq!(buffer.device_sync_state(), SyncState::OutOfSync);
    let before = writes(&device).len();
    buffer.update_device().unwrap();

    let handle = buffer.device_buffer().unwrap();
    let new_writes = writes(&device)[before..].to_vec();
    assert_eq!(new_writes.len(), 4);
    assert!(new_writes.iter().all(|(h, _, _)| *h == handle));
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_external_mutation_is_seen_by_poll() {
    let (mut buffer, _device) = create(1, GrowthPolicy::Exponential);
    let handle = buffer.instance_data_interfaces(0)[&1].clone();
    buffer.update_device().unwrap();
    assert_eq!(buffer.device_sync_state(), SyncState::InSync);

    lock_data(&handle).unwrap().set_dirty(true);

    // Cached state only changes on the next scan
    assert_eq!(buffer.device_sync_state(), SyncState::InSync);
    assert_eq!(buffer.poll_bound_data(), SyncState::OutOfSync);
    assert_eq!(buffer.device_sync_state(), SyncState::OutOfSync);
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_shared_handle_across_instances_is_written_twice() {
    let (mut buffer, device) = create(2, GrowthPolicy::Exponential);
    let data = buffer.layouts().create_default_set();
    buffer.set_instance_data_interfaces(0, data.clone()).unwrap();
    buffer.set_instance_data_interfaces(1, data).unwrap();
    let before = writes(&device).len();

    buffer.update_device().unwrap();

    assert_eq!(writes(&device).len() - before, 4);
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_freed_instance_is_skipped() {
    let (mut buffer, device) = create(2, GrowthPolicy::Exponential);
    buffer.instance_data_interfaces(0);
    buffer.instance_data_interfaces(1);
    buffer.free_instance_data_interfaces(0);
    let before = writes(&device).len();

    buffer.update_device().unwrap();

    let offsets: Vec<u64> = writes(&device)[before..].iter().map(|w| w.1).collect();
    assert_eq!(offsets, vec![160, 176]);
    buffer.free_and_reset().unwrap();
}

#[test]
fn test_frame_sync_writes_directly() {
    let (mut buffer, _device) = create(1, GrowthPolicy::Exponential);
    let mut cmd = MockCommandRecorder::new();
    buffer.instance_data_interfaces(0);

    assert!(buffer.needs_device_sync());
    buffer.sync_for_frame(&mut cmd).unwrap();

    assert!(cmd.commands.is_empty());
    assert!(!buffer.needs_device_sync());
    buffer.free_and_reset().unwrap();
}

// ============================================================================
// TEARDOWN
// ============================================================================

#[test]
fn test_free_and_reset_orphans_external_handles() {
    let (mut buffer, device) = create(2, GrowthPolicy::Exponential);
    let handle = buffer.instance_data_interfaces(0)[&0].clone();
    buffer.set_instance_count(5).unwrap();

    buffer.free_and_reset().unwrap();

    assert_eq!(buffer.device_sync_state(), SyncState::Empty);
    assert_eq!(buffer.instance_count(), 0);
    assert_eq!(buffer.capacity(), 0);
    assert_eq!(device.memory.lock().unwrap().buffers.len(), 0);
    assert_eq!(device.live_layout_count(), 0);

    // Still usable, no longer feeding any buffer
    lock_data(&handle).unwrap().set_dirty(true);
    assert_eq!(lock_data(&handle).unwrap().size(), 8);
    assert!(!buffer.is_bound_data_dirty());
}

#[test]
fn test_reuse_after_free_and_reset_restores_layout() {
    let (mut buffer, device) = create(1, GrowthPolicy::Exponential);
    buffer.free_and_reset().unwrap();
    assert!(buffer.uniform_descriptor().is_none());

    buffer.push_back_instance().unwrap();
    buffer.update_device().unwrap();

    let descriptor = buffer.uniform_descriptor().unwrap();
    assert_eq!(descriptor.buffer, buffer.device_buffer().unwrap());
    assert_eq!(descriptor.dynamic_offset_count(), 2);
    assert_eq!(device.live_layout_count(), 1);
    assert_eq!(
        device.layout_bindings(descriptor.layout).unwrap().len(),
        2
    );

    buffer.free_and_reset().unwrap();
    assert_eq!(device.live_layout_count(), 0);
}

#[test]
fn test_retarget_rebuilds_layout_for_new_device() {
    let (mut buffer, device_a) = create(2, GrowthPolicy::Exponential);
    let (context_b, device_b) = mock_context_with_alignment(256);

    buffer.retarget(context_b).unwrap();

    assert_eq!(device_a.memory.lock().unwrap().buffers.len(), 0);
    assert_eq!(device_a.live_layout_count(), 0);
    assert_eq!(device_b.live_layout_count(), 1);
    assert_eq!(buffer.instance_data_size(), 512);
    assert_eq!(buffer.device_pair(), Some(device_b.pair));

    buffer.push_back_instance().unwrap();
    assert_eq!(device_b.memory.lock().unwrap().buffers.len(), 1);
    buffer.free_and_reset().unwrap();
}

#[test]
#[serial]
fn test_drop_with_live_objects_warns_and_frees() {
    Engine::reset_logger();
    let logger = CaptureLogger::install();
    let (buffer, device) = create(2, GrowthPolicy::Exponential);

    drop(buffer);

    assert!(logger.contains(LogSeverity::Warn, "'instances' dropped with live device objects"));
    assert_eq!(device.memory.lock().unwrap().buffers.len(), 0);
    assert_eq!(device.live_layout_count(), 0);
    Engine::reset_logger();
}
