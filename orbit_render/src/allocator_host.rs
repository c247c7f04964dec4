/// Registry of memory allocators, one per (logical, physical) device pair.
///
/// The host is an explicit object owned by whoever owns the device context,
/// so independent device contexts (and tests) never share allocator state.
/// Allocators are created lazily on first request and destroyed on demand;
/// anything still registered when the host is dropped is swept with a warning.

use std::sync::{Arc, Mutex};
use rustc_hash::FxHashMap;
use crate::device::{DeviceContext, DeviceHandlePair, GraphicsDevice, SharedAllocator};
use crate::error::Result;
use crate::{engine_debug, engine_error, engine_warn};

pub struct AllocatorHost {
    allocators: FxHashMap<DeviceHandlePair, SharedAllocator>,
}

impl AllocatorHost {
    pub fn new() -> Self {
        Self {
            allocators: FxHashMap::default(),
        }
    }

    /// Allocator registered for `device`, created on first request
    ///
    /// # Errors
    ///
    /// Propagates the backend's allocator construction failure. Nothing is
    /// registered in that case.
    pub fn get_allocator(&mut self, device: &dyn GraphicsDevice) -> Result<SharedAllocator> {
        let pair = device.handle_pair();
        if let Some(allocator) = self.allocators.get(&pair) {
            return Ok(allocator.clone());
        }

        let allocator = device.create_allocator().map_err(|e| {
            engine_error!("orbit::AllocatorHost", "Failed to create allocator for {:?}: {}", pair, e);
            e
        })?;
        let shared: SharedAllocator = Arc::new(Mutex::new(allocator));
        self.allocators.insert(pair, shared.clone());
        engine_debug!("orbit::AllocatorHost", "Created allocator for {:?}", pair);
        Ok(shared)
    }

    /// Device context pairing `device` with its registered allocator
    pub fn device_context(&mut self, device: Arc<dyn GraphicsDevice>) -> Result<DeviceContext> {
        let allocator = self.get_allocator(device.as_ref())?;
        Ok(DeviceContext::new(device, allocator))
    }

    /// Remove and tear down the allocator for `pair`
    ///
    /// Returns false when no allocator was registered. Buffers still holding
    /// a clone of the allocator keep it alive until they are freed.
    pub fn destroy_allocator(&mut self, pair: DeviceHandlePair) -> bool {
        match self.allocators.remove(&pair) {
            Some(allocator) => {
                let holders = Arc::strong_count(&allocator) - 1;
                if holders > 0 {
                    engine_warn!(
                        "orbit::AllocatorHost",
                        "Allocator for {:?} destroyed while {} context(s) still reference it",
                        pair,
                        holders
                    );
                }
                engine_debug!("orbit::AllocatorHost", "Destroyed allocator for {:?}", pair);
                true
            }
            None => false,
        }
    }

    pub fn allocator_exists(&self, pair: DeviceHandlePair) -> bool {
        self.allocators.contains_key(&pair)
    }

    pub fn allocator_count(&self) -> usize {
        self.allocators.len()
    }
}

impl Default for AllocatorHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AllocatorHost {
    fn drop(&mut self) {
        if self.allocators.is_empty() {
            return;
        }
        engine_warn!(
            "orbit::AllocatorHost",
            "Sweeping {} allocator(s) that were never explicitly destroyed",
            self.allocators.len()
        );
        let pairs: Vec<DeviceHandlePair> = self.allocators.keys().copied().collect();
        for pair in pairs {
            self.destroy_allocator(pair);
        }
    }
}

#[cfg(test)]
#[path = "allocator_host_tests.rs"]
mod tests;
