/// Device-local buffer filled through a host-visible staging buffer.
///
/// `stage_data_for_upload` writes the bytes into the staging buffer and
/// `record_upload_transfer_command` appends the staging → resident copy to a
/// caller-owned command recorder. The resident buffer only holds the data
/// once that recorder has been submitted and has completed.
///
/// A size change always frees and recreates both buffers, right away; the
/// caller owns the timing of that against frames in flight.

use crate::buffer::synced_buffer::{FrameSynced, SyncState, SyncedBuffer, UploadTransferBacked};
use crate::device::{
    BufferCopyRegion, BufferDesc, BufferHandle, BufferUsageFlags, CommandRecorder, DeviceContext,
    DeviceHandlePair, MemoryProperties,
};
use crate::error::Result;
use crate::{engine_debug, engine_warn};

pub struct UploadTransferBuffer {
    context: Option<DeviceContext>,
    name: String,
    usage: BufferUsageFlags,
    resident: Option<BufferHandle>,
    staging: Option<BufferHandle>,
    size: u64,
    awaiting_upload: bool,
}

impl UploadTransferBuffer {
    /// Create an empty buffer bound to `context`
    ///
    /// `usage` describes how the resident buffer is read (e.g. `VERTEX`);
    /// transfer usage bits are added automatically.
    pub fn new(context: DeviceContext, name: &str, usage: BufferUsageFlags) -> Self {
        Self {
            context: Some(context),
            name: name.to_string(),
            usage,
            resident: None,
            staging: None,
            size: 0,
            awaiting_upload: false,
        }
    }

    /// Size of the current allocation in bytes (0 when nothing is allocated)
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_awaiting_upload(&self) -> bool {
        self.awaiting_upload
    }

    pub fn staging_buffer(&self) -> Option<BufferHandle> {
        self.staging
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free everything, then bind the buffer to another device
    pub fn retarget(&mut self, context: DeviceContext) -> Result<()> {
        self.free_and_reset()?;
        self.context = Some(context);
        Ok(())
    }

    /// Free everything and drop the device affinity
    pub fn release_device(&mut self) -> Result<()> {
        self.free_and_reset()?;
        self.context = None;
        Ok(())
    }

    pub(crate) fn context_or_panic(&self, operation: &str) -> &DeviceContext {
        match self.context.as_ref() {
            Some(context) => context,
            None => panic!("{}: buffer '{}' has no device affinity", operation, self.name),
        }
    }

    pub(crate) fn resident_buffer(&self) -> Option<BufferHandle> {
        self.resident
    }

    /// Allocate a staging buffer matching the current size if it was freed
    pub(crate) fn ensure_staging(&mut self) -> Result<BufferHandle> {
        if let Some(staging) = self.staging {
            return Ok(staging);
        }
        let desc = self.staging_desc(self.size);
        let staging = self.context_or_panic("ensure_staging").lock_allocator()?.create_buffer(&desc)?;
        self.staging = Some(staging);
        Ok(staging)
    }

    fn staging_desc(&self, size: u64) -> BufferDesc {
        BufferDesc {
            size,
            usage: BufferUsageFlags::TRANSFER_SRC | BufferUsageFlags::TRANSFER_DST,
            memory: MemoryProperties::host_mapped() | MemoryProperties::HOST_CACHED,
            name: format!("{} (staging)", self.name),
        }
    }

    fn resident_desc(&self, size: u64) -> BufferDesc {
        BufferDesc {
            size,
            usage: self.usage | BufferUsageFlags::TRANSFER_SRC | BufferUsageFlags::TRANSFER_DST,
            memory: MemoryProperties::DEVICE_LOCAL,
            name: self.name.clone(),
        }
    }

    fn destroy_buffers(&mut self) -> Result<()> {
        if self.resident.is_none() && self.staging.is_none() {
            return Ok(());
        }
        let context = self.context_or_panic("free_and_reset").clone();
        let mut allocator = context.lock_allocator()?;
        if let Some(staging) = self.staging.take() {
            allocator.destroy_buffer(staging)?;
        }
        if let Some(resident) = self.resident.take() {
            allocator.destroy_buffer(resident)?;
        }
        Ok(())
    }

    fn reallocate(&mut self, size: u64) -> Result<()> {
        self.destroy_buffers()?;
        self.size = 0;

        let staging_desc = self.staging_desc(size);
        let resident_desc = self.resident_desc(size);
        let context = self.context_or_panic("stage_data_for_upload").clone();
        let mut allocator = context.lock_allocator()?;

        let staging = allocator.create_buffer(&staging_desc)?;
        let resident = match allocator.create_buffer(&resident_desc) {
            Ok(resident) => resident,
            Err(e) => {
                allocator.destroy_buffer(staging)?;
                return Err(e);
            }
        };

        self.staging = Some(staging);
        self.resident = Some(resident);
        self.size = size;
        engine_debug!("orbit::buffer", "'{}' allocated {} bytes (resident + staging)", self.name, size);
        Ok(())
    }
}

impl SyncedBuffer for UploadTransferBuffer {
    fn device_sync_state(&self) -> SyncState {
        match (self.resident, self.awaiting_upload) {
            (None, _) => SyncState::Empty,
            (Some(_), true) => SyncState::OutOfSync,
            (Some(_), false) => SyncState::InSync,
        }
    }

    fn device_pair(&self) -> Option<DeviceHandlePair> {
        self.context.as_ref().map(|c| c.handle_pair())
    }

    fn device_buffer(&self) -> Option<BufferHandle> {
        self.resident
    }

    fn free_and_reset(&mut self) -> Result<()> {
        self.destroy_buffers()?;
        self.size = 0;
        self.awaiting_upload = false;
        Ok(())
    }
}

impl UploadTransferBacked for UploadTransferBuffer {
    /// A size change destroys both buffers immediately. The caller must
    /// make sure no submitted work still reads them, for example by waiting
    /// for the device to go idle first.
    ///
    /// # Panics
    ///
    /// Panics if `data` is empty or the buffer has no device affinity.
    fn stage_data_for_upload(&mut self, data: &[u8]) -> Result<()> {
        assert!(!data.is_empty(), "stage_data_for_upload: '{}' cannot stage zero bytes", self.name);
        let size = data.len() as u64;

        if size != self.size || self.resident.is_none() || self.staging.is_none() {
            self.reallocate(size)?;
        }

        let staging = self.ensure_staging()?;
        self.context_or_panic("stage_data_for_upload")
            .lock_allocator()?
            .write_buffer(staging, 0, data)?;
        self.awaiting_upload = true;
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if nothing was staged yet or the staging buffer was freed.
    fn record_upload_transfer_command(&mut self, cmd: &mut dyn CommandRecorder) -> Result<()> {
        let (Some(staging), Some(resident)) = (self.staging, self.resident) else {
            panic!("record_upload_transfer_command: '{}' has no staged data", self.name);
        };
        cmd.copy_buffer(staging, resident, BufferCopyRegion::whole(self.size))?;
        self.awaiting_upload = false;
        Ok(())
    }

    fn free_staging_buffer(&mut self) -> Result<()> {
        if let Some(staging) = self.staging.take() {
            self.context_or_panic("free_staging_buffer")
                .lock_allocator()?
                .destroy_buffer(staging)?;
        }
        Ok(())
    }
}

impl FrameSynced for UploadTransferBuffer {
    fn needs_device_sync(&mut self) -> bool {
        self.awaiting_upload
    }

    fn sync_for_frame(&mut self, transfer: &mut dyn CommandRecorder) -> Result<()> {
        if self.awaiting_upload {
            self.record_upload_transfer_command(transfer)?;
        }
        Ok(())
    }
}

impl Drop for UploadTransferBuffer {
    fn drop(&mut self) {
        if self.resident.is_none() && self.staging.is_none() {
            return;
        }
        engine_warn!(
            "orbit::buffer",
            "'{}' dropped with live device buffers, freeing them now",
            self.name
        );
        if let Err(e) = self.destroy_buffers() {
            engine_warn!("orbit::buffer", "'{}' failed to free device buffers: {}", self.name, e);
        }
    }
}

#[cfg(test)]
#[path = "upload_transfer_buffer_tests.rs"]
mod tests;
