/// Upload-transfer buffer with a read-back path.
///
/// The download side mirrors the upload: a recorded resident → staging copy,
/// followed by a host read of the staging buffer. No synchronization happens
/// here; the caller submits the copy and waits on its fence before reading.

use crate::buffer::synced_buffer::{
    DownloadTransferBacked, FrameSynced, SyncState, SyncedBuffer, UploadTransferBacked,
};
use crate::buffer::upload_transfer_buffer::UploadTransferBuffer;
use crate::device::{
    BufferCopyRegion, BufferHandle, BufferUsageFlags, CommandRecorder, DeviceContext, DeviceHandlePair,
};
use crate::error::Result;

pub struct DualTransferBuffer {
    upload: UploadTransferBuffer,
}

impl DualTransferBuffer {
    pub fn new(context: DeviceContext, name: &str, usage: BufferUsageFlags) -> Self {
        Self {
            upload: UploadTransferBuffer::new(context, name, usage),
        }
    }

    pub fn size(&self) -> u64 {
        self.upload.size()
    }

    pub fn staging_buffer(&self) -> Option<BufferHandle> {
        self.upload.staging_buffer()
    }

    pub fn retarget(&mut self, context: DeviceContext) -> Result<()> {
        self.upload.retarget(context)
    }

    pub fn release_device(&mut self) -> Result<()> {
        self.upload.release_device()
    }
}

impl SyncedBuffer for DualTransferBuffer {
    fn device_sync_state(&self) -> SyncState {
        self.upload.device_sync_state()
    }

    fn device_pair(&self) -> Option<DeviceHandlePair> {
        self.upload.device_pair()
    }

    fn device_buffer(&self) -> Option<BufferHandle> {
        self.upload.device_buffer()
    }

    fn free_and_reset(&mut self) -> Result<()> {
        self.upload.free_and_reset()
    }
}

impl UploadTransferBacked for DualTransferBuffer {
    fn stage_data_for_upload(&mut self, data: &[u8]) -> Result<()> {
        self.upload.stage_data_for_upload(data)
    }

    fn record_upload_transfer_command(&mut self, cmd: &mut dyn CommandRecorder) -> Result<()> {
        self.upload.record_upload_transfer_command(cmd)
    }

    fn free_staging_buffer(&mut self) -> Result<()> {
        self.upload.free_staging_buffer()
    }
}

impl DownloadTransferBacked for DualTransferBuffer {
    /// Recreates the staging buffer first if it was freed.
    ///
    /// # Panics
    ///
    /// Panics if no resident buffer exists or the affinity was released.
    fn record_download_transfer_command(&mut self, cmd: &mut dyn CommandRecorder) -> Result<()> {
        self.upload.context_or_panic("record_download_transfer_command");
        let Some(resident) = self.upload.resident_buffer() else {
            panic!(
                "record_download_transfer_command: '{}' has no device buffer",
                self.upload.name()
            );
        };
        let staging = self.upload.ensure_staging()?;
        cmd.copy_buffer(resident, staging, BufferCopyRegion::whole(self.upload.size()))
    }

    /// # Panics
    ///
    /// Panics if no staging buffer exists or the affinity was released.
    fn copy_data_from_stage(&mut self, dst: &mut [u8]) -> Result<usize> {
        let context = self.upload.context_or_panic("copy_data_from_stage");
        let Some(staging) = self.upload.staging_buffer() else {
            panic!("copy_data_from_stage: '{}' has no staging buffer", self.upload.name());
        };
        let count = dst.len().min(self.upload.size() as usize);
        context.lock_allocator()?.read_buffer(staging, 0, &mut dst[..count])?;
        Ok(count)
    }
}

impl FrameSynced for DualTransferBuffer {
    fn needs_device_sync(&mut self) -> bool {
        self.upload.needs_device_sync()
    }

    fn sync_for_frame(&mut self, transfer: &mut dyn CommandRecorder) -> Result<()> {
        self.upload.sync_for_frame(transfer)
    }
}

#[cfg(test)]
#[path = "dual_transfer_buffer_tests.rs"]
mod tests;
