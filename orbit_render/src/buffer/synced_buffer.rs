/// Capability traits shared by the synchronized buffers

use crate::device::{BufferHandle, CommandRecorder, DeviceHandlePair, UniformDescriptor};
use crate::error::Result;

/// Relationship between a buffer's CPU-side data and its device copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No device buffer allocated yet
    Empty,
    /// Device buffer exists but lags behind the CPU-side data
    OutOfSync,
    /// Device content matches the CPU-side data
    InSync,
    /// CPU shadow discarded after a confirmed upload; device content is authoritative
    CpuFlushed,
}

/// Contract shared by every buffer kind
pub trait SyncedBuffer {
    /// Current relationship between CPU data and device content
    fn device_sync_state(&self) -> SyncState;

    /// Device the buffer is bound to, None once the affinity was released
    fn device_pair(&self) -> Option<DeviceHandlePair>;

    /// Buffer read by GPU commands, None while nothing is allocated
    fn device_buffer(&self) -> Option<BufferHandle>;

    /// Release every device resource and return to `SyncState::Empty`
    fn free_and_reset(&mut self) -> Result<()>;
}

/// Buffers filled through a host-visible staging buffer and a recorded copy
pub trait UploadTransferBacked: SyncedBuffer {
    /// Copy `data` into the staging buffer, (re)allocating both buffers on a size change
    fn stage_data_for_upload(&mut self, data: &[u8]) -> Result<()>;

    /// Record the staging → resident copy; the caller submits it
    fn record_upload_transfer_command(&mut self, cmd: &mut dyn CommandRecorder) -> Result<()>;

    /// Release the staging buffer only
    fn free_staging_buffer(&mut self) -> Result<()>;
}

/// Buffers whose device content can be read back through the staging buffer
pub trait DownloadTransferBacked: UploadTransferBacked {
    /// Record the resident → staging copy; the caller submits and waits on it
    fn record_download_transfer_command(&mut self, cmd: &mut dyn CommandRecorder) -> Result<()>;

    /// Copy up to `dst.len()` staged bytes into `dst`, returning the count copied
    fn copy_data_from_stage(&mut self, dst: &mut [u8]) -> Result<usize>;
}

/// Buffers the frame loop re-synchronizes before each submission
pub trait FrameSynced: Send {
    /// True when the device copy must be refreshed this frame
    fn needs_device_sync(&mut self) -> bool;

    /// Bring the device copy up to date
    ///
    /// Small host-visible buffers are written directly; staged buffers
    /// record their copy into `transfer`, which is submitted with the frame.
    fn sync_for_frame(&mut self, transfer: &mut dyn CommandRecorder) -> Result<()>;

    /// Descriptor the frame loop builds a descriptor set from
    fn uniform_descriptor(&self) -> Option<UniformDescriptor> {
        None
    }

    /// True while replaced device buffers wait for `release_retired`
    fn has_retired(&self) -> bool {
        false
    }

    /// Destroy device buffers replaced by a reallocation
    ///
    /// Called by the frame loop once the device is idle.
    fn release_retired(&mut self) -> Result<()> {
        Ok(())
    }
}
