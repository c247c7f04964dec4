/// Synchronized buffer family
///
/// Every buffer keeps a CPU-side authority and a device-side copy and
/// reports how the two relate through `SyncState`. The frame loop drives
/// synchronization through the `FrameSynced` capability.

pub mod synced_buffer;
pub mod upload_transfer_buffer;
pub mod dual_transfer_buffer;
pub mod vertex_buffer;
pub mod uniform_data;
pub mod uniform_buffer;
pub mod multi_instance_uniform_buffer;

pub use synced_buffer::*;
pub use upload_transfer_buffer::UploadTransferBuffer;
pub use dual_transfer_buffer::DualTransferBuffer;
pub use vertex_buffer::HostVisibleVertexBuffer;
pub use uniform_data::*;
pub use uniform_buffer::UniformBuffer;
pub use multi_instance_uniform_buffer::{MultiInstanceUniformBuffer, MultiInstanceUniformBufferDesc};
