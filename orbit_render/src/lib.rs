/*!
# Orbit Render

Core of the Orbit renderer: device-resident buffers kept in sync with their
CPU-side data, and the frame-in-flight loop that drives them.

This crate is backend-agnostic. A graphics backend (see `orbit_render_vulkan`)
implements the device traits and the frame backend; everything here is
tested against in-crate mocks and needs no GPU.

## Architecture

- **AllocatorHost**: registry of one memory allocator per device pair
- **SyncedBuffer / FrameSynced**: capability traits shared by every buffer kind
- **UploadTransferBuffer / DualTransferBuffer**: staged device-local buffers
- **HostVisibleVertexBuffer**: vertex data written straight into mapped memory
- **UniformBuffer**: one POD struct behind one binding
- **MultiInstanceUniformBuffer**: growable instance blocks addressed by dynamic offsets
- **FrameLoop**: fence/acquire/sync/submit/present ring with the swapchain rebuild cascade
*/

// Internal modules
mod error;
mod engine;
mod allocator_host;
pub mod log;
pub mod utils;
pub mod device;
pub mod buffer;
pub mod frame;

#[cfg(test)]
mod test_utils;

// Main orbit namespace module
pub mod orbit {
    // Error types
    pub use crate::error::{Error, LayoutMismatch, Result};

    // Logging façade
    pub use crate::engine::Engine;

    // Allocator registry
    pub use crate::allocator_host::AllocatorHost;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
        // Note: engine_* macros are exported at the crate root
    }

    // Device abstraction implemented by backends
    pub mod device {
        pub use crate::device::*;
    }

    // Synchronized buffers and uniform data
    pub mod buffer {
        pub use crate::buffer::*;
    }

    // Frame loop
    pub mod frame {
        pub use crate::frame::*;
    }

    // Alignment and growth helpers
    pub mod utils {
        pub use crate::utils::*;
    }
}
