/// Device module - the narrow boundary between the core and a graphics backend

pub mod handles;
pub mod buffer;
pub mod descriptor;
pub mod memory_allocator;
pub mod graphics_device;
pub mod command_recorder;

pub use handles::*;
pub use buffer::*;
pub use descriptor::*;
pub use memory_allocator::*;
pub use graphics_device::*;
pub use command_recorder::*;

// Mock device for tests (no GPU required)
#[cfg(test)]
pub mod mock_device;
