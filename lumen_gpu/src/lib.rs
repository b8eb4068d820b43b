//! Vulkan host, swapchain-bound frame loop and typed GPU resource manager.
//! This is the only crate in the workspace that talks to the GPU directly.

pub mod canvas;
pub mod device;
pub mod resource;
pub mod texture;

pub use ash::{self, vk};
pub use gpu_allocator;

pub use canvas::{Canvas, RecordCommand};
pub use device::{DeviceShared, Host, Instance, Surface};
pub use resource::{BufferKind, BufferRegion, Context};
pub use texture::{Texture, TextureDescriptor};
