//! Sub-allocated buffer and image pools for Vulkan.
//!
//! A [resources::ResourceManager] owns named pools. Each pool carves one
//! block of device memory into resources with a
//! [allocator::SubAllocator], and device-local resources are filled through
//! buffers from the staging pool.

pub mod allocator;
pub mod logging;
pub mod resources;
pub mod vulkan_api;

#[cfg(test)]
mod test_device;
