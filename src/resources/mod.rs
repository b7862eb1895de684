//! Buffer and image pools carved out of large device memory blocks.
//!
//! Vulkan limits how many raw memory allocations an application may make,
//! so resources are sub-allocated from a few fixed-size pools. Every pool
//! owns exactly one block of device memory and one
//! [crate::allocator::SubAllocator] which decides where each resource lives
//! inside that block.
//!
//! Pools whose memory is device-local and not host-visible cannot be written
//! by the CPU. Resources drawn from them are filled through a staging buffer
//! allocated from the pool named [STAGING_POOL_NAME]:
//!
//! 1. allocate the staging resource
//! 2. write bytes into it
//! 3. record the copy and barrier commands
//! 4. submit and wait for the commands to finish
//! 5. free the staging resource

mod buffer_pool;
mod device_memory;
mod image_pool;
mod pool_core;
mod resource_manager;
mod resource_pool;
mod upload;

use std::fmt;

use ash::vk;
use thiserror::Error;

use crate::{
    allocator::{AllocatorError, ResourceId},
    vulkan_api::VulkanError,
};

pub use self::{
    buffer_pool::{BufferDesc, BufferKind, BufferPool, BufferResource},
    device_memory::DeviceMemory,
    image_pool::{ImageDesc, ImageKind, ImagePool, ImageResource},
    resource_manager::ResourceManager,
    resource_pool::{Resource, ResourceKind, ResourcePool},
};

/// The pool which staging resources are allocated from.
pub const STAGING_POOL_NAME: &str = "staging";

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error(
        "Pool '{}' cannot fit {} bytes aligned to {} ({} of {} bytes in use)",
        .pool,
        .size,
        .alignment,
        .in_use,
        .capacity
    )]
    InsufficientSpace {
        pool: String,
        size: u64,
        alignment: u64,
        in_use: u64,
        capacity: u64,
    },

    #[error(
        "No pool named '{}' exists, create it before allocating staging resources",
        STAGING_POOL_NAME
    )]
    StagingPoolMissing,

    #[error("{:?} belongs to pool '{}' which does not need staging", .0, .1)]
    ResourceNotStageable(ResourceHandle, String),

    #[error(
        "{:?} lives in memory the host cannot write, use its staging resource",
        .0
    )]
    RequiresStaging(ResourceHandle),

    #[error("The memory for pool '{}' must be mapped first", .0)]
    MemoryNotMapped(String),

    #[error("The memory for pool '{}' is already mapped", .0)]
    MemoryAlreadyMapped(String),

    #[error(
        "The memory for pool '{}' is not host visible, its properties are {:?}",
        .0,
        .1
    )]
    MemoryNotHostVisible(String, vk::MemoryPropertyFlags),

    #[error("A pool named '{}' already exists", .0)]
    PoolAlreadyExists(String),

    #[error("No pool {} exists", .0)]
    PoolNotFound(String),

    #[error("{:?} does not refer to a live resource", .0)]
    ResourceNotFound(ResourceHandle),

    #[error("{:?} has no staging resource, allocate one first", .0)]
    NoStagingResource(ResourceHandle),

    #[error(
        "Pool '{}' uses memory type {} which is not allowed by the resource's memory type bits {:#b}",
        .pool,
        .memory_type_index,
        .memory_type_bits
    )]
    IncompatibleMemoryType {
        pool: String,
        memory_type_index: u32,
        memory_type_bits: u32,
    },

    #[error("{} bytes do not fit in a resource of {} bytes", .len, .capacity)]
    DataTooLarge { len: usize, capacity: u64 },

    #[error("Unsupported image layout transition from {:?} to {:?}", .0, .1)]
    UnsupportedLayoutTransition(vk::ImageLayout, vk::ImageLayout),

    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    #[error(transparent)]
    Allocator(#[from] AllocatorError),
}

/// Identifies a pool for the lifetime of its resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(u32);

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A buffer allocated from a [BufferPool].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    pool: PoolId,
    resource: ResourceId,
}

impl BufferHandle {
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }
}

/// An image allocated from an [ImagePool].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle {
    pool: PoolId,
    resource: ResourceId,
}

impl ImageHandle {
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }
}

/// Either flavour of pooled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceHandle {
    Buffer(BufferHandle),
    Image(ImageHandle),
}

impl From<BufferHandle> for ResourceHandle {
    fn from(handle: BufferHandle) -> Self {
        ResourceHandle::Buffer(handle)
    }
}

impl From<ImageHandle> for ResourceHandle {
    fn from(handle: ImageHandle) -> Self {
        ResourceHandle::Image(handle)
    }
}

/// Resources must be staged when their memory lives on the device and the
/// host cannot see it.
pub fn requires_staging(memory_properties: vk::MemoryPropertyFlags) -> bool {
    memory_properties.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL)
        && !memory_properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
}

#[cfg(test)]
mod tests;
