use ash::vk;

use super::{
    resource_pool::{Resource, ResourceKind, ResourcePool},
    BufferHandle, PoolId, ResourceError,
};
use crate::{
    allocator::{Allocation, ResourceId},
    vulkan_api::{ResourceDevice, VulkanError},
};

/// Marks pools and resources which hold buffers.
#[derive(Debug)]
pub enum BufferKind {}

/// A fixed block of device memory which buffers are sub-allocated from.
pub type BufferPool = ResourcePool<BufferKind>;

/// A buffer bound to a range of its pool's memory.
pub type BufferResource = Resource<BufferKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub size_in_bytes: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

impl ResourceKind for BufferKind {
    type Handle = BufferHandle;
    type Raw = vk::Buffer;
    type Usage = vk::BufferUsageFlags;
    type Desc = BufferDesc;

    const LABEL: &'static str = "buffer";

    fn handle(pool: PoolId, resource: ResourceId) -> BufferHandle {
        BufferHandle { pool, resource }
    }

    fn locate(handle: BufferHandle) -> (PoolId, ResourceId) {
        (handle.pool, handle.resource)
    }

    fn with_transfer_dst(
        usage: vk::BufferUsageFlags,
    ) -> vk::BufferUsageFlags {
        usage | vk::BufferUsageFlags::TRANSFER_DST
    }

    /// A buffer as large as the whole pool.
    fn probe_desc(
        pool_size_in_bytes: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> BufferDesc {
        BufferDesc {
            size_in_bytes: pool_size_in_bytes,
            usage,
        }
    }

    /// Buffers expose the size they were created with, not the padded
    /// allocation.
    fn byte_len(desc: &BufferDesc, _allocation: &Allocation) -> vk::DeviceSize {
        desc.size_in_bytes
    }

    unsafe fn create(
        device: &dyn ResourceDevice,
        desc: &BufferDesc,
        sharing_mode: vk::SharingMode,
    ) -> Result<vk::Buffer, VulkanError> {
        let create_info = vk::BufferCreateInfo {
            size: desc.size_in_bytes,
            usage: desc.usage,
            sharing_mode,
            ..Default::default()
        };
        device.create_buffer(&create_info)
    }

    unsafe fn memory_requirements(
        device: &dyn ResourceDevice,
        raw: vk::Buffer,
    ) -> vk::MemoryRequirements {
        device.get_buffer_memory_requirements(raw)
    }

    unsafe fn bind(
        device: &dyn ResourceDevice,
        raw: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<(), VulkanError> {
        device.bind_buffer_memory(raw, memory, offset)
    }

    unsafe fn destroy(device: &dyn ResourceDevice, raw: vk::Buffer) {
        device.destroy_buffer(raw)
    }
}

impl Resource<BufferKind> {
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.desc().usage
    }
}

impl ResourcePool<BufferKind> {
    pub fn buffer(
        &self,
        handle: BufferHandle,
    ) -> Result<&BufferResource, ResourceError> {
        self.resource(handle)
    }

    pub fn buffers(&self) -> impl Iterator<Item = &BufferResource> {
        self.resources()
    }

    /// Create a buffer and bind it to the first range of pool memory which
    /// fits.
    pub fn allocate_buffer(
        &mut self,
        size_in_bytes: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<BufferHandle, ResourceError> {
        let usage = self.resource_usage(usage);
        self.allocate(BufferDesc {
            size_in_bytes,
            usage,
        })
    }
}
