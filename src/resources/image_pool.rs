use ash::vk;

use super::{
    resource_pool::{Resource, ResourceKind, ResourcePool},
    ImageHandle, PoolId, ResourceError,
};
use crate::{
    allocator::{Allocation, ResourceId},
    vulkan_api::{ResourceDevice, VulkanError},
};

/// Marks pools and resources which hold 2D images.
#[derive(Debug)]
pub enum ImageKind {}

/// A fixed block of device memory which images are sub-allocated from.
pub type ImagePool = ResourcePool<ImageKind>;

/// A 2D image bound to a range of its pool's memory.
pub type ImageResource = Resource<ImageKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
}

impl ResourceKind for ImageKind {
    type Handle = ImageHandle;
    type Raw = vk::Image;
    type Usage = vk::ImageUsageFlags;
    type Desc = ImageDesc;

    const LABEL: &'static str = "image";

    fn handle(pool: PoolId, resource: ResourceId) -> ImageHandle {
        ImageHandle { pool, resource }
    }

    fn locate(handle: ImageHandle) -> (PoolId, ResourceId) {
        (handle.pool, handle.resource)
    }

    fn with_transfer_dst(usage: vk::ImageUsageFlags) -> vk::ImageUsageFlags {
        usage | vk::ImageUsageFlags::TRANSFER_DST
    }

    /// A 1x1 RGBA image.
    fn probe_desc(
        _pool_size_in_bytes: vk::DeviceSize,
        usage: vk::ImageUsageFlags,
    ) -> ImageDesc {
        ImageDesc {
            extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            format: vk::Format::R8G8B8A8_UNORM,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
        }
    }

    /// Images are as large as the driver's memory requirements say.
    fn byte_len(_desc: &ImageDesc, allocation: &Allocation) -> vk::DeviceSize {
        allocation.size_in_bytes()
    }

    /// Single-mip, single-layer 2D images start in the UNDEFINED layout.
    unsafe fn create(
        device: &dyn ResourceDevice,
        desc: &ImageDesc,
        sharing_mode: vk::SharingMode,
    ) -> Result<vk::Image, VulkanError> {
        let create_info = vk::ImageCreateInfo {
            image_type: vk::ImageType::TYPE_2D,
            format: desc.format,
            extent: vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: desc.tiling,
            usage: desc.usage,
            sharing_mode,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        device.create_image(&create_info)
    }

    unsafe fn memory_requirements(
        device: &dyn ResourceDevice,
        raw: vk::Image,
    ) -> vk::MemoryRequirements {
        device.get_image_memory_requirements(raw)
    }

    unsafe fn bind(
        device: &dyn ResourceDevice,
        raw: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<(), VulkanError> {
        device.bind_image_memory(raw, memory, offset)
    }

    unsafe fn destroy(device: &dyn ResourceDevice, raw: vk::Image) {
        device.destroy_image(raw)
    }
}

impl Resource<ImageKind> {
    pub fn extent(&self) -> vk::Extent2D {
        self.desc().extent
    }

    pub fn format(&self) -> vk::Format {
        self.desc().format
    }

    pub fn tiling(&self) -> vk::ImageTiling {
        self.desc().tiling
    }

    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.desc().usage
    }
}

impl ResourcePool<ImageKind> {
    pub fn image(
        &self,
        handle: ImageHandle,
    ) -> Result<&ImageResource, ResourceError> {
        self.resource(handle)
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageResource> {
        self.resources()
    }

    /// Create a 2D image and bind it to the first range of pool memory
    /// which fits. Linear images can be read through
    /// [ResourcePool::bytes] when the pool is host visible.
    pub fn allocate_image(
        &mut self,
        extent: vk::Extent2D,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
    ) -> Result<ImageHandle, ResourceError> {
        let usage = self.resource_usage(usage);
        self.allocate(ImageDesc {
            extent,
            format,
            tiling,
            usage,
        })
    }
}
