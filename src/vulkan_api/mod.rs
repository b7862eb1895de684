//! The boundary between resource pools and the Vulkan device.

mod error;
mod render_device;

use {ash::vk, std::ffi::c_void};

pub use self::{error::VulkanError, render_device::RenderDevice};

/// The subset of Vulkan logical device functionality used by resource pools.
///
/// Every method mirrors a single Vulkan call. Implementations only translate
/// failures into [VulkanError]; they never retry.
pub trait ResourceDevice {
    /// Find the first memory type allowed by `memory_type_bits` whose flags
    /// contain every requested property.
    fn find_memory_type_index(
        &self,
        memory_type_bits: u32,
        property_flags: vk::MemoryPropertyFlags,
    ) -> Result<u32, VulkanError>;

    /// The granularity that flushed ranges of non-coherent memory must be
    /// aligned to.
    fn non_coherent_atom_size(&self) -> vk::DeviceSize;

    /// Allocate a raw block of device memory.
    ///
    /// # Safety
    ///
    /// Unsafe because the caller must free the memory before the device is
    /// destroyed.
    unsafe fn allocate_memory(
        &self,
        allocate_info: &vk::MemoryAllocateInfo,
    ) -> Result<vk::DeviceMemory, VulkanError>;

    /// # Safety
    ///
    /// Unsafe because no buffer or image bound to the memory may still be in
    /// use by the device.
    unsafe fn free_memory(&self, memory: vk::DeviceMemory);

    /// Map a range of device memory into host address space.
    ///
    /// # Safety
    ///
    /// Unsafe because:
    ///  - only memory with the HOST_VISIBLE property can be mapped
    ///  - a block of device memory can only be mapped once at a time
    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> Result<*mut c_void, VulkanError>;

    /// # Safety
    ///
    /// Unsafe because the mapped pointer must no longer be used.
    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory);

    /// Make host writes visible to the device for non-coherent memory.
    ///
    /// # Safety
    ///
    /// Unsafe because every range must refer to currently mapped memory.
    unsafe fn flush_mapped_memory_ranges(
        &self,
        ranges: &[vk::MappedMemoryRange],
    ) -> Result<(), VulkanError>;

    /// # Safety
    ///
    /// Unsafe because the caller must destroy the buffer before the device
    /// is destroyed.
    unsafe fn create_buffer(
        &self,
        create_info: &vk::BufferCreateInfo,
    ) -> Result<vk::Buffer, VulkanError>;

    /// # Safety
    ///
    /// Unsafe because the buffer must not be in use by the device.
    unsafe fn destroy_buffer(&self, buffer: vk::Buffer);

    /// # Safety
    ///
    /// Unsafe because the buffer must be a live handle from this device.
    unsafe fn get_buffer_memory_requirements(
        &self,
        buffer: vk::Buffer,
    ) -> vk::MemoryRequirements;

    /// # Safety
    ///
    /// Unsafe because the memory must outlive the buffer and the range
    /// starting at `offset` must not be bound to anything else.
    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<(), VulkanError>;

    /// # Safety
    ///
    /// Unsafe because the caller must destroy the image before the device is
    /// destroyed.
    unsafe fn create_image(
        &self,
        create_info: &vk::ImageCreateInfo,
    ) -> Result<vk::Image, VulkanError>;

    /// # Safety
    ///
    /// Unsafe because the image must not be in use by the device.
    unsafe fn destroy_image(&self, image: vk::Image);

    /// # Safety
    ///
    /// Unsafe because the image must be a live handle from this device.
    unsafe fn get_image_memory_requirements(
        &self,
        image: vk::Image,
    ) -> vk::MemoryRequirements;

    /// # Safety
    ///
    /// Unsafe because the memory must outlive the image and the range
    /// starting at `offset` must not be bound to anything else.
    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<(), VulkanError>;

    /// # Safety
    ///
    /// Unsafe because the command buffer must be recording and both buffers
    /// must live until the commands finish executing.
    unsafe fn cmd_copy_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        src_buffer: vk::Buffer,
        dst_buffer: vk::Buffer,
        regions: &[vk::BufferCopy],
    );

    /// # Safety
    ///
    /// Unsafe because the command buffer must be recording and the image
    /// must be in `dst_image_layout` when the copy executes.
    unsafe fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src_buffer: vk::Buffer,
        dst_image: vk::Image,
        dst_image_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    );

    /// # Safety
    ///
    /// Unsafe because the command buffer must be recording and every
    /// referenced resource must live until the commands finish executing.
    unsafe fn cmd_pipeline_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage_mask: vk::PipelineStageFlags,
        dst_stage_mask: vk::PipelineStageFlags,
        buffer_memory_barriers: &[vk::BufferMemoryBarrier],
        image_memory_barriers: &[vk::ImageMemoryBarrier],
    );
}
