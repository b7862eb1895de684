use std::ffi::c_void;

use ash::vk;

use super::RenderDevice;
use crate::vulkan_api::{ResourceDevice, VulkanError};

impl ResourceDevice for RenderDevice {
    fn find_memory_type_index(
        &self,
        memory_type_bits: u32,
        property_flags: vk::MemoryPropertyFlags,
    ) -> Result<u32, VulkanError> {
        self.memory_properties.memory_types
            [..self.memory_properties.memory_type_count as usize]
            .iter()
            .enumerate()
            .find(|(i, memory_type)| {
                let type_supported = memory_type_bits & (1 << i) != 0;
                let properties_supported =
                    memory_type.property_flags.contains(property_flags);
                type_supported & properties_supported
            })
            .map(|(i, _memory_type)| i as u32)
            .ok_or(VulkanError::MemoryTypeNotFound(
                property_flags,
                memory_type_bits,
            ))
    }

    fn non_coherent_atom_size(&self) -> vk::DeviceSize {
        self.non_coherent_atom_size
    }

    unsafe fn allocate_memory(
        &self,
        allocate_info: &vk::MemoryAllocateInfo,
    ) -> Result<vk::DeviceMemory, VulkanError> {
        self.logical_device
            .allocate_memory(allocate_info, None)
            .map_err(|err| {
                VulkanError::UnableToAllocateDeviceMemory(
                    allocate_info.allocation_size,
                    err,
                )
            })
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        self.logical_device.free_memory(memory, None)
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> Result<*mut c_void, VulkanError> {
        self.logical_device
            .map_memory(memory, offset, size, vk::MemoryMapFlags::empty())
            .map_err(VulkanError::UnableToMapDeviceMemory)
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        self.logical_device.unmap_memory(memory)
    }

    unsafe fn flush_mapped_memory_ranges(
        &self,
        ranges: &[vk::MappedMemoryRange],
    ) -> Result<(), VulkanError> {
        self.logical_device
            .flush_mapped_memory_ranges(ranges)
            .map_err(VulkanError::UnableToFlushMappedMemoryRanges)
    }

    unsafe fn create_buffer(
        &self,
        create_info: &vk::BufferCreateInfo,
    ) -> Result<vk::Buffer, VulkanError> {
        self.logical_device
            .create_buffer(create_info, None)
            .map_err(|err| {
                VulkanError::UnableToCreateBuffer(
                    create_info.size,
                    create_info.usage,
                    err,
                )
            })
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.logical_device.destroy_buffer(buffer, None)
    }

    unsafe fn get_buffer_memory_requirements(
        &self,
        buffer: vk::Buffer,
    ) -> vk::MemoryRequirements {
        self.logical_device.get_buffer_memory_requirements(buffer)
    }

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<(), VulkanError> {
        self.logical_device
            .bind_buffer_memory(buffer, memory, offset)
            .map_err(VulkanError::UnableToBindBufferMemory)
    }

    unsafe fn create_image(
        &self,
        create_info: &vk::ImageCreateInfo,
    ) -> Result<vk::Image, VulkanError> {
        self.logical_device
            .create_image(create_info, None)
            .map_err(|err| {
                VulkanError::UnableToCreateImage(
                    create_info.format,
                    create_info.extent,
                    create_info.usage,
                    err,
                )
            })
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        self.logical_device.destroy_image(image, None)
    }

    unsafe fn get_image_memory_requirements(
        &self,
        image: vk::Image,
    ) -> vk::MemoryRequirements {
        self.logical_device.get_image_memory_requirements(image)
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<(), VulkanError> {
        self.logical_device
            .bind_image_memory(image, memory, offset)
            .map_err(VulkanError::UnableToBindImageMemory)
    }

    unsafe fn cmd_copy_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        src_buffer: vk::Buffer,
        dst_buffer: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        self.logical_device.cmd_copy_buffer(
            command_buffer,
            src_buffer,
            dst_buffer,
            regions,
        )
    }

    unsafe fn cmd_copy_buffer_to_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src_buffer: vk::Buffer,
        dst_image: vk::Image,
        dst_image_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.logical_device.cmd_copy_buffer_to_image(
            command_buffer,
            src_buffer,
            dst_image,
            dst_image_layout,
            regions,
        )
    }

    unsafe fn cmd_pipeline_barrier(
        &self,
        command_buffer: vk::CommandBuffer,
        src_stage_mask: vk::PipelineStageFlags,
        dst_stage_mask: vk::PipelineStageFlags,
        buffer_memory_barriers: &[vk::BufferMemoryBarrier],
        image_memory_barriers: &[vk::ImageMemoryBarrier],
    ) {
        self.logical_device.cmd_pipeline_barrier(
            command_buffer,
            src_stage_mask,
            dst_stage_mask,
            vk::DependencyFlags::empty(),
            &[],
            buffer_memory_barriers,
            image_memory_barriers,
        )
    }
}
