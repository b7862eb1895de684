use ash::vk;

use super::RenderDevice;
use crate::vulkan_api::VulkanError;

impl RenderDevice {
    /// Create a command pool for the device's queue family.
    ///
    /// # Safety
    ///
    /// The caller is responsible for destroying the command pool before the
    /// render device is dropped.
    pub unsafe fn create_command_pool(
        &self,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<vk::CommandPool, VulkanError> {
        let create_info = vk::CommandPoolCreateInfo {
            flags,
            queue_family_index: self.queue_family_index,
            ..Default::default()
        };
        self.logical_device
            .create_command_pool(&create_info, None)
            .map_err(VulkanError::UnableToCreateCommandPool)
    }

    /// # Safety
    ///
    /// The caller is responsible for ensuring the command pool is not in use
    /// by the GPU.
    pub unsafe fn destroy_command_pool(&self, command_pool: vk::CommandPool) {
        self.logical_device.destroy_command_pool(command_pool, None)
    }

    /// Allocate a single primary command buffer from the pool.
    ///
    /// # Safety
    ///
    /// The command buffer is freed when its pool is destroyed.
    pub unsafe fn allocate_command_buffer(
        &self,
        command_pool: vk::CommandPool,
    ) -> Result<vk::CommandBuffer, VulkanError> {
        let allocate_info = vk::CommandBufferAllocateInfo {
            command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let command_buffers = self
            .logical_device
            .allocate_command_buffers(&allocate_info)
            .map_err(VulkanError::UnableToAllocateCommandBuffers)?;
        Ok(command_buffers[0])
    }

    pub fn begin_one_time_submit(
        &self,
        command_buffer: vk::CommandBuffer,
    ) -> Result<(), VulkanError> {
        let begin_info = vk::CommandBufferBeginInfo {
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe {
            self.logical_device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::UnableToBeginCommandBuffer)
        }
    }

    pub fn end_command_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
    ) -> Result<(), VulkanError> {
        unsafe {
            self.logical_device
                .end_command_buffer(command_buffer)
                .map_err(VulkanError::UnableToEndCommandBuffer)
        }
    }

    /// Submit a recorded command buffer and block until the GPU has finished
    /// executing it.
    ///
    /// # Safety
    ///
    /// Unsafe because every resource referenced by the command buffer must
    /// still be alive.
    pub unsafe fn submit_and_wait(
        &self,
        command_buffer: vk::CommandBuffer,
    ) -> Result<(), VulkanError> {
        let fence = self
            .logical_device
            .create_fence(&vk::FenceCreateInfo::default(), None)
            .map_err(VulkanError::UnableToCreateFence)?;
        let fence = scopeguard::guard(fence, |fence| {
            self.logical_device.destroy_fence(fence, None)
        });

        let submit_info = vk::SubmitInfo {
            command_buffer_count: 1,
            p_command_buffers: &command_buffer,
            ..Default::default()
        };
        self.logical_device
            .queue_submit(self.queue, &[submit_info], *fence)
            .map_err(VulkanError::UnableToSubmitCommands)?;
        self.logical_device
            .wait_for_fences(&[*fence], true, u64::MAX)
            .map_err(VulkanError::UnexpectedFenceWaitError)
    }
}
