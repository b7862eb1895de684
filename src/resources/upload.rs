use ash::vk;

use super::{BufferHandle, ImageHandle, ResourceError, ResourceManager};

// staging uploads
impl ResourceManager {
    /// Record a copy from a buffer's staging buffer into the buffer followed
    /// by a barrier which makes the transfer visible to later reads.
    ///
    /// # Safety
    ///
    /// Unsafe because:
    ///  - the command buffer must be recording
    ///  - neither buffer may be freed until the commands finish executing
    pub unsafe fn cmd_upload_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        handle: BufferHandle,
    ) -> Result<(), ResourceError> {
        let buffer = self.buffer(handle)?;
        let staging = buffer
            .staging()
            .ok_or(ResourceError::NoStagingResource(handle.into()))?;
        let staging = self.buffer(staging)?;

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: buffer.size_in_bytes(),
        };
        self.device().cmd_copy_buffer(
            command_buffer,
            staging.raw(),
            buffer.raw(),
            &[region],
        );

        let barrier = vk::BufferMemoryBarrier {
            src_access_mask: vk::AccessFlags::TRANSFER_WRITE,
            dst_access_mask: vk::AccessFlags::MEMORY_READ,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            buffer: buffer.raw(),
            offset: 0,
            size: vk::WHOLE_SIZE,
            ..Default::default()
        };
        self.device().cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::ALL_COMMANDS,
            &[barrier],
            &[],
        );
        Ok(())
    }

    /// Record the transitions and copy which fill an image from its staging
    /// buffer. The image ends up in SHADER_READ_ONLY_OPTIMAL.
    ///
    /// # Safety
    ///
    /// Unsafe because:
    ///  - the command buffer must be recording
    ///  - the image contents are discarded by the first transition
    ///  - neither resource may be freed until the commands finish executing
    pub unsafe fn cmd_upload_image(
        &self,
        command_buffer: vk::CommandBuffer,
        handle: ImageHandle,
    ) -> Result<(), ResourceError> {
        let image = self.image(handle)?;
        let staging = image
            .staging()
            .ok_or(ResourceError::NoStagingResource(handle.into()))?;
        let staging = self.buffer(staging)?;

        self.cmd_transition_image_layout(
            command_buffer,
            handle,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        let extent = image.extent();
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        };
        self.device().cmd_copy_buffer_to_image(
            command_buffer,
            staging.raw(),
            image.raw(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );

        self.cmd_transition_image_layout(
            command_buffer,
            handle,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
    }

    /// Record a barrier which moves an image between layouts.
    ///
    /// Only the two transitions used for uploads are supported:
    /// UNDEFINED to TRANSFER_DST_OPTIMAL and TRANSFER_DST_OPTIMAL to
    /// SHADER_READ_ONLY_OPTIMAL.
    ///
    /// # Safety
    ///
    /// Unsafe because the command buffer must be recording and the image
    /// must be in `old_layout` when the barrier executes.
    pub unsafe fn cmd_transition_image_layout(
        &self,
        command_buffer: vk::CommandBuffer,
        handle: ImageHandle,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Result<(), ResourceError> {
        let (src_access_mask, dst_access_mask, src_stage, dst_stage) =
            match (old_layout, new_layout) {
                (
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                ) => (
                    vk::AccessFlags::empty(),
                    vk::AccessFlags::TRANSFER_WRITE,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                ),
                (
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                ) => (
                    vk::AccessFlags::TRANSFER_WRITE,
                    vk::AccessFlags::SHADER_READ,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                ),
                _ => {
                    return Err(ResourceError::UnsupportedLayoutTransition(
                        old_layout, new_layout,
                    ))
                }
            };

        let image = self.image(handle)?;
        let barrier = vk::ImageMemoryBarrier {
            src_access_mask,
            dst_access_mask,
            old_layout,
            new_layout,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: image.raw(),
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        self.device().cmd_pipeline_barrier(
            command_buffer,
            src_stage,
            dst_stage,
            &[],
            &[barrier],
        );
        Ok(())
    }
}
