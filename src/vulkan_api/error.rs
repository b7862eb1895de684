use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VulkanError {
    #[error("Unable to load the Vulkan library")]
    UnableToLoadVulkan(#[source] ash::LoadingError),

    #[error("Unable to create a Vulkan instance {:?}", .0)]
    UnableToCreateInstance(#[source] vk::Result),

    #[error("Unable to enumerate physical devices {:?}", .0)]
    UnableToEnumeratePhysicalDevices(#[source] vk::Result),

    #[error("No physical device has a queue which supports graphics and transfer operations")]
    NoSuitableDeviceFound,

    #[error("Unable to create the logical device {:?}", .0)]
    UnableToCreateLogicalDevice(#[source] vk::Result),

    #[error("Unable to wait for the device to idle {:?}", .0)]
    UnableToWaitForDeviceToIdle(#[source] vk::Result),

    #[error(
        "No memory type could be found for flags {:?} and type bits {:#b}",
        .0,
        .1
    )]
    MemoryTypeNotFound(vk::MemoryPropertyFlags, u32),

    #[error("Unable to allocate {} bytes of device memory {:?}", .0, .1)]
    UnableToAllocateDeviceMemory(vk::DeviceSize, #[source] vk::Result),

    #[error("Unable to map device memory {:?}", .0)]
    UnableToMapDeviceMemory(#[source] vk::Result),

    #[error("Unable to flush mapped memory ranges {:?}", .0)]
    UnableToFlushMappedMemoryRanges(#[source] vk::Result),

    #[error(
        "Unable to create a buffer with {} bytes and usage {:?}",
        .0,
        .1
    )]
    UnableToCreateBuffer(
        vk::DeviceSize,
        vk::BufferUsageFlags,
        #[source] vk::Result,
    ),

    #[error("Unable to bind device memory to buffer {:?}", .0)]
    UnableToBindBufferMemory(#[source] vk::Result),

    #[error(
        "Unable to create a {:?} image with extent {:?} and usage {:?}",
        .0,
        .1,
        .2
    )]
    UnableToCreateImage(
        vk::Format,
        vk::Extent3D,
        vk::ImageUsageFlags,
        #[source] vk::Result,
    ),

    #[error("Unable to bind device memory to image {:?}", .0)]
    UnableToBindImageMemory(#[source] vk::Result),

    #[error("Unable to create command pool {:?}", .0)]
    UnableToCreateCommandPool(#[source] vk::Result),

    #[error("Unable to allocate command buffers {:?}", .0)]
    UnableToAllocateCommandBuffers(#[source] vk::Result),

    #[error("Unable to begin the command buffer {:?}", .0)]
    UnableToBeginCommandBuffer(#[source] vk::Result),

    #[error("Unable to end the command buffer {:?}", .0)]
    UnableToEndCommandBuffer(#[source] vk::Result),

    #[error("Unable to create fence {:?}", .0)]
    UnableToCreateFence(#[source] vk::Result),

    #[error("Error while waiting for fence {:?}", .0)]
    UnexpectedFenceWaitError(#[source] vk::Result),

    #[error("Unable to submit commands to the device queue {:?}", .0)]
    UnableToSubmitCommands(#[source] vk::Result),
}
