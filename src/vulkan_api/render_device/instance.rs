use std::os::raw::c_char;

use ash::vk;

use crate::vulkan_api::VulkanError;

const APPLICATION_NAME: &[u8] = b"ccthw resource pools\0";
const ENGINE_NAME: &[u8] = b"no engine\0";

/// Load the Vulkan library and create an instance without any window system
/// extensions.
pub(super) fn create_instance(
) -> Result<(ash::Instance, ash::Entry), VulkanError> {
    let entry =
        unsafe { ash::Entry::load().map_err(VulkanError::UnableToLoadVulkan)? };

    let app_info = vk::ApplicationInfo {
        p_application_name: APPLICATION_NAME.as_ptr() as *const c_char,
        p_engine_name: ENGINE_NAME.as_ptr() as *const c_char,
        application_version: vk::make_api_version(0, 1, 0, 0),
        engine_version: vk::make_api_version(0, 1, 0, 0),
        api_version: vk::make_api_version(0, 1, 1, 0),
        ..Default::default()
    };
    let create_info = vk::InstanceCreateInfo {
        p_application_info: &app_info,
        ..Default::default()
    };

    let instance = unsafe {
        entry
            .create_instance(&create_info, None)
            .map_err(VulkanError::UnableToCreateInstance)?
    };

    Ok((instance, entry))
}

/// Pick the first physical device which has a graphics queue family. Graphics
/// queues always accept transfer commands, even when the TRANSFER bit is not
/// reported.
pub(super) fn find_physical_device(
    instance: &ash::Instance,
) -> Result<(vk::PhysicalDevice, u32), VulkanError> {
    let physical_devices = unsafe {
        instance
            .enumerate_physical_devices()
            .map_err(VulkanError::UnableToEnumeratePhysicalDevices)?
    };

    physical_devices
        .into_iter()
        .find_map(|physical_device| {
            let queue_families = unsafe {
                instance.get_physical_device_queue_family_properties(
                    physical_device,
                )
            };
            let family_index = queue_families.iter().position(|family| {
                family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            });
            if family_index.is_none() {
                log::trace!(
                    "No graphics queue family on physical device {:?}",
                    physical_device
                );
            }
            family_index.map(|index| (physical_device, index as u32))
        })
        .ok_or(VulkanError::NoSuitableDeviceFound)
}
