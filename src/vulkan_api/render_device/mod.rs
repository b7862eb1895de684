mod api;
mod commands;
mod instance;

use ash::vk;

use crate::{logging::PrettyList, vulkan_api::VulkanError};

const SINGLE_QUEUE_PRIORITY: [f32; 1] = [1.0];

/// A headless Vulkan logical device with a single graphics+transfer queue.
///
/// This is all the resource pools need: memory allocation, buffer and image
/// creation, and a queue for submitting staging uploads.
pub struct RenderDevice {
    queue: vk::Queue,
    queue_family_index: u32,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    non_coherent_atom_size: vk::DeviceSize,
    physical_device: vk::PhysicalDevice,
    logical_device: ash::Device,
    instance: ash::Instance,
    _entry: ash::Entry,
}

impl RenderDevice {
    /// Load Vulkan, create an instance and pick the first physical device
    /// with a queue family that supports graphics and transfer.
    pub fn new() -> Result<Self, VulkanError> {
        let (instance, entry) = instance::create_instance()?;
        let (physical_device, queue_family_index) =
            match instance::find_physical_device(&instance) {
                Ok(found) => found,
                Err(error) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(error);
                }
            };

        let queue_create_infos = [vk::DeviceQueueCreateInfo {
            queue_family_index,
            queue_count: 1,
            p_queue_priorities: SINGLE_QUEUE_PRIORITY.as_ptr(),
            ..Default::default()
        }];
        let create_info = vk::DeviceCreateInfo {
            queue_create_info_count: queue_create_infos.len() as u32,
            p_queue_create_infos: queue_create_infos.as_ptr(),
            ..Default::default()
        };
        let logical_device = unsafe {
            instance
                .create_device(physical_device, &create_info, None)
                .map_err(|err| {
                    instance.destroy_instance(None);
                    VulkanError::UnableToCreateLogicalDevice(err)
                })?
        };

        let queue =
            unsafe { logical_device.get_device_queue(queue_family_index, 0) };
        let memory_properties = unsafe {
            instance.get_physical_device_memory_properties(physical_device)
        };

        let non_coherent_atom_size = unsafe {
            instance
                .get_physical_device_properties(physical_device)
                .limits
                .non_coherent_atom_size
        };

        let memory_types = &memory_properties.memory_types
            [..memory_properties.memory_type_count as usize];
        log::debug!(
            "Device memory types: {:#?}",
            PrettyList(
                &memory_types
                    .iter()
                    .map(|memory_type| memory_type.property_flags)
                    .collect::<Vec<_>>()
            )
        );

        Ok(Self {
            queue,
            queue_family_index,
            memory_properties,
            non_coherent_atom_size,
            physical_device,
            logical_device,
            instance,
            _entry: entry,
        })
    }

    /// The physical device backing this logical device.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// The queue family used for submissions.
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Stall the thread until the GPU is done with all operations.
    pub fn wait_idle(&self) -> Result<(), VulkanError> {
        unsafe {
            self.logical_device
                .device_wait_idle()
                .map_err(VulkanError::UnableToWaitForDeviceToIdle)
        }
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(error) = self.logical_device.device_wait_idle() {
                log::error!(
                    "Error while idling the device before destruction {:?}",
                    error
                );
            }
            self.logical_device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
