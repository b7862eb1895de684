use std::{
    ffi::c_void,
    sync::atomic::{AtomicU32, Ordering},
};

use ash::vk;

use crate::vulkan_api::{ResourceDevice, VulkanError};

/// One raw block of device memory which backs an entire pool.
pub struct DeviceMemory {
    memory: vk::DeviceMemory,
    size_in_bytes: vk::DeviceSize,
    memory_type_index: u32,
    property_flags: vk::MemoryPropertyFlags,
    map_count: AtomicU32,
    cpu_mapped_ptr: Option<*mut c_void>,
}

// public api
impl DeviceMemory {
    pub fn size_in_bytes(&self) -> vk::DeviceSize {
        self.size_in_bytes
    }

    pub fn memory_type_index(&self) -> u32 {
        self.memory_type_index
    }

    pub fn property_flags(&self) -> vk::MemoryPropertyFlags {
        self.property_flags
    }

    pub fn is_host_visible(&self) -> bool {
        self.property_flags
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    pub fn is_mapped(&self) -> bool {
        self.map_count.load(Ordering::Acquire) > 0
    }

    /// True when a resource whose requirements allow `memory_type_bits` can
    /// be bound to this memory.
    pub fn supports_memory_type_bits(&self, memory_type_bits: u32) -> bool {
        memory_type_bits & (1 << self.memory_type_index) != 0
    }

    /// # Safety
    ///
    /// Unsafe because the raw handle must not be freed or mapped by the
    /// caller.
    pub unsafe fn raw(&self) -> vk::DeviceMemory {
        self.memory
    }
}

// internal api
impl DeviceMemory {
    /// Allocate `size_in_bytes` from the first memory type allowed by
    /// `memory_type_bits` which has every requested property.
    ///
    /// # Safety
    ///
    /// Unsafe because the memory must be released with [Self::free] before
    /// the device is destroyed.
    pub(super) unsafe fn allocate(
        device: &dyn ResourceDevice,
        size_in_bytes: vk::DeviceSize,
        memory_type_bits: u32,
        property_flags: vk::MemoryPropertyFlags,
    ) -> Result<Self, VulkanError> {
        let memory_type_index =
            device.find_memory_type_index(memory_type_bits, property_flags)?;
        let allocate_info = vk::MemoryAllocateInfo {
            allocation_size: size_in_bytes,
            memory_type_index,
            ..Default::default()
        };
        let memory = device.allocate_memory(&allocate_info)?;
        Ok(Self {
            memory,
            size_in_bytes,
            memory_type_index,
            property_flags,
            map_count: AtomicU32::new(0),
            cpu_mapped_ptr: None,
        })
    }

    /// Map the entire block into host memory.
    ///
    /// # Safety
    ///
    /// Unsafe because the memory must be host visible and not yet mapped.
    pub(super) unsafe fn map(
        &mut self,
        device: &dyn ResourceDevice,
    ) -> Result<(), VulkanError> {
        debug_assert!(self.is_host_visible());
        debug_assert!(!self.is_mapped());

        let ptr = device.map_memory(self.memory, 0, vk::WHOLE_SIZE)?;
        self.cpu_mapped_ptr = Some(ptr);
        self.map_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Unmap the block. Does nothing when the memory isn't mapped.
    pub(super) fn unmap(&mut self, device: &dyn ResourceDevice) {
        if self.cpu_mapped_ptr.take().is_some() {
            self.map_count.fetch_sub(1, Ordering::AcqRel);
            // safe because the pointer was just taken so it can't be used
            // again
            unsafe { device.unmap_memory(self.memory) }
        }
    }

    /// Borrow `len` mapped bytes starting at `offset`.
    ///
    /// Returns None when the memory isn't mapped.
    ///
    /// # Safety
    ///
    /// Unsafe because:
    ///  - the range must lie inside the memory block
    ///  - the caller must synchronize with any device access to the range
    pub(super) unsafe fn bytes(
        &self,
        offset: vk::DeviceSize,
        len: vk::DeviceSize,
    ) -> Option<&[u8]> {
        debug_assert!(offset + len <= self.size_in_bytes);
        let ptr = self.cpu_mapped_ptr? as *const u8;
        Some(std::slice::from_raw_parts(
            ptr.add(offset as usize),
            len as usize,
        ))
    }

    /// # Safety
    ///
    /// Same requirements as [Self::bytes].
    pub(super) unsafe fn bytes_mut(
        &mut self,
        offset: vk::DeviceSize,
        len: vk::DeviceSize,
    ) -> Option<&mut [u8]> {
        debug_assert!(offset + len <= self.size_in_bytes);
        let ptr = self.cpu_mapped_ptr? as *mut u8;
        Some(std::slice::from_raw_parts_mut(
            ptr.add(offset as usize),
            len as usize,
        ))
    }

    /// Unmap and free the memory.
    ///
    /// # Safety
    ///
    /// Unsafe because nothing bound to the memory may still be in use.
    pub(super) unsafe fn free(mut self, device: &dyn ResourceDevice) {
        self.unmap(device);
        device.free_memory(self.memory);
    }
}

impl std::fmt::Debug for DeviceMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceMemory")
            .field("size_in_bytes", &self.size_in_bytes)
            .field("memory_type_index", &self.memory_type_index)
            .field("property_flags", &self.property_flags)
            .field("is_mapped", &self.is_mapped())
            .finish()
    }
}
