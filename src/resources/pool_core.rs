use std::sync::Arc;

use ash::vk;

use super::{
    requires_staging, DeviceMemory, PoolId, ResourceError, ResourceHandle,
};
use crate::{
    allocator::{
        align_up, Allocation, AllocatorKind, ResourceId, SubAllocator,
    },
    vulkan_api::ResourceDevice,
};

/// The arena bookkeeping shared by buffer and image pools.
///
/// The core owns the device memory block and the allocator which hands out
/// ranges of it. It knows nothing about the resources bound to those ranges.
pub(super) struct PoolCore {
    id: PoolId,
    name: String,
    memory_properties: vk::MemoryPropertyFlags,
    sharing_mode: vk::SharingMode,
    needs_staging: bool,
    memory: DeviceMemory,
    allocator: Box<dyn SubAllocator>,
    next_resource_id: u64,
    device: Arc<dyn ResourceDevice>,
}

pub(super) struct PoolConfig {
    pub id: PoolId,
    pub name: String,
    pub size_in_bytes: vk::DeviceSize,
    pub memory_properties: vk::MemoryPropertyFlags,
    pub sharing_mode: vk::SharingMode,
    pub allocator_kind: AllocatorKind,
}

impl PoolCore {
    /// Allocate the pool's memory block from a memory type allowed by
    /// `memory_type_bits`.
    pub fn new(
        device: Arc<dyn ResourceDevice>,
        config: PoolConfig,
        memory_type_bits: u32,
    ) -> Result<Self, ResourceError> {
        let memory = unsafe {
            DeviceMemory::allocate(
                device.as_ref(),
                config.size_in_bytes,
                memory_type_bits,
                config.memory_properties,
            )?
        };
        Ok(Self {
            id: config.id,
            name: config.name,
            memory_properties: config.memory_properties,
            sharing_mode: config.sharing_mode,
            needs_staging: requires_staging(config.memory_properties),
            memory,
            allocator: config.allocator_kind.create(config.size_in_bytes),
            next_resource_id: 0,
            device,
        })
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn memory_properties(&self) -> vk::MemoryPropertyFlags {
        self.memory_properties
    }

    pub fn sharing_mode(&self) -> vk::SharingMode {
        self.sharing_mode
    }

    pub fn needs_staging(&self) -> bool {
        self.needs_staging
    }

    pub fn memory(&self) -> &DeviceMemory {
        &self.memory
    }

    pub fn device(&self) -> &Arc<dyn ResourceDevice> {
        &self.device
    }

    pub fn allocator(&self) -> &dyn SubAllocator {
        self.allocator.as_ref()
    }

    pub fn next_resource_id(&mut self) -> ResourceId {
        let id = ResourceId::new(self.next_resource_id);
        self.next_resource_id += 1;
        id
    }

    /// Reserve a range of the arena which satisfies `requirements`.
    pub fn place(
        &mut self,
        requirements: &vk::MemoryRequirements,
    ) -> Result<Allocation, ResourceError> {
        if !self
            .memory
            .supports_memory_type_bits(requirements.memory_type_bits)
        {
            return Err(ResourceError::IncompatibleMemoryType {
                pool: self.name.clone(),
                memory_type_index: self.memory.memory_type_index(),
                memory_type_bits: requirements.memory_type_bits,
            });
        }
        self.allocator
            .allocate(requirements.size, requirements.alignment)
            .ok_or_else(|| ResourceError::InsufficientSpace {
                pool: self.name.clone(),
                size: requirements.size,
                alignment: requirements.alignment,
                in_use: self.allocator.bytes_in_use(),
                capacity: self.allocator.capacity(),
            })
    }

    /// Record `owner` on a placed allocation and return the updated copy.
    pub fn claim(
        &mut self,
        allocation: &Allocation,
        owner: ResourceId,
    ) -> Result<Allocation, ResourceError> {
        self.allocator.set_owner(allocation, owner)?;
        let claimed = self
            .allocator
            .allocations()
            .iter()
            .find(|live| live.id() == allocation.id())
            .copied()
            .unwrap_or(*allocation);
        Ok(claimed)
    }

    pub fn release(
        &mut self,
        allocation: &Allocation,
    ) -> Result<(), ResourceError> {
        self.allocator.free(allocation)?;
        Ok(())
    }

    /// Remove every allocation from the arena at once.
    pub fn drain(&mut self) -> Vec<Allocation> {
        self.allocator.drain()
    }

    pub fn map(&mut self) -> Result<(), ResourceError> {
        if !self.memory.is_host_visible() {
            return Err(ResourceError::MemoryNotHostVisible(
                self.name.clone(),
                self.memory_properties,
            ));
        }
        if self.memory.is_mapped() {
            return Err(ResourceError::MemoryAlreadyMapped(self.name.clone()));
        }
        // safe because the memory is host visible and not yet mapped
        unsafe { self.memory.map(self.device.as_ref())? };
        log::trace!("Mapped pool '{}'", self.name);
        Ok(())
    }

    pub fn unmap(&mut self) {
        if self.memory.is_mapped() {
            self.memory.unmap(self.device.as_ref());
            log::trace!("Unmapped pool '{}'", self.name);
        }
    }

    /// # Safety
    ///
    /// Unsafe because the caller must synchronize with device access to the
    /// range.
    pub unsafe fn bytes(
        &self,
        handle: ResourceHandle,
        allocation: &Allocation,
        len: vk::DeviceSize,
    ) -> Result<&[u8], ResourceError> {
        self.check_host_access(handle)?;
        self.memory
            .bytes(allocation.offset_in_bytes(), len)
            .ok_or_else(|| ResourceError::MemoryNotMapped(self.name.clone()))
    }

    /// # Safety
    ///
    /// Unsafe because the caller must synchronize with device access to the
    /// range.
    pub unsafe fn bytes_mut(
        &mut self,
        handle: ResourceHandle,
        allocation: &Allocation,
        len: vk::DeviceSize,
    ) -> Result<&mut [u8], ResourceError> {
        self.check_host_access(handle)?;
        let name = &self.name;
        self.memory
            .bytes_mut(allocation.offset_in_bytes(), len)
            .ok_or_else(|| ResourceError::MemoryNotMapped(name.clone()))
    }

    /// The allocation's range widened to whole non-coherent atoms. The end
    /// is clamped to the memory block, which Vulkan also accepts.
    pub fn mapped_memory_range(
        &self,
        allocation: &Allocation,
    ) -> vk::MappedMemoryRange {
        let atom = self.device.non_coherent_atom_size().max(1);
        let offset = allocation.offset_in_bytes() / atom * atom;
        let end = align_up(allocation.end_in_bytes(), atom)
            .min(self.memory.size_in_bytes());
        vk::MappedMemoryRange {
            // safe because the handle is only used to describe the range
            memory: unsafe { self.memory.raw() },
            offset,
            size: end - offset,
            ..Default::default()
        }
    }

    /// Make host writes to the allocation visible to the device.
    ///
    /// Host-coherent memory needs no flush so nothing is sent to the device.
    pub fn flush(&self, allocation: &Allocation) -> Result<(), ResourceError> {
        if !self.memory.is_mapped() {
            return Err(ResourceError::MemoryNotMapped(self.name.clone()));
        }
        if self
            .memory_properties
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        {
            return Ok(());
        }
        let range = self.mapped_memory_range(allocation);
        // safe because the memory is mapped
        unsafe { self.device.flush_mapped_memory_ranges(&[range])? };
        Ok(())
    }

    /// Unmap and free the pool's memory block.
    ///
    /// # Safety
    ///
    /// Unsafe because every resource bound to the memory must already be
    /// destroyed.
    pub unsafe fn free_memory(self) {
        let Self { memory, device, .. } = self;
        memory.free(device.as_ref());
    }

    fn check_host_access(
        &self,
        handle: ResourceHandle,
    ) -> Result<(), ResourceError> {
        if self.needs_staging {
            return Err(ResourceError::RequiresStaging(handle));
        }
        Ok(())
    }
}
