use std::{collections::HashMap, fmt, sync::Arc};

use ash::vk;
use scopeguard::ScopeGuard;

use super::{
    pool_core::{PoolConfig, PoolCore},
    BufferHandle, DeviceMemory, PoolId, ResourceError, ResourceHandle,
};
use crate::{
    allocator::{Allocation, ResourceId},
    vulkan_api::{ResourceDevice, VulkanError},
};

/// Everything a pool needs to know about one kind of Vulkan resource.
///
/// Pools are generic over the kind so buffers and images share the arena
/// bookkeeping, rollback and teardown while only the raw Vulkan calls
/// differ.
pub trait ResourceKind {
    type Handle: Copy + fmt::Debug + Into<ResourceHandle>;
    type Raw: Copy + fmt::Debug;
    type Usage: Copy + fmt::Debug;

    /// What the caller asks for when allocating a resource.
    type Desc: Copy + fmt::Debug;

    /// Used in log messages.
    const LABEL: &'static str;

    fn handle(pool: PoolId, resource: ResourceId) -> Self::Handle;

    fn locate(handle: Self::Handle) -> (PoolId, ResourceId);

    fn with_transfer_dst(usage: Self::Usage) -> Self::Usage;

    /// A resource with the pool's usage, created once to learn which memory
    /// types the pool's resources can be bound to.
    fn probe_desc(
        pool_size_in_bytes: vk::DeviceSize,
        usage: Self::Usage,
    ) -> Self::Desc;

    /// How many bytes of the allocation the host may read and write.
    fn byte_len(desc: &Self::Desc, allocation: &Allocation) -> vk::DeviceSize;

    /// # Safety
    ///
    /// Unsafe because the caller must destroy the resource before the
    /// device is destroyed.
    unsafe fn create(
        device: &dyn ResourceDevice,
        desc: &Self::Desc,
        sharing_mode: vk::SharingMode,
    ) -> Result<Self::Raw, VulkanError>;

    /// # Safety
    ///
    /// Unsafe because `raw` must be a live resource created by `device`.
    unsafe fn memory_requirements(
        device: &dyn ResourceDevice,
        raw: Self::Raw,
    ) -> vk::MemoryRequirements;

    /// # Safety
    ///
    /// Unsafe because `raw` must not already be bound to memory.
    unsafe fn bind(
        device: &dyn ResourceDevice,
        raw: Self::Raw,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<(), VulkanError>;

    /// # Safety
    ///
    /// Unsafe because the device must no longer use the resource.
    unsafe fn destroy(device: &dyn ResourceDevice, raw: Self::Raw);
}

/// A resource bound to a range of its pool's memory.
#[derive(Debug)]
pub struct Resource<K: ResourceKind> {
    handle: K::Handle,
    raw: K::Raw,
    desc: K::Desc,
    allocation: Allocation,
    staging: Option<BufferHandle>,
    staging_for: Option<ResourceHandle>,
}

impl<K: ResourceKind> Resource<K> {
    pub fn handle(&self) -> K::Handle {
        self.handle
    }

    /// # Safety
    ///
    /// Unsafe because the resource must not be destroyed by the caller.
    pub unsafe fn raw(&self) -> K::Raw {
        self.raw
    }

    pub fn desc(&self) -> &K::Desc {
        &self.desc
    }

    /// The number of bytes the host can read or write and the amount an
    /// upload copies.
    pub fn size_in_bytes(&self) -> vk::DeviceSize {
        K::byte_len(&self.desc, &self.allocation)
    }

    /// The range of pool memory the resource is bound to. It can be larger
    /// than the resource when the driver pads the memory requirements.
    pub fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    /// The staging buffer which uploads data into this resource.
    pub fn staging(&self) -> Option<BufferHandle> {
        self.staging
    }

    /// The resource this buffer stages data for, when it came from the
    /// staging pool.
    pub fn staging_for(&self) -> Option<ResourceHandle> {
        self.staging_for
    }
}

/// A fixed block of device memory which resources of one kind are
/// sub-allocated from.
pub struct ResourcePool<K: ResourceKind> {
    core: PoolCore,
    usage: K::Usage,
    resources: HashMap<ResourceId, Resource<K>>,
}

// public api
impl<K: ResourceKind> ResourcePool<K> {
    pub fn id(&self) -> PoolId {
        self.core.id()
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// True when resources from this pool must be written through a staging
    /// buffer.
    pub fn needs_staging(&self) -> bool {
        self.core.needs_staging()
    }

    pub fn capacity(&self) -> vk::DeviceSize {
        self.core.allocator().capacity()
    }

    pub fn bytes_in_use(&self) -> vk::DeviceSize {
        self.core.allocator().bytes_in_use()
    }

    pub fn memory_properties(&self) -> vk::MemoryPropertyFlags {
        self.core.memory_properties()
    }

    /// The usage flags the pool's memory was chosen for.
    pub fn usage(&self) -> K::Usage {
        self.usage
    }

    pub fn sharing_mode(&self) -> vk::SharingMode {
        self.core.sharing_mode()
    }

    pub fn memory(&self) -> &DeviceMemory {
        self.core.memory()
    }

    /// Every live allocation sorted by offset.
    pub fn allocations(&self) -> &[Allocation] {
        self.core.allocator().allocations()
    }

    /// The resource bound to the byte at `offset`, if any.
    pub fn owner_of(&self, offset: vk::DeviceSize) -> Option<K::Handle> {
        self.core
            .allocator()
            .owner_of(offset)
            .map(|resource| K::handle(self.id(), resource))
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn resource(
        &self,
        handle: K::Handle,
    ) -> Result<&Resource<K>, ResourceError> {
        let (pool, resource) = K::locate(handle);
        if pool != self.id() {
            return Err(ResourceError::ResourceNotFound(handle.into()));
        }
        self.resources
            .get(&resource)
            .ok_or(ResourceError::ResourceNotFound(handle.into()))
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource<K>> {
        self.resources.values()
    }

    /// Map the pool's memory into host address space.
    pub fn map(&mut self) -> Result<(), ResourceError> {
        self.core.map()
    }

    pub fn unmap(&mut self) {
        self.core.unmap()
    }

    pub fn is_mapped(&self) -> bool {
        self.core.memory().is_mapped()
    }

    /// View a resource's bytes through the mapped pool memory.
    ///
    /// # Safety
    ///
    /// Unsafe because the caller must synchronize with any device access to
    /// the resource.
    pub unsafe fn bytes(
        &self,
        handle: K::Handle,
    ) -> Result<&[u8], ResourceError> {
        let resource = self.resource(handle)?;
        self.core.bytes(
            handle.into(),
            &resource.allocation,
            resource.size_in_bytes(),
        )
    }

    /// # Safety
    ///
    /// Unsafe because the caller must synchronize with any device access to
    /// the resource.
    pub unsafe fn bytes_mut(
        &mut self,
        handle: K::Handle,
    ) -> Result<&mut [u8], ResourceError> {
        let (allocation, len) = {
            let resource = self.resource(handle)?;
            (resource.allocation, resource.size_in_bytes())
        };
        self.core.bytes_mut(handle.into(), &allocation, len)
    }

    /// The range to flush or invalidate for a resource, widened to the
    /// device's non-coherent atom size.
    pub fn mapped_memory_range(
        &self,
        handle: K::Handle,
    ) -> Result<vk::MappedMemoryRange, ResourceError> {
        let resource = self.resource(handle)?;
        Ok(self.core.mapped_memory_range(&resource.allocation))
    }

    /// Make host writes to the resource visible to the device.
    pub fn flush(&self, handle: K::Handle) -> Result<(), ResourceError> {
        let resource = self.resource(handle)?;
        self.core.flush(&resource.allocation)
    }
}

// internal api
impl<K: ResourceKind> ResourcePool<K> {
    pub(super) fn new(
        device: Arc<dyn ResourceDevice>,
        config: PoolConfig,
        usage: K::Usage,
    ) -> Result<Self, ResourceError> {
        let usage = if super::requires_staging(config.memory_properties) {
            K::with_transfer_dst(usage)
        } else {
            usage
        };
        let memory_type_bits = unsafe {
            probe_memory_type_bits::<K>(
                device.as_ref(),
                &K::probe_desc(config.size_in_bytes, usage),
                config.sharing_mode,
            )?
        };
        let core = PoolCore::new(device, config, memory_type_bits)?;
        log::debug!(
            "Created {} pool '{}' {} with {} bytes of {:?} memory",
            K::LABEL,
            core.name(),
            core.id(),
            core.memory().size_in_bytes(),
            core.memory_properties()
        );
        Ok(Self {
            core,
            usage,
            resources: HashMap::new(),
        })
    }

    /// Resources in pools which need staging always get `TRANSFER_DST` so
    /// they can be the target of an upload.
    pub(super) fn resource_usage(&self, usage: K::Usage) -> K::Usage {
        if self.needs_staging() {
            K::with_transfer_dst(usage)
        } else {
            usage
        }
    }

    /// Create a resource and bind it to the first range of pool memory
    /// which fits. Nothing is left behind when placement or binding fails.
    pub(super) fn allocate(
        &mut self,
        desc: K::Desc,
    ) -> Result<K::Handle, ResourceError> {
        let device = self.core.device().clone();
        let raw = scopeguard::guard(
            unsafe { K::create(device.as_ref(), &desc, self.sharing_mode())? },
            |raw| unsafe { K::destroy(device.as_ref(), raw) },
        );
        let requirements =
            unsafe { K::memory_requirements(device.as_ref(), *raw) };

        // safe because the raw handle is only used for the bind below
        let memory = unsafe { self.core.memory().raw() };
        let core = &mut self.core;
        let allocation = scopeguard::guard(
            core.place(&requirements)?,
            |allocation| {
                if let Err(err) = core.release(&allocation) {
                    log::error!("Unable to roll back {}: {}", allocation, err);
                }
            },
        );
        unsafe {
            K::bind(
                device.as_ref(),
                *raw,
                memory,
                allocation.offset_in_bytes(),
            )?
        };
        let allocation = ScopeGuard::into_inner(allocation);
        let raw = ScopeGuard::into_inner(raw);

        let resource = self.core.next_resource_id();
        let allocation = self.core.claim(&allocation, resource)?;
        let handle = K::handle(self.id(), resource);
        log::trace!(
            "Pool '{}' bound {} {:?} {:?} to {}",
            self.name(),
            K::LABEL,
            resource,
            desc,
            allocation
        );
        self.resources.insert(
            resource,
            Resource {
                handle,
                raw,
                desc,
                allocation,
                staging: None,
                staging_for: None,
            },
        );
        Ok(handle)
    }

    pub(super) fn set_staging(
        &mut self,
        handle: K::Handle,
        staging: Option<BufferHandle>,
    ) -> Result<(), ResourceError> {
        self.resource_mut(handle)?.staging = staging;
        Ok(())
    }

    pub(super) fn set_staging_for(
        &mut self,
        handle: K::Handle,
        owner: Option<ResourceHandle>,
    ) -> Result<(), ResourceError> {
        self.resource_mut(handle)?.staging_for = owner;
        Ok(())
    }

    /// Forget every staging reference which points into `pool`.
    pub(super) fn forget_staging_in(&mut self, pool: PoolId) {
        for resource in self.resources.values_mut() {
            if resource.staging.map(|staging| staging.pool) == Some(pool) {
                resource.staging = None;
            }
        }
    }

    /// Destroy a resource and release its range of the arena.
    ///
    /// Returns the resource's staging handle so the caller can free it too.
    pub(super) fn free(
        &mut self,
        handle: K::Handle,
    ) -> Result<Option<BufferHandle>, ResourceError> {
        self.resource(handle)?;
        let (_, id) = K::locate(handle);
        let resource = self
            .resources
            .remove(&id)
            .ok_or(ResourceError::ResourceNotFound(handle.into()))?;
        self.core.release(&resource.allocation)?;
        // safe because the caller guarantees the resource is not in use
        unsafe { K::destroy(self.core.device().as_ref(), resource.raw) };
        log::trace!(
            "Pool '{}' released {} {}",
            self.name(),
            K::LABEL,
            resource.allocation
        );
        Ok(resource.staging)
    }

    /// Destroy every resource and free the pool's memory.
    ///
    /// Returns the staging handles which were still attached to resources
    /// so the caller can release them in the staging pool.
    pub(super) fn destroy(mut self) -> Vec<BufferHandle> {
        let device = self.core.device().clone();
        let mut staging = vec![];
        for allocation in self.core.drain() {
            let Some(owner) = allocation.owner() else {
                continue;
            };
            if let Some(resource) = self.resources.remove(&owner) {
                staging.extend(resource.staging);
                unsafe { K::destroy(device.as_ref(), resource.raw) };
            }
        }
        for (_, resource) in self.resources.drain() {
            staging.extend(resource.staging);
            unsafe { K::destroy(device.as_ref(), resource.raw) };
        }
        log::debug!("Destroyed {} pool '{}'", K::LABEL, self.core.name());
        // safe because every resource bound to the memory is destroyed
        unsafe { self.core.free_memory() };
        staging
    }

    fn resource_mut(
        &mut self,
        handle: K::Handle,
    ) -> Result<&mut Resource<K>, ResourceError> {
        let (pool, resource) = K::locate(handle);
        if pool != self.id() {
            return Err(ResourceError::ResourceNotFound(handle.into()));
        }
        self.resources
            .get_mut(&resource)
            .ok_or(ResourceError::ResourceNotFound(handle.into()))
    }
}

impl<K: ResourceKind> fmt::Debug for ResourcePool<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("kind", &K::LABEL)
            .field("id", &self.id())
            .field("name", &self.name())
            .field("usage", &self.usage)
            .field("needs_staging", &self.needs_staging())
            .field("memory", self.memory())
            .field("bytes_in_use", &self.bytes_in_use())
            .field("resource_count", &self.resource_count())
            .finish()
    }
}

unsafe fn probe_memory_type_bits<K: ResourceKind>(
    device: &dyn ResourceDevice,
    desc: &K::Desc,
    sharing_mode: vk::SharingMode,
) -> Result<u32, ResourceError> {
    let probe = K::create(device, desc, sharing_mode)?;
    let requirements = K::memory_requirements(device, probe);
    K::destroy(device, probe);
    Ok(requirements.memory_type_bits)
}
