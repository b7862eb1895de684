use std::{collections::HashMap, sync::Arc};

use ash::vk;

use super::{
    pool_core::PoolConfig,
    resource_pool::{ResourceKind, ResourcePool},
    BufferHandle, BufferPool, BufferResource, ImageHandle, ImagePool,
    ImageResource, PoolId, ResourceError, ResourceHandle, STAGING_POOL_NAME,
};
use crate::{
    allocator::AllocatorKind, logging::PrettyList, vulkan_api::ResourceDevice,
};

/// Owns every pool and routes resource handles to the pool which created
/// them.
///
/// Buffer pools and image pools live in separate registries, so a buffer
/// pool and an image pool may share a name. Dropping the manager destroys
/// every pool.
pub struct ResourceManager {
    buffer_pools: HashMap<String, BufferPool>,
    image_pools: HashMap<String, ImagePool>,
    next_pool_id: u32,
    allocator_kind: AllocatorKind,
    device: Arc<dyn ResourceDevice>,
}

/// The facts about a resource that staging decisions depend on.
struct ResourceInfo {
    pool_name: String,
    needs_staging: bool,
    size_in_bytes: vk::DeviceSize,
    staging: Option<BufferHandle>,
    staging_for: Option<ResourceHandle>,
}

impl ResourceInfo {
    fn of<K: ResourceKind>(
        pool: &ResourcePool<K>,
        handle: K::Handle,
    ) -> Result<Self, ResourceError> {
        let resource = pool.resource(handle)?;
        Ok(Self {
            pool_name: pool.name().to_owned(),
            needs_staging: pool.needs_staging(),
            size_in_bytes: resource.size_in_bytes(),
            staging: resource.staging(),
            staging_for: resource.staging_for(),
        })
    }
}

// pool management
impl ResourceManager {
    /// Create a manager whose pools use first-fit sub-allocation.
    pub fn new(device: Arc<dyn ResourceDevice>) -> Self {
        Self::with_allocator(device, AllocatorKind::default())
    }

    pub fn with_allocator(
        device: Arc<dyn ResourceDevice>,
        allocator_kind: AllocatorKind,
    ) -> Self {
        Self {
            buffer_pools: HashMap::new(),
            image_pools: HashMap::new(),
            next_pool_id: 0,
            allocator_kind,
            device,
        }
    }

    pub fn device(&self) -> &Arc<dyn ResourceDevice> {
        &self.device
    }

    pub fn allocator_kind(&self) -> AllocatorKind {
        self.allocator_kind
    }

    /// Allocate a block of `size_in_bytes` device memory for buffers.
    ///
    /// Pools whose memory is device-local but not host-visible need
    /// staging, so the pool usage gains `TRANSFER_DST`.
    pub fn create_buffer_pool(
        &mut self,
        name: impl Into<String>,
        size_in_bytes: vk::DeviceSize,
        memory_properties: vk::MemoryPropertyFlags,
        usage: vk::BufferUsageFlags,
        sharing_mode: vk::SharingMode,
    ) -> Result<&mut BufferPool, ResourceError> {
        let name = name.into();
        if self.buffer_pools.contains_key(&name) {
            return Err(ResourceError::PoolAlreadyExists(name));
        }
        let config = self.pool_config(
            name.clone(),
            size_in_bytes,
            memory_properties,
            sharing_mode,
        );
        let pool = BufferPool::new(self.device.clone(), config, usage)?;
        self.next_pool_id += 1;
        Ok(self.buffer_pools.entry(name).or_insert(pool))
    }

    /// Allocate a block of `size_in_bytes` device memory for images.
    pub fn create_image_pool(
        &mut self,
        name: impl Into<String>,
        size_in_bytes: vk::DeviceSize,
        memory_properties: vk::MemoryPropertyFlags,
        usage: vk::ImageUsageFlags,
        sharing_mode: vk::SharingMode,
    ) -> Result<&mut ImagePool, ResourceError> {
        let name = name.into();
        if self.image_pools.contains_key(&name) {
            return Err(ResourceError::PoolAlreadyExists(name));
        }
        let config = self.pool_config(
            name.clone(),
            size_in_bytes,
            memory_properties,
            sharing_mode,
        );
        let pool = ImagePool::new(self.device.clone(), config, usage)?;
        self.next_pool_id += 1;
        Ok(self.image_pools.entry(name).or_insert(pool))
    }

    /// Create the host-coherent pool which staging buffers come from.
    pub fn create_staging_pool(
        &mut self,
        size_in_bytes: vk::DeviceSize,
    ) -> Result<&mut BufferPool, ResourceError> {
        self.create_buffer_pool(
            STAGING_POOL_NAME,
            size_in_bytes,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::SharingMode::EXCLUSIVE,
        )
    }

    /// Create a host-coherent pool for vertex and index buffers which the
    /// CPU writes directly.
    pub fn create_host_vertex_and_index_pool(
        &mut self,
        name: impl Into<String>,
        size_in_bytes: vk::DeviceSize,
    ) -> Result<&mut BufferPool, ResourceError> {
        self.create_buffer_pool(
            name,
            size_in_bytes,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::INDEX_BUFFER,
            vk::SharingMode::EXCLUSIVE,
        )
    }

    /// Create a device-local pool for sampled textures. Images from it are
    /// filled through staging buffers.
    pub fn create_device_texture_pool(
        &mut self,
        name: impl Into<String>,
        size_in_bytes: vk::DeviceSize,
    ) -> Result<&mut ImagePool, ResourceError> {
        self.create_image_pool(
            name,
            size_in_bytes,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::SharingMode::EXCLUSIVE,
        )
    }

    pub fn buffer_pool(&self, name: &str) -> Result<&BufferPool, ResourceError> {
        self.buffer_pools
            .get(name)
            .ok_or_else(|| pool_not_found(name))
    }

    pub fn buffer_pool_mut(
        &mut self,
        name: &str,
    ) -> Result<&mut BufferPool, ResourceError> {
        self.buffer_pools
            .get_mut(name)
            .ok_or_else(|| pool_not_found(name))
    }

    pub fn image_pool(&self, name: &str) -> Result<&ImagePool, ResourceError> {
        self.image_pools
            .get(name)
            .ok_or_else(|| pool_not_found(name))
    }

    pub fn image_pool_mut(
        &mut self,
        name: &str,
    ) -> Result<&mut ImagePool, ResourceError> {
        self.image_pools
            .get_mut(name)
            .ok_or_else(|| pool_not_found(name))
    }

    pub fn has_staging_pool(&self) -> bool {
        self.buffer_pools.contains_key(STAGING_POOL_NAME)
    }

    pub fn staging_pool(&self) -> Result<&BufferPool, ResourceError> {
        self.buffer_pools
            .get(STAGING_POOL_NAME)
            .ok_or(ResourceError::StagingPoolMissing)
    }

    pub fn staging_pool_mut(
        &mut self,
    ) -> Result<&mut BufferPool, ResourceError> {
        self.buffer_pools
            .get_mut(STAGING_POOL_NAME)
            .ok_or(ResourceError::StagingPoolMissing)
    }

    /// Destroy every buffer in the pool and free its memory.
    ///
    /// Staging buffers attached to the pool's buffers are released and
    /// other pools forget any staging buffers which lived in this pool.
    pub fn destroy_buffer_pool(
        &mut self,
        name: &str,
    ) -> Result<(), ResourceError> {
        let pool = self
            .buffer_pools
            .remove(name)
            .ok_or_else(|| pool_not_found(name))?;
        let id = pool.id();
        let staging = pool.destroy();
        self.release_destroyed_pool(id, staging);
        Ok(())
    }

    pub fn destroy_image_pool(
        &mut self,
        name: &str,
    ) -> Result<(), ResourceError> {
        let pool = self
            .image_pools
            .remove(name)
            .ok_or_else(|| pool_not_found(name))?;
        let id = pool.id();
        let staging = pool.destroy();
        self.release_destroyed_pool(id, staging);
        Ok(())
    }

    /// Destroy every pool. The staging pool goes last so the staging
    /// buffers of other pools can still be released.
    pub fn destroy_all(&mut self) {
        let image_pools: Vec<String> = self.image_pools.keys().cloned().collect();
        for name in image_pools {
            if let Err(err) = self.destroy_image_pool(&name) {
                log::error!("Unable to destroy image pool '{}': {}", name, err);
            }
        }

        let buffer_pools: Vec<String> = self
            .buffer_pools
            .keys()
            .filter(|name| name.as_str() != STAGING_POOL_NAME)
            .cloned()
            .collect();
        for name in buffer_pools {
            if let Err(err) = self.destroy_buffer_pool(&name) {
                log::error!(
                    "Unable to destroy buffer pool '{}': {}",
                    name,
                    err
                );
            }
        }

        if self.has_staging_pool() {
            if let Err(err) = self.destroy_buffer_pool(STAGING_POOL_NAME) {
                log::error!("Unable to destroy the staging pool: {}", err);
            }
        }
    }

    /// Log every pool along with its live allocations.
    pub fn log_details(&self) {
        let mut buffer_pools: Vec<&BufferPool> =
            self.buffer_pools.values().collect();
        buffer_pools.sort_by_key(|pool| pool.id());
        for pool in buffer_pools {
            log::info!(
                "Buffer pool '{}' {}: {} of {} bytes in use by {} buffers, needs staging: {}\nAllocations:{}",
                pool.name(),
                pool.id(),
                pool.bytes_in_use(),
                pool.capacity(),
                pool.resource_count(),
                pool.needs_staging(),
                PrettyList(pool.allocations())
            );
        }

        let mut image_pools: Vec<&ImagePool> =
            self.image_pools.values().collect();
        image_pools.sort_by_key(|pool| pool.id());
        for pool in image_pools {
            log::info!(
                "Image pool '{}' {}: {} of {} bytes in use by {} images, needs staging: {}\nAllocations:{}",
                pool.name(),
                pool.id(),
                pool.bytes_in_use(),
                pool.capacity(),
                pool.resource_count(),
                pool.needs_staging(),
                PrettyList(pool.allocations())
            );
        }
    }
}

// resources
impl ResourceManager {
    pub fn allocate_buffer(
        &mut self,
        pool: &str,
        size_in_bytes: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<BufferHandle, ResourceError> {
        self.buffer_pool_mut(pool)?
            .allocate_buffer(size_in_bytes, usage)
    }

    /// Allocate a buffer exactly as large as `data` and fill it.
    ///
    /// Buffers from pools which need staging get a staging buffer which
    /// holds the data until the upload is recorded. Nothing is kept when
    /// any step fails.
    ///
    /// # Safety
    ///
    /// Unsafe because the caller must synchronize with any device access to
    /// the written memory.
    pub unsafe fn allocate_buffer_for(
        &mut self,
        pool: &str,
        data: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> Result<BufferHandle, ResourceError> {
        let handle = self.allocate_buffer(pool, data.len() as u64, usage)?;
        if let Err(err) = self.stage_and_write(handle.into(), data) {
            if let Err(free_err) = self.free_resource(handle) {
                log::error!(
                    "Unable to release {:?} after a failed write: {}",
                    handle,
                    free_err
                );
            }
            return Err(err);
        }
        Ok(handle)
    }

    pub fn allocate_image(
        &mut self,
        pool: &str,
        extent: vk::Extent2D,
        format: vk::Format,
        tiling: vk::ImageTiling,
        usage: vk::ImageUsageFlags,
    ) -> Result<ImageHandle, ResourceError> {
        self.image_pool_mut(pool)?
            .allocate_image(extent, format, tiling, usage)
    }

    pub fn buffer(
        &self,
        handle: BufferHandle,
    ) -> Result<&BufferResource, ResourceError> {
        self.buffer_pool_by_id(handle.pool)?.buffer(handle)
    }

    pub fn image(
        &self,
        handle: ImageHandle,
    ) -> Result<&ImageResource, ResourceError> {
        self.image_pool_by_id(handle.pool)?.image(handle)
    }

    /// The staging buffer attached to a resource, if any.
    pub fn staging_resource(
        &self,
        handle: impl Into<ResourceHandle>,
    ) -> Result<Option<BufferHandle>, ResourceError> {
        Ok(self.resource_info(handle.into())?.staging)
    }

    /// View a resource's bytes through its pool's mapped memory.
    ///
    /// # Safety
    ///
    /// Unsafe because the caller must synchronize with any device access to
    /// the resource.
    pub unsafe fn bytes(
        &self,
        handle: impl Into<ResourceHandle>,
    ) -> Result<&[u8], ResourceError> {
        match handle.into() {
            ResourceHandle::Buffer(handle) => {
                self.buffer_pool_by_id(handle.pool)?.bytes(handle)
            }
            ResourceHandle::Image(handle) => {
                self.image_pool_by_id(handle.pool)?.bytes(handle)
            }
        }
    }

    /// # Safety
    ///
    /// Unsafe because the caller must synchronize with any device access to
    /// the resource.
    pub unsafe fn bytes_mut(
        &mut self,
        handle: impl Into<ResourceHandle>,
    ) -> Result<&mut [u8], ResourceError> {
        match handle.into() {
            ResourceHandle::Buffer(handle) => {
                self.buffer_pool_by_id_mut(handle.pool)?.bytes_mut(handle)
            }
            ResourceHandle::Image(handle) => {
                self.image_pool_by_id_mut(handle.pool)?.bytes_mut(handle)
            }
        }
    }

    /// Copy `data` to the front of a resource.
    ///
    /// Resources in pools which need staging are written through their
    /// staging buffer, which must already be allocated. The upload still has
    /// to be recorded and submitted afterwards.
    ///
    /// # Safety
    ///
    /// Unsafe because the caller must synchronize with any device access to
    /// the written memory.
    pub unsafe fn write_resource(
        &mut self,
        handle: impl Into<ResourceHandle>,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        let handle = handle.into();
        let info = self.resource_info(handle)?;
        if data.len() as u64 > info.size_in_bytes {
            return Err(ResourceError::DataTooLarge {
                len: data.len(),
                capacity: info.size_in_bytes,
            });
        }
        let target: ResourceHandle = if info.needs_staging {
            info.staging
                .ok_or(ResourceError::NoStagingResource(handle))?
                .into()
        } else {
            handle
        };
        let bytes = self.bytes_mut(target)?;
        bytes[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Attach a staging buffer from the staging pool to a resource which
    /// needs staging.
    ///
    /// The staging buffer is as large as the resource. When one is already
    /// attached it is returned as-is.
    pub fn allocate_staging_resource(
        &mut self,
        handle: impl Into<ResourceHandle>,
    ) -> Result<BufferHandle, ResourceError> {
        let handle = handle.into();
        let info = self.resource_info(handle)?;
        if !info.needs_staging {
            return Err(ResourceError::ResourceNotStageable(
                handle,
                info.pool_name,
            ));
        }
        if let Some(staging) = info.staging {
            return Ok(staging);
        }
        let staging = self.staging_pool_mut()?.allocate_buffer(
            info.size_in_bytes,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        self.staging_pool_mut()?
            .set_staging_for(staging, Some(handle))?;
        self.set_staging(handle, Some(staging))?;
        log::trace!("Attached staging buffer {:?} to {:?}", staging, handle);
        Ok(staging)
    }

    /// Release a resource's staging buffer. Does nothing when no staging
    /// buffer is attached or it was already freed.
    pub fn free_staging_resource(
        &mut self,
        handle: impl Into<ResourceHandle>,
    ) -> Result<(), ResourceError> {
        let handle = handle.into();
        let Some(staging) = self.resource_info(handle)?.staging else {
            return Ok(());
        };
        self.set_staging(handle, None)?;
        match self.free_resource(staging) {
            Err(ResourceError::ResourceNotFound(_))
            | Err(ResourceError::PoolNotFound(_)) => {
                log::trace!(
                    "Staging buffer {:?} of {:?} was already released",
                    staging,
                    handle
                );
                Ok(())
            }
            result => result,
        }
    }

    /// Release a resource's staging buffer, return its range to the pool and
    /// destroy it.
    ///
    /// Freeing a staging buffer directly detaches it from the resource it
    /// was staging data for.
    pub fn free_resource(
        &mut self,
        handle: impl Into<ResourceHandle>,
    ) -> Result<(), ResourceError> {
        let handle = handle.into();
        let info = self.resource_info(handle)?;
        if let (Some(owner), ResourceHandle::Buffer(staging)) =
            (info.staging_for, handle)
        {
            self.detach_staging(owner, staging);
        }
        self.free_staging_resource(handle)?;
        match handle {
            ResourceHandle::Buffer(handle) => {
                self.buffer_pool_by_id_mut(handle.pool)?.free(handle)?;
            }
            ResourceHandle::Image(handle) => {
                self.image_pool_by_id_mut(handle.pool)?.free(handle)?;
            }
        }
        Ok(())
    }
}

// internal api
impl ResourceManager {
    fn pool_config(
        &self,
        name: String,
        size_in_bytes: vk::DeviceSize,
        memory_properties: vk::MemoryPropertyFlags,
        sharing_mode: vk::SharingMode,
    ) -> PoolConfig {
        PoolConfig {
            id: PoolId(self.next_pool_id),
            name,
            size_in_bytes,
            memory_properties,
            sharing_mode,
            allocator_kind: self.allocator_kind,
        }
    }

    fn buffer_pool_by_id(
        &self,
        id: PoolId,
    ) -> Result<&BufferPool, ResourceError> {
        self.buffer_pools
            .values()
            .find(|pool| pool.id() == id)
            .ok_or_else(|| ResourceError::PoolNotFound(id.to_string()))
    }

    fn buffer_pool_by_id_mut(
        &mut self,
        id: PoolId,
    ) -> Result<&mut BufferPool, ResourceError> {
        self.buffer_pools
            .values_mut()
            .find(|pool| pool.id() == id)
            .ok_or_else(|| ResourceError::PoolNotFound(id.to_string()))
    }

    fn image_pool_by_id(
        &self,
        id: PoolId,
    ) -> Result<&ImagePool, ResourceError> {
        self.image_pools
            .values()
            .find(|pool| pool.id() == id)
            .ok_or_else(|| ResourceError::PoolNotFound(id.to_string()))
    }

    fn image_pool_by_id_mut(
        &mut self,
        id: PoolId,
    ) -> Result<&mut ImagePool, ResourceError> {
        self.image_pools
            .values_mut()
            .find(|pool| pool.id() == id)
            .ok_or_else(|| ResourceError::PoolNotFound(id.to_string()))
    }

    fn resource_info(
        &self,
        handle: ResourceHandle,
    ) -> Result<ResourceInfo, ResourceError> {
        match handle {
            ResourceHandle::Buffer(handle) => {
                ResourceInfo::of(self.buffer_pool_by_id(handle.pool)?, handle)
            }
            ResourceHandle::Image(handle) => {
                ResourceInfo::of(self.image_pool_by_id(handle.pool)?, handle)
            }
        }
    }

    /// Clear `owner`'s staging reference when it still points at `staging`.
    /// The owner is gone when its pool was destroyed first.
    fn detach_staging(&mut self, owner: ResourceHandle, staging: BufferHandle) {
        match self.resource_info(owner) {
            Ok(info) if info.staging == Some(staging) => {
                if let Err(err) = self.set_staging(owner, None) {
                    log::warn!(
                        "Unable to detach {:?} from {:?}: {}",
                        staging,
                        owner,
                        err
                    );
                }
            }
            _ => (),
        }
    }

    unsafe fn stage_and_write(
        &mut self,
        handle: ResourceHandle,
        data: &[u8],
    ) -> Result<(), ResourceError> {
        if self.resource_info(handle)?.needs_staging {
            self.allocate_staging_resource(handle)?;
        }
        self.write_resource(handle, data)
    }

    fn set_staging(
        &mut self,
        handle: ResourceHandle,
        staging: Option<BufferHandle>,
    ) -> Result<(), ResourceError> {
        match handle {
            ResourceHandle::Buffer(handle) => self
                .buffer_pool_by_id_mut(handle.pool)?
                .set_staging(handle, staging),
            ResourceHandle::Image(handle) => self
                .image_pool_by_id_mut(handle.pool)?
                .set_staging(handle, staging),
        }
    }

    /// Free the staging buffers a destroyed pool left behind and forget any
    /// staging buffers which lived inside it.
    fn release_destroyed_pool(
        &mut self,
        destroyed: PoolId,
        staging: Vec<BufferHandle>,
    ) {
        for handle in staging {
            if let Err(err) = self.free_resource(handle) {
                log::warn!(
                    "Unable to release staging buffer {:?}: {}",
                    handle,
                    err
                );
            }
        }
        for pool in self.buffer_pools.values_mut() {
            pool.forget_staging_in(destroyed);
        }
        for pool in self.image_pools.values_mut() {
            pool.forget_staging_in(destroyed);
        }
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

fn pool_not_found(name: &str) -> ResourceError {
    ResourceError::PoolNotFound(format!("named '{}'", name))
}
