use std::sync::Arc;

use ash::vk;

use super::*;
use crate::{
    test_device::{Command, FakeDevice, DEVICE_LOCAL_TYPE, HOST_VISIBLE_TYPE},
    vulkan_api::VulkanError,
};

const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw()
        | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

fn manager(alignment: vk::DeviceSize) -> (Arc<FakeDevice>, ResourceManager) {
    let device = Arc::new(FakeDevice::new(alignment));
    let manager = ResourceManager::new(device.clone());
    (device, manager)
}

fn host_pool(manager: &mut ResourceManager, name: &str, size: u64) {
    manager
        .create_buffer_pool(
            name,
            size,
            HOST,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::SharingMode::EXCLUSIVE,
        )
        .unwrap();
}

fn device_pool(manager: &mut ResourceManager, name: &str, size: u64) {
    manager
        .create_buffer_pool(
            name,
            size,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::SharingMode::EXCLUSIVE,
        )
        .unwrap();
}

fn offsets(pool: &BufferPool) -> Vec<(u64, u64)> {
    pool.allocations()
        .iter()
        .map(|a| (a.offset_in_bytes(), a.size_in_bytes()))
        .collect()
}

#[test]
fn only_device_local_memory_without_host_access_needs_staging() {
    use vk::MemoryPropertyFlags as Flags;

    assert!(requires_staging(Flags::DEVICE_LOCAL));
    assert!(!requires_staging(Flags::DEVICE_LOCAL | HOST));
    assert!(!requires_staging(HOST));
    assert!(!requires_staging(Flags::empty()));
}

#[test]
fn device_local_pools_are_transfer_destinations() {
    let (_device, mut manager) = manager(16);
    device_pool(&mut manager, "device", 1024);
    host_pool(&mut manager, "host", 1024);

    let device = manager.buffer_pool("device").unwrap();
    assert!(device.needs_staging());
    assert!(device.usage().contains(vk::BufferUsageFlags::TRANSFER_DST));
    assert_eq!(device.memory().memory_type_index(), DEVICE_LOCAL_TYPE);

    let host = manager.buffer_pool("host").unwrap();
    assert!(!host.needs_staging());
    assert!(!host.usage().contains(vk::BufferUsageFlags::TRANSFER_DST));
    assert_eq!(host.memory().memory_type_index(), HOST_VISIBLE_TYPE);

    let buffer = manager
        .allocate_buffer("device", 32, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();
    assert!(manager
        .buffer(buffer)
        .unwrap()
        .usage()
        .contains(vk::BufferUsageFlags::TRANSFER_DST));
}

#[test]
fn buffers_are_placed_first_fit_at_the_device_alignment() {
    let (_device, mut manager) = manager(256);
    host_pool(&mut manager, "host", 1024);

    let a = manager
        .allocate_buffer("host", 100, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();
    let b = manager
        .allocate_buffer("host", 300, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();
    let pool = manager.buffer_pool("host").unwrap();
    assert_eq!(offsets(pool), vec![(0, 256), (256, 512)]);
    assert_eq!(pool.owner_of(300), Some(b));
    assert_eq!(pool.owner_of(900), None);
    assert_eq!(manager.buffer(a).unwrap().size_in_bytes(), 100);
    assert_eq!(
        manager.buffer(a).unwrap().allocation().owner(),
        Some(a.resource())
    );

    manager.free_resource(a).unwrap();
    manager
        .allocate_buffer("host", 200, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();
    let pool = manager.buffer_pool("host").unwrap();
    assert_eq!(offsets(pool), vec![(0, 256), (256, 512)]);
    assert_eq!(pool.bytes_in_use(), 768);
}

#[test]
fn full_pools_report_insufficient_space() {
    let (device, mut manager) = manager(16);
    host_pool(&mut manager, "host", 512);

    let result =
        manager.allocate_buffer("host", 600, vk::BufferUsageFlags::VERTEX_BUFFER);

    assert!(matches!(
        result,
        Err(ResourceError::InsufficientSpace {
            size: 608,
            capacity: 512,
            ..
        })
    ));
    assert!(manager.buffer_pool("host").unwrap().allocations().is_empty());
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn bind_failures_roll_back_the_allocation() {
    let (device, mut manager) = manager(16);
    host_pool(&mut manager, "host", 512);
    device.fail_next_bind();

    let result =
        manager.allocate_buffer("host", 64, vk::BufferUsageFlags::VERTEX_BUFFER);

    assert!(matches!(
        result,
        Err(ResourceError::Vulkan(VulkanError::UnableToBindBufferMemory(_)))
    ));
    let pool = manager.buffer_pool("host").unwrap();
    assert!(pool.allocations().is_empty());
    assert_eq!(pool.resource_count(), 0);
    assert_eq!(device.live_buffers(), 0);

    manager
        .allocate_buffer("host", 64, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();
    assert_eq!(device.live_buffers(), 1);
}

#[test]
fn image_bind_failures_roll_back_the_allocation() {
    let (device, mut manager) = manager(16);
    manager.create_device_texture_pool("textures", 4096).unwrap();
    device.fail_next_bind();

    let result = manager.allocate_image(
        "textures",
        vk::Extent2D {
            width: 4,
            height: 4,
        },
        vk::Format::R8G8B8A8_UNORM,
        vk::ImageTiling::OPTIMAL,
        vk::ImageUsageFlags::SAMPLED,
    );

    assert!(matches!(
        result,
        Err(ResourceError::Vulkan(VulkanError::UnableToBindImageMemory(_)))
    ));
    assert!(manager
        .image_pool("textures")
        .unwrap()
        .allocations()
        .is_empty());
    assert_eq!(device.live_images(), 0);
}

#[test]
fn resources_must_fit_the_pool_memory_type() {
    let (device, mut manager) = manager(16);
    host_pool(&mut manager, "host", 512);
    device.set_memory_type_bits(0b01);

    let result =
        manager.allocate_buffer("host", 64, vk::BufferUsageFlags::VERTEX_BUFFER);

    assert!(matches!(
        result,
        Err(ResourceError::IncompatibleMemoryType {
            memory_type_index: HOST_VISIBLE_TYPE,
            memory_type_bits: 0b01,
            ..
        })
    ));
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn freeing_a_resource_twice_is_an_error() {
    let (_device, mut manager) = manager(16);
    host_pool(&mut manager, "host", 512);
    let buffer = manager
        .allocate_buffer("host", 64, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();

    manager.free_resource(buffer).unwrap();

    assert!(matches!(
        manager.free_resource(buffer),
        Err(ResourceError::ResourceNotFound(ResourceHandle::Buffer(h))) if h == buffer
    ));
}

#[test]
fn pool_names_are_unique_per_kind() {
    let (_device, mut manager) = manager(16);
    host_pool(&mut manager, "shared", 512);
    manager
        .allocate_buffer("shared", 64, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();

    let result = manager.create_buffer_pool(
        "shared",
        2048,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        vk::BufferUsageFlags::STORAGE_BUFFER,
        vk::SharingMode::EXCLUSIVE,
    );
    assert!(matches!(
        result,
        Err(ResourceError::PoolAlreadyExists(ref name)) if name == "shared"
    ));

    let existing = manager.buffer_pool("shared").unwrap();
    assert_eq!(existing.capacity(), 512);
    assert_eq!(existing.resource_count(), 1);

    manager.create_device_texture_pool("shared", 1024).unwrap();
    assert!(manager.image_pool("shared").is_ok());
}

#[test]
fn host_pools_expose_bytes_once_mapped() {
    let (_device, mut manager) = manager(16);
    host_pool(&mut manager, "host", 512);
    let buffer = manager
        .allocate_buffer("host", 4, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();

    assert!(matches!(
        unsafe { manager.write_resource(buffer, &[1, 2, 3, 4]) },
        Err(ResourceError::MemoryNotMapped(_))
    ));

    manager.buffer_pool_mut("host").unwrap().map().unwrap();
    assert!(matches!(
        manager.buffer_pool_mut("host").unwrap().map(),
        Err(ResourceError::MemoryAlreadyMapped(_))
    ));

    unsafe {
        manager.write_resource(buffer, &[1, 2, 3, 4]).unwrap();
        assert_eq!(manager.bytes(buffer).unwrap(), &[1, 2, 3, 4]);
    }

    manager.buffer_pool_mut("host").unwrap().unmap();
    assert!(!manager.buffer_pool("host").unwrap().is_mapped());
    assert!(matches!(
        unsafe { manager.bytes(buffer) },
        Err(ResourceError::MemoryNotMapped(_))
    ));
}

#[test]
fn writes_larger_than_the_resource_are_rejected() {
    let (_device, mut manager) = manager(16);
    host_pool(&mut manager, "host", 512);
    manager.buffer_pool_mut("host").unwrap().map().unwrap();
    let buffer = manager
        .allocate_buffer("host", 4, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();

    let result = unsafe { manager.write_resource(buffer, &[0; 5]) };

    assert!(matches!(
        result,
        Err(ResourceError::DataTooLarge {
            len: 5,
            capacity: 4
        })
    ));
}

#[test]
fn device_local_pools_cannot_be_mapped() {
    let (_device, mut manager) = manager(16);
    device_pool(&mut manager, "device", 512);

    assert!(matches!(
        manager.buffer_pool_mut("device").unwrap().map(),
        Err(ResourceError::MemoryNotHostVisible(..))
    ));
}

#[test]
fn device_local_resources_are_written_through_staging() {
    let (_device, mut manager) = manager(16);
    device_pool(&mut manager, "device", 512);
    let buffer = manager
        .allocate_buffer("device", 16, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();

    assert!(matches!(
        unsafe { manager.bytes(buffer) },
        Err(ResourceError::RequiresStaging(_))
    ));
    assert!(matches!(
        unsafe { manager.write_resource(buffer, &[1]) },
        Err(ResourceError::NoStagingResource(_))
    ));
    assert!(matches!(
        manager.allocate_staging_resource(buffer),
        Err(ResourceError::StagingPoolMissing)
    ));
}

#[test]
fn host_resources_cannot_be_staged() {
    let (_device, mut manager) = manager(16);
    manager.create_staging_pool(512).unwrap();
    host_pool(&mut manager, "host", 512);
    let buffer = manager
        .allocate_buffer("host", 16, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();

    assert!(matches!(
        manager.allocate_staging_resource(buffer),
        Err(ResourceError::ResourceNotStageable(_, ref pool)) if pool == "host"
    ));
}

#[test]
fn buffer_uploads_copy_staged_bytes_to_the_device() {
    let (device, mut manager) = manager(16);
    manager.create_staging_pool(1024).unwrap().map().unwrap();
    device_pool(&mut manager, "device", 1024);
    let buffer = manager
        .allocate_buffer("device", 8, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();
    let data = [9, 8, 7, 6, 5, 4, 3, 2];

    let staging = manager.allocate_staging_resource(buffer).unwrap();
    assert_eq!(manager.allocate_staging_resource(buffer).unwrap(), staging);
    assert_eq!(manager.staging_resource(buffer).unwrap(), Some(staging));
    assert_eq!(manager.staging_pool().unwrap().resource_count(), 1);

    let (raw_buffer, raw_staging) = unsafe {
        manager.write_resource(buffer, &data).unwrap();
        manager
            .cmd_upload_buffer(vk::CommandBuffer::null(), buffer)
            .unwrap();
        (
            manager.buffer(buffer).unwrap().raw(),
            manager.buffer(staging).unwrap().raw(),
        )
    };

    assert_eq!(
        device.commands(),
        vec![
            Command::CopyBuffer {
                src: raw_staging,
                dst: raw_buffer,
                src_offset: 0,
                dst_offset: 0,
                size: 8,
            },
            Command::BufferBarrier {
                buffer: raw_buffer,
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::MEMORY_READ,
            },
        ]
    );
    assert_eq!(device.buffer_contents(raw_buffer, 8), data);

    manager.free_staging_resource(buffer).unwrap();
    assert_eq!(manager.staging_resource(buffer).unwrap(), None);
    assert_eq!(manager.staging_pool().unwrap().resource_count(), 0);
}

#[test]
fn image_uploads_transition_around_the_copy() {
    let (device, mut manager) = manager(16);
    manager.create_staging_pool(1024).unwrap().map().unwrap();
    manager.create_device_texture_pool("textures", 4096).unwrap();
    let image = manager
        .allocate_image(
            "textures",
            vk::Extent2D {
                width: 2,
                height: 2,
            },
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::SAMPLED,
        )
        .unwrap();
    let pixels: Vec<u8> = (0..16).collect();

    let staging = manager.allocate_staging_resource(image).unwrap();
    let (raw_image, raw_staging) = unsafe {
        manager.write_resource(image, &pixels).unwrap();
        manager
            .cmd_upload_image(vk::CommandBuffer::null(), image)
            .unwrap();
        (
            manager.image(image).unwrap().raw(),
            manager.buffer(staging).unwrap().raw(),
        )
    };

    assert_eq!(
        device.commands(),
        vec![
            Command::ImageBarrier {
                image: raw_image,
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            },
            Command::CopyBufferToImage {
                src: raw_staging,
                dst: raw_image,
                layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                extent: (2, 2),
            },
            Command::ImageBarrier {
                image: raw_image,
                old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
        ]
    );
    assert_eq!(device.image_contents(raw_image, 16), pixels);
}

#[test]
fn only_upload_layout_transitions_are_supported() {
    let (device, mut manager) = manager(16);
    manager.create_device_texture_pool("textures", 4096).unwrap();
    let image = manager
        .allocate_image(
            "textures",
            vk::Extent2D {
                width: 1,
                height: 1,
            },
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::SAMPLED,
        )
        .unwrap();

    let result = unsafe {
        manager.cmd_transition_image_layout(
            vk::CommandBuffer::null(),
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
        )
    };

    assert!(matches!(
        result,
        Err(ResourceError::UnsupportedLayoutTransition(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL
        ))
    ));
    assert!(device.commands().is_empty());
}

#[test]
fn uploads_without_staging_are_rejected() {
    let (device, mut manager) = manager(16);
    device_pool(&mut manager, "device", 512);
    let buffer = manager
        .allocate_buffer("device", 16, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();

    let result =
        unsafe { manager.cmd_upload_buffer(vk::CommandBuffer::null(), buffer) };

    assert!(matches!(result, Err(ResourceError::NoStagingResource(_))));
    assert!(device.commands().is_empty());
}

#[test]
fn freeing_a_resource_releases_its_staging_buffer() {
    let (device, mut manager) = manager(16);
    manager.create_staging_pool(1024).unwrap();
    device_pool(&mut manager, "device", 1024);
    let buffer = manager
        .allocate_buffer("device", 64, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();
    let staging = manager.allocate_staging_resource(buffer).unwrap();
    assert_eq!(device.live_buffers(), 2);

    manager.free_resource(buffer).unwrap();

    assert_eq!(device.live_buffers(), 0);
    assert!(matches!(
        manager.buffer(staging),
        Err(ResourceError::ResourceNotFound(_))
    ));
    assert_eq!(manager.staging_pool().unwrap().bytes_in_use(), 0);
}

#[test]
fn freeing_a_staging_buffer_directly_detaches_it() {
    let (device, mut manager) = manager(16);
    manager.create_staging_pool(1024).unwrap();
    device_pool(&mut manager, "device", 1024);
    let buffer = manager
        .allocate_buffer("device", 64, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();
    let staging = manager.allocate_staging_resource(buffer).unwrap();
    assert_eq!(
        manager.buffer(staging).unwrap().staging_for(),
        Some(ResourceHandle::Buffer(buffer))
    );

    manager.free_resource(staging).unwrap();

    assert_eq!(manager.staging_resource(buffer).unwrap(), None);
    assert!(matches!(
        unsafe { manager.write_resource(buffer, &[1, 2, 3]) },
        Err(ResourceError::NoStagingResource(_))
    ));
    manager.free_resource(buffer).unwrap();
    assert_eq!(device.live_buffers(), 0);
    assert!(matches!(
        manager.free_resource(buffer),
        Err(ResourceError::ResourceNotFound(_))
    ));
}

#[test]
fn failed_frees_leave_the_resource_untouched() {
    let (_device, mut manager) = manager(16);
    manager.create_staging_pool(1024).unwrap();
    device_pool(&mut manager, "device", 1024);
    let buffer = manager
        .allocate_buffer("device", 64, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();
    let staging = manager.allocate_staging_resource(buffer).unwrap();
    let stale = BufferHandle {
        pool: buffer.pool(),
        resource: crate::allocator::ResourceId::new(99),
    };

    assert!(matches!(
        manager.free_resource(stale),
        Err(ResourceError::ResourceNotFound(_))
    ));
    assert_eq!(manager.staging_resource(buffer).unwrap(), Some(staging));
}

#[test]
fn buffers_sized_for_data_are_filled_in_place() {
    let (device, mut manager) = manager(16);
    host_pool(&mut manager, "host", 512);
    manager.buffer_pool_mut("host").unwrap().map().unwrap();

    let buffer = unsafe {
        manager
            .allocate_buffer_for(
                "host",
                &[1, 2, 3, 4, 5],
                vk::BufferUsageFlags::INDEX_BUFFER,
            )
            .unwrap()
    };

    assert_eq!(manager.buffer(buffer).unwrap().size_in_bytes(), 5);
    assert_eq!(manager.staging_resource(buffer).unwrap(), None);
    let raw = unsafe { manager.buffer(buffer).unwrap().raw() };
    assert_eq!(device.buffer_contents(raw, 5), vec![1, 2, 3, 4, 5]);
}

#[test]
fn buffers_sized_for_data_are_staged_when_needed() {
    let (device, mut manager) = manager(16);
    manager.create_staging_pool(1024).unwrap().map().unwrap();
    device_pool(&mut manager, "device", 1024);

    let buffer = unsafe {
        manager
            .allocate_buffer_for(
                "device",
                &[9; 24],
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )
            .unwrap()
    };

    let staging = manager.staging_resource(buffer).unwrap().unwrap();
    let raw = unsafe { manager.buffer(staging).unwrap().raw() };
    assert_eq!(device.buffer_contents(raw, 24), vec![9; 24]);
    assert_eq!(manager.buffer(buffer).unwrap().size_in_bytes(), 24);
}

#[test]
fn buffers_sized_for_data_are_released_when_the_write_fails() {
    let (device, mut manager) = manager(16);
    device_pool(&mut manager, "device", 1024);

    let result = unsafe {
        manager.allocate_buffer_for(
            "device",
            &[9; 24],
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )
    };

    assert!(matches!(result, Err(ResourceError::StagingPoolMissing)));
    assert_eq!(manager.buffer_pool("device").unwrap().resource_count(), 0);
    assert_eq!(manager.buffer_pool("device").unwrap().bytes_in_use(), 0);
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn destroying_a_pool_releases_its_staging_buffers() {
    let (device, mut manager) = manager(16);
    manager.create_staging_pool(1024).unwrap();
    device_pool(&mut manager, "device", 1024);
    let buffer = manager
        .allocate_buffer("device", 64, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();
    manager.allocate_staging_resource(buffer).unwrap();
    assert_eq!(device.live_memory_blocks(), 2);

    manager.destroy_buffer_pool("device").unwrap();

    assert_eq!(device.live_memory_blocks(), 1);
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(manager.staging_pool().unwrap().resource_count(), 0);
    assert!(matches!(
        manager.buffer(buffer),
        Err(ResourceError::PoolNotFound(_))
    ));
    assert!(matches!(
        manager.destroy_buffer_pool("device"),
        Err(ResourceError::PoolNotFound(_))
    ));
}

#[test]
fn destroying_the_staging_pool_forgets_staging_buffers() {
    let (device, mut manager) = manager(16);
    manager.create_staging_pool(1024).unwrap().map().unwrap();
    device_pool(&mut manager, "device", 1024);
    let buffer = manager
        .allocate_buffer("device", 64, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();
    manager.allocate_staging_resource(buffer).unwrap();

    manager.destroy_buffer_pool(STAGING_POOL_NAME).unwrap();

    assert!(!manager.has_staging_pool());
    assert_eq!(device.mapped_memory_blocks(), 0);
    assert_eq!(manager.staging_resource(buffer).unwrap(), None);
    manager.free_resource(buffer).unwrap();
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn dropping_the_manager_destroys_every_pool() {
    let (device, mut manager) = manager(16);
    manager.create_staging_pool(1024).unwrap().map().unwrap();
    device_pool(&mut manager, "device", 1024);
    host_pool(&mut manager, "host", 1024);
    manager.create_device_texture_pool("textures", 4096).unwrap();
    let buffer = manager
        .allocate_buffer("device", 64, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();
    manager.allocate_staging_resource(buffer).unwrap();
    manager
        .allocate_buffer("host", 64, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();
    manager
        .allocate_image(
            "textures",
            vk::Extent2D {
                width: 8,
                height: 8,
            },
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::SAMPLED,
        )
        .unwrap();
    manager.log_details();

    drop(manager);

    assert_eq!(device.live_memory_blocks(), 0);
    assert_eq!(device.mapped_memory_blocks(), 0);
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.live_images(), 0);
}

#[test]
fn flushing_host_coherent_memory_skips_the_device() {
    let (device, mut manager) = manager(16);
    host_pool(&mut manager, "host", 512);
    let buffer = manager
        .allocate_buffer("host", 64, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();
    let pool = manager.buffer_pool_mut("host").unwrap();

    assert!(matches!(
        pool.flush(buffer),
        Err(ResourceError::MemoryNotMapped(_))
    ));
    pool.map().unwrap();
    pool.flush(buffer).unwrap();
    assert!(device.flushed_ranges().is_empty());

    let range = pool.mapped_memory_range(buffer).unwrap();
    assert_eq!(range.offset, 0);
    assert_eq!(range.size, 64);
}

#[test]
fn flushing_non_coherent_memory_reaches_the_device() {
    let (device, mut manager) = manager(16);
    let pool = manager
        .create_buffer_pool(
            "cached",
            512,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::SharingMode::EXCLUSIVE,
        )
        .unwrap();
    let buffer = pool
        .allocate_buffer(32, vk::BufferUsageFlags::UNIFORM_BUFFER)
        .unwrap();
    pool.map().unwrap();

    pool.flush(buffer).unwrap();

    assert_eq!(device.flushed_ranges(), vec![(0, 32)]);
}

#[test]
fn flushed_ranges_cover_whole_non_coherent_atoms() {
    let (device, mut manager) = manager(16);
    device.set_non_coherent_atom_size(64);
    let pool = manager
        .create_buffer_pool(
            "cached",
            180,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::SharingMode::EXCLUSIVE,
        )
        .unwrap();
    let a = pool
        .allocate_buffer(32, vk::BufferUsageFlags::UNIFORM_BUFFER)
        .unwrap();
    let b = pool
        .allocate_buffer(32, vk::BufferUsageFlags::UNIFORM_BUFFER)
        .unwrap();
    let c = pool
        .allocate_buffer(100, vk::BufferUsageFlags::UNIFORM_BUFFER)
        .unwrap();
    assert_eq!(offsets(pool), vec![(0, 32), (32, 32), (64, 112)]);
    pool.map().unwrap();

    pool.flush(a).unwrap();
    pool.flush(b).unwrap();
    pool.flush(c).unwrap();

    // the last range runs to the end of the 180 byte block
    assert_eq!(
        device.flushed_ranges(),
        vec![(0, 64), (0, 64), (64, 116)]
    );
}

#[test]
fn handles_from_other_pools_are_not_found() {
    let (_device, mut manager) = manager(16);
    host_pool(&mut manager, "a", 512);
    host_pool(&mut manager, "b", 512);
    let buffer = manager
        .allocate_buffer("a", 64, vk::BufferUsageFlags::VERTEX_BUFFER)
        .unwrap();

    assert!(matches!(
        manager.buffer_pool("b").unwrap().buffer(buffer),
        Err(ResourceError::ResourceNotFound(_))
    ));
}
