use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use ccthw_resource_pools::{
    logging,
    resources::{ResourceManager, STAGING_POOL_NAME},
    vulkan_api::RenderDevice,
};

const TRIANGLE: [[f32; 2]; 3] = [[0.0, -0.5], [0.5, 0.5], [-0.5, 0.5]];
const INDICES: [u16; 3] = [0, 1, 2];

fn as_bytes<T: Copy>(data: &[T]) -> &[u8] {
    // safe because the slice is plain old data and the byte view has the
    // same lifetime
    unsafe {
        std::slice::from_raw_parts(
            data.as_ptr() as *const u8,
            std::mem::size_of_val(data),
        )
    }
}

fn main() -> Result<()> {
    let _logger = logging::setup()?;

    let render_device = Arc::new(
        RenderDevice::new().context("Unable to create a render device")?,
    );
    let mut manager = ResourceManager::new(render_device.clone());

    manager.create_staging_pool(1024 * 1024)?.map()?;
    manager
        .create_host_vertex_and_index_pool("host", 64 * 1024)?
        .map()?;
    manager.create_buffer_pool(
        "device",
        1024 * 1024,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
        vk::BufferUsageFlags::VERTEX_BUFFER,
        vk::SharingMode::EXCLUSIVE,
    )?;
    manager.create_device_texture_pool("textures", 4 * 1024 * 1024)?;

    // host visible indices are written in place
    let indices = unsafe {
        manager.allocate_buffer_for(
            "host",
            as_bytes(&INDICES),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?
    };

    // device-local data goes through the staging pool
    let vertices = manager.allocate_buffer(
        "device",
        std::mem::size_of_val(&TRIANGLE) as u64,
        vk::BufferUsageFlags::VERTEX_BUFFER,
    )?;
    manager.allocate_staging_resource(vertices)?;
    unsafe { manager.write_resource(vertices, as_bytes(&TRIANGLE))? };

    let checkerboard: Vec<u8> = (0..16 * 16)
        .flat_map(|i| {
            let on = (i % 16 / 4 + i / 16 / 4) % 2 == 0;
            if on {
                [255, 255, 255, 255]
            } else {
                [0, 0, 0, 255]
            }
        })
        .collect();
    let texture = manager.allocate_image(
        "textures",
        vk::Extent2D {
            width: 16,
            height: 16,
        },
        vk::Format::R8G8B8A8_UNORM,
        vk::ImageTiling::OPTIMAL,
        vk::ImageUsageFlags::SAMPLED,
    )?;
    manager.allocate_staging_resource(texture)?;
    unsafe { manager.write_resource(texture, &checkerboard)? };

    log::info!(
        "Staging pool '{}' holds {} bytes before the upload",
        STAGING_POOL_NAME,
        manager.staging_pool()?.bytes_in_use()
    );
    manager.log_details();

    unsafe {
        let command_pool = render_device
            .create_command_pool(vk::CommandPoolCreateFlags::TRANSIENT)?;
        let command_pool = scopeguard::guard(command_pool, |pool| {
            render_device.destroy_command_pool(pool)
        });
        let command_buffer =
            render_device.allocate_command_buffer(*command_pool)?;

        render_device.begin_one_time_submit(command_buffer)?;
        manager.cmd_upload_buffer(command_buffer, vertices)?;
        manager.cmd_upload_image(command_buffer, texture)?;
        render_device.end_command_buffer(command_buffer)?;
        render_device.submit_and_wait(command_buffer)?;
    }

    manager.free_staging_resource(vertices)?;
    manager.free_staging_resource(texture)?;
    log::info!("Upload finished, staging buffers released");
    manager.log_details();

    manager.free_resource(vertices)?;
    manager.free_resource(texture)?;
    manager.free_resource(indices)?;
    manager.destroy_all();

    Ok(())
}
