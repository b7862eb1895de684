//! An in-memory [ResourceDevice] for tests which can't rely on a GPU.
//!
//! Device memory is a host `Vec<u8>`, handles are counters, and recorded
//! copy commands execute immediately so tests can follow bytes through an
//! upload.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    ffi::c_void,
};

use ash::vk::{self, Handle};

use crate::{
    allocator::align_up,
    vulkan_api::{ResourceDevice, VulkanError},
};

pub const DEVICE_LOCAL_TYPE: u32 = 0;
pub const HOST_VISIBLE_TYPE: u32 = 1;

/// A command recorded into any command buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        src_offset: vk::DeviceSize,
        dst_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        layout: vk::ImageLayout,
        extent: (u32, u32),
    },
    BufferBarrier {
        buffer: vk::Buffer,
        src_access: vk::AccessFlags,
        dst_access: vk::AccessFlags,
    },
    ImageBarrier {
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    },
}

#[derive(Default)]
struct State {
    next_handle: u64,
    memory: HashMap<u64, Vec<u8>>,
    mapped: HashSet<u64>,
    buffers: HashMap<u64, vk::DeviceSize>,
    images: HashMap<u64, vk::DeviceSize>,
    bindings: HashMap<u64, (u64, vk::DeviceSize)>,
    commands: Vec<Command>,
    flushed_ranges: Vec<(vk::DeviceSize, vk::DeviceSize)>,
    non_coherent_atom_size: vk::DeviceSize,
    fail_next_bind: bool,
    memory_type_bits: u32,
}

impl State {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn bound_range(
        &self,
        resource: u64,
        len: vk::DeviceSize,
    ) -> (u64, std::ops::Range<usize>) {
        let (memory, offset) = self.bindings[&resource];
        (memory, offset as usize..(offset + len) as usize)
    }
}

pub struct FakeDevice {
    alignment: vk::DeviceSize,
    memory_types: [vk::MemoryPropertyFlags; 2],
    state: RefCell<State>,
}

impl FakeDevice {
    /// Every resource created by this device needs `alignment` aligned
    /// memory. Type 0 is device local, type 1 is host visible and coherent.
    pub fn new(alignment: vk::DeviceSize) -> Self {
        Self {
            alignment,
            memory_types: [
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
                vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT,
            ],
            state: RefCell::new(State {
                memory_type_bits: 0b11,
                non_coherent_atom_size: 1,
                ..Default::default()
            }),
        }
    }

    /// Make the next bind call fail.
    pub fn fail_next_bind(&self) {
        self.state.borrow_mut().fail_next_bind = true;
    }

    /// Restrict the memory types that resources created from now on can be
    /// bound to.
    pub fn set_memory_type_bits(&self, memory_type_bits: u32) {
        self.state.borrow_mut().memory_type_bits = memory_type_bits;
    }

    pub fn set_non_coherent_atom_size(&self, atom_size: vk::DeviceSize) {
        self.state.borrow_mut().non_coherent_atom_size = atom_size;
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn live_images(&self) -> usize {
        self.state.borrow().images.len()
    }

    pub fn live_memory_blocks(&self) -> usize {
        self.state.borrow().memory.len()
    }

    pub fn mapped_memory_blocks(&self) -> usize {
        self.state.borrow().mapped.len()
    }

    /// `(offset, size)` of every flushed range in order.
    pub fn flushed_ranges(&self) -> Vec<(vk::DeviceSize, vk::DeviceSize)> {
        self.state.borrow().flushed_ranges.clone()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.borrow().commands.clone()
    }

    /// Read the first `len` bytes of the memory bound to a buffer.
    pub fn buffer_contents(
        &self,
        buffer: vk::Buffer,
        len: vk::DeviceSize,
    ) -> Vec<u8> {
        let state = self.state.borrow();
        let (memory, range) = state.bound_range(buffer.as_raw(), len);
        state.memory[&memory][range].to_vec()
    }

    pub fn image_contents(
        &self,
        image: vk::Image,
        len: vk::DeviceSize,
    ) -> Vec<u8> {
        let state = self.state.borrow();
        let (memory, range) = state.bound_range(image.as_raw(), len);
        state.memory[&memory][range].to_vec()
    }

    fn requirements(&self, size: vk::DeviceSize) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: align_up(size, self.alignment),
            alignment: self.alignment,
            memory_type_bits: self.state.borrow().memory_type_bits,
        }
    }

    fn bind(
        &self,
        resource: u64,
        size: vk::DeviceSize,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<(), vk::Result> {
        let mut state = self.state.borrow_mut();
        if std::mem::take(&mut state.fail_next_bind) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let block_size = state.memory[&memory.as_raw()].len() as u64;
        assert!(offset % self.alignment == 0, "misaligned bind at {offset}");
        assert!(offset + size <= block_size, "bind past the end of memory");
        state.bindings.insert(resource, (memory.as_raw(), offset));
        Ok(())
    }
}

impl ResourceDevice for FakeDevice {
    fn find_memory_type_index(
        &self,
        memory_type_bits: u32,
        property_flags: vk::MemoryPropertyFlags,
    ) -> Result<u32, VulkanError> {
        self.memory_types
            .iter()
            .enumerate()
            .find(|(i, flags)| {
                memory_type_bits & (1 << i) != 0
                    && flags.contains(property_flags)
            })
            .map(|(i, _)| i as u32)
            .ok_or(VulkanError::MemoryTypeNotFound(
                property_flags,
                memory_type_bits,
            ))
    }

    fn non_coherent_atom_size(&self) -> vk::DeviceSize {
        self.state.borrow().non_coherent_atom_size
    }

    unsafe fn allocate_memory(
        &self,
        allocate_info: &vk::MemoryAllocateInfo,
    ) -> Result<vk::DeviceMemory, VulkanError> {
        let mut state = self.state.borrow_mut();
        let handle = state.next_handle();
        state
            .memory
            .insert(handle, vec![0; allocate_info.allocation_size as usize]);
        Ok(vk::DeviceMemory::from_raw(handle))
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state.borrow_mut();
        assert!(!state.mapped.contains(&memory.as_raw()));
        state.memory.remove(&memory.as_raw());
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        _size: vk::DeviceSize,
    ) -> Result<*mut c_void, VulkanError> {
        let mut state = self.state.borrow_mut();
        assert!(state.mapped.insert(memory.as_raw()), "mapped twice");
        let block = state
            .memory
            .get_mut(&memory.as_raw())
            .expect("mapping freed memory");
        Ok(block.as_mut_ptr().add(offset as usize) as *mut c_void)
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        assert!(self.state.borrow_mut().mapped.remove(&memory.as_raw()));
    }

    unsafe fn flush_mapped_memory_ranges(
        &self,
        ranges: &[vk::MappedMemoryRange],
    ) -> Result<(), VulkanError> {
        self.state
            .borrow_mut()
            .flushed_ranges
            .extend(ranges.iter().map(|range| (range.offset, range.size)));
        Ok(())
    }

    unsafe fn create_buffer(
        &self,
        create_info: &vk::BufferCreateInfo,
    ) -> Result<vk::Buffer, VulkanError> {
        let mut state = self.state.borrow_mut();
        let handle = state.next_handle();
        state.buffers.insert(handle, create_info.size);
        Ok(vk::Buffer::from_raw(handle))
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.state.borrow_mut();
        assert!(state.buffers.remove(&buffer.as_raw()).is_some());
        state.bindings.remove(&buffer.as_raw());
    }

    unsafe fn get_buffer_memory_requirements(
        &self,
        buffer: vk::Buffer,
    ) -> vk::MemoryRequirements {
        let size = self.state.borrow().buffers[&buffer.as_raw()];
        self.requirements(size)
    }

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<(), VulkanError> {
        let size = self.state.borrow().buffers[&buffer.as_raw()];
        self.bind(buffer.as_raw(), size, memory, offset)
            .map_err(VulkanError::UnableToBindBufferMemory)
    }

    unsafe fn create_image(
        &self,
        create_info: &vk::ImageCreateInfo,
    ) -> Result<vk::Image, VulkanError> {
        let mut state = self.state.borrow_mut();
        let handle = state.next_handle();
        let extent = create_info.extent;
        let size = extent.width as u64 * extent.height as u64 * 4;
        state.images.insert(handle, size);
        Ok(vk::Image::from_raw(handle))
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        let mut state = self.state.borrow_mut();
        assert!(state.images.remove(&image.as_raw()).is_some());
        state.bindings.remove(&image.as_raw());
    }

    unsafe fn get_image_memory_requirements(
        &self,
        image: vk::Image,
    ) -> vk::MemoryRequirements {
        let size = self.state.borrow().images[&image.as_raw()];
        self.requirements(size)
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> Result<(), VulkanError> {
        let size = self.state.borrow().images[&image.as_raw()];
        self.bind(image.as_raw(), size, memory, offset)
            .map_err(VulkanError::UnableToBindImageMemory)
    }

    unsafe fn cmd_copy_buffer(
        &self,
        _command_buffer: vk::CommandBuffer,
        src_buffer: vk::Buffer,
        dst_buffer: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        let mut state = self.state.borrow_mut();
        for region in regions {
            let (src_memory, src) =
                state.bound_range(src_buffer.as_raw(), region.size);
            let (dst_memory, dst) =
                state.bound_range(dst_buffer.as_raw(), region.size);
            let src = src.start + region.src_offset as usize
                ..src.end + region.src_offset as usize;
            let dst = dst.start + region.dst_offset as usize
                ..dst.end + region.dst_offset as usize;
            let bytes = state.memory[&src_memory][src].to_vec();
            state.memory.get_mut(&dst_memory).unwrap()[dst]
                .copy_from_slice(&bytes);
            state.commands.push(Command::CopyBuffer {
                src: src_buffer,
                dst: dst_buffer,
                src_offset: region.src_offset,
                dst_offset: region.dst_offset,
                size: region.size,
            });
        }
    }

    unsafe fn cmd_copy_buffer_to_image(
        &self,
        _command_buffer: vk::CommandBuffer,
        src_buffer: vk::Buffer,
        dst_image: vk::Image,
        dst_image_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        let mut state = self.state.borrow_mut();
        for region in regions {
            let extent = region.image_extent;
            let len = extent.width as u64 * extent.height as u64 * 4;
            let (src_memory, src) =
                state.bound_range(src_buffer.as_raw(), len);
            let (dst_memory, dst) = state.bound_range(dst_image.as_raw(), len);
            let bytes = state.memory[&src_memory][src].to_vec();
            state.memory.get_mut(&dst_memory).unwrap()[dst]
                .copy_from_slice(&bytes);
            state.commands.push(Command::CopyBufferToImage {
                src: src_buffer,
                dst: dst_image,
                layout: dst_image_layout,
                extent: (extent.width, extent.height),
            });
        }
    }

    unsafe fn cmd_pipeline_barrier(
        &self,
        _command_buffer: vk::CommandBuffer,
        _src_stage_mask: vk::PipelineStageFlags,
        _dst_stage_mask: vk::PipelineStageFlags,
        buffer_memory_barriers: &[vk::BufferMemoryBarrier],
        image_memory_barriers: &[vk::ImageMemoryBarrier],
    ) {
        let mut state = self.state.borrow_mut();
        for barrier in buffer_memory_barriers {
            state.commands.push(Command::BufferBarrier {
                buffer: barrier.buffer,
                src_access: barrier.src_access_mask,
                dst_access: barrier.dst_access_mask,
            });
        }
        for barrier in image_memory_barriers {
            state.commands.push(Command::ImageBarrier {
                image: barrier.image,
                old_layout: barrier.old_layout,
                new_layout: barrier.new_layout,
            });
        }
    }
}
