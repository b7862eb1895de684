//! Bookkeeping for sub-allocating ranges out of a fixed-size arena.
//!
//! Nothing in this module touches the GPU. An allocator only decides where
//! a request of `size` bytes fits inside `[0, capacity)` and remembers which
//! ranges are currently in use.

mod allocation;
mod first_fit;

use thiserror::Error;

pub use self::{
    allocation::{Allocation, AllocationId, ResourceId},
    first_fit::FirstFitAllocator,
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorError {
    #[error(
        "Allocation {:?} (offset {}, {} bytes) is not live in this allocator",
        .id,
        .offset,
        .size
    )]
    UnknownAllocation {
        id: AllocationId,
        offset: u64,
        size: u64,
    },
}

/// The interface for arena sub-allocation strategies.
///
/// Implementations are pure bookkeeping: they never allocate device memory
/// and never log.
pub trait SubAllocator {
    /// The total number of bytes this allocator hands out ranges from.
    fn capacity(&self) -> u64;

    /// Find a range of `size_in_bytes` whose offset is a multiple of
    /// `alignment`.
    ///
    /// Returns None when no range fits. An arena never grows, so the caller
    /// decides how to recover.
    fn allocate(
        &mut self,
        size_in_bytes: u64,
        alignment: u64,
    ) -> Option<Allocation>;

    /// Return an allocation's range to the arena.
    fn free(&mut self, allocation: &Allocation) -> Result<(), AllocatorError>;

    /// Every live allocation, sorted by offset.
    fn allocations(&self) -> &[Allocation];

    /// Record which resource owns a live allocation.
    fn set_owner(
        &mut self,
        allocation: &Allocation,
        owner: ResourceId,
    ) -> Result<(), AllocatorError>;

    /// Remove every live allocation at once and hand them back to the
    /// caller.
    fn drain(&mut self) -> Vec<Allocation>;

    /// The resource which owns the byte at `offset`, if any.
    fn owner_of(&self, offset: u64) -> Option<ResourceId> {
        self.allocations()
            .iter()
            .find(|allocation| allocation.contains(offset))
            .and_then(Allocation::owner)
    }

    /// The number of bytes currently claimed by live allocations.
    fn bytes_in_use(&self) -> u64 {
        self.allocations().iter().map(Allocation::size_in_bytes).sum()
    }
}

impl SubAllocator for Box<dyn SubAllocator> {
    fn capacity(&self) -> u64 {
        self.as_ref().capacity()
    }

    fn allocate(
        &mut self,
        size_in_bytes: u64,
        alignment: u64,
    ) -> Option<Allocation> {
        self.as_mut().allocate(size_in_bytes, alignment)
    }

    fn free(&mut self, allocation: &Allocation) -> Result<(), AllocatorError> {
        self.as_mut().free(allocation)
    }

    fn allocations(&self) -> &[Allocation] {
        self.as_ref().allocations()
    }

    fn set_owner(
        &mut self,
        allocation: &Allocation,
        owner: ResourceId,
    ) -> Result<(), AllocatorError> {
        self.as_mut().set_owner(allocation, owner)
    }

    fn drain(&mut self) -> Vec<Allocation> {
        self.as_mut().drain()
    }
}

/// Selects the sub-allocation strategy used by newly created pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocatorKind {
    /// Take the first gap that fits: head, then interior gaps by ascending
    /// offset, then tail.
    #[default]
    FirstFit,
}

impl AllocatorKind {
    /// Build an empty allocator of this kind over `[0, capacity)`.
    pub fn create(self, capacity: u64) -> Box<dyn SubAllocator> {
        match self {
            AllocatorKind::FirstFit => {
                Box::new(FirstFitAllocator::new(capacity))
            }
        }
    }
}

/// Round `offset` up to the next multiple of `alignment`.
///
/// An alignment of 0 is treated as 1.
pub fn align_up(offset: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    let remainder = offset % alignment;
    if remainder == 0 {
        offset
    } else {
        offset + (alignment - remainder)
    }
}
