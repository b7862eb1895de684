use super::{align_up, Allocation, AllocatorError, ResourceId, SubAllocator};

/// A linear allocator which hands out the first gap large enough for a
/// request.
///
/// Gaps are examined in address order: the head of the arena, then the
/// space between consecutive live allocations, then the tail. This is not a
/// best-fit search, but placement is fully determined by the sequence of
/// allocate and free calls.
#[derive(Debug, Clone)]
pub struct FirstFitAllocator {
    capacity: u64,
    live: Vec<Allocation>,
    next_id: u64,
}

impl FirstFitAllocator {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            live: vec![],
            next_id: 0,
        }
    }

    /// Find the insertion index into `live` and the offset for a request.
    fn find_placement(&self, size: u64, alignment: u64) -> Option<(usize, u64)> {
        let first = match self.live.first() {
            Some(first) => first,
            None => return (size <= self.capacity).then_some((0, 0)),
        };

        // offset 0 satisfies every alignment
        if first.offset_in_bytes() >= size {
            return Some((0, 0));
        }

        for (index, pair) in self.live.windows(2).enumerate() {
            let candidate = align_up(pair[0].end_in_bytes(), alignment);
            let fits = pair[1]
                .offset_in_bytes()
                .checked_sub(candidate)
                .map_or(false, |gap| gap >= size);
            if fits {
                return Some((index + 1, candidate));
            }
        }

        let last = self.live.last()?;
        let candidate = align_up(last.end_in_bytes(), alignment);
        let fits = self
            .capacity
            .checked_sub(candidate)
            .map_or(false, |remaining| remaining >= size);
        fits.then_some((self.live.len(), candidate))
    }

    fn position_of(&self, allocation: &Allocation) -> Option<usize> {
        self.live
            .iter()
            .position(|live| live.id() == allocation.id())
    }

    fn unknown(allocation: &Allocation) -> AllocatorError {
        AllocatorError::UnknownAllocation {
            id: allocation.id(),
            offset: allocation.offset_in_bytes(),
            size: allocation.size_in_bytes(),
        }
    }
}

impl SubAllocator for FirstFitAllocator {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn allocate(
        &mut self,
        size_in_bytes: u64,
        alignment: u64,
    ) -> Option<Allocation> {
        if size_in_bytes == 0 {
            return None;
        }
        let (index, offset) = self.find_placement(size_in_bytes, alignment)?;
        let allocation = Allocation::new(self.next_id, offset, size_in_bytes);
        self.next_id += 1;
        self.live.insert(index, allocation);
        Some(allocation)
    }

    fn free(&mut self, allocation: &Allocation) -> Result<(), AllocatorError> {
        let index = self
            .position_of(allocation)
            .ok_or_else(|| Self::unknown(allocation))?;
        self.live.remove(index);
        Ok(())
    }

    fn allocations(&self) -> &[Allocation] {
        &self.live
    }

    fn set_owner(
        &mut self,
        allocation: &Allocation,
        owner: ResourceId,
    ) -> Result<(), AllocatorError> {
        let index = self
            .position_of(allocation)
            .ok_or_else(|| Self::unknown(allocation))?;
        self.live[index].set_owner(owner);
        Ok(())
    }

    fn drain(&mut self) -> Vec<Allocation> {
        std::mem::take(&mut self.live)
    }
}
