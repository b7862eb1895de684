use std::fmt;

/// Identifies one allocation for the lifetime of its allocator. Ids are
/// never reused, so two allocations with the same range are still distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocationId(u64);

/// A stable index for a resource owned by a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A sub-range of an arena handed out by a [super::SubAllocator].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    id: AllocationId,
    offset_in_bytes: u64,
    size_in_bytes: u64,
    owner: Option<ResourceId>,
}

// public api
impl Allocation {
    pub fn id(&self) -> AllocationId {
        self.id
    }

    /// The allocation's offset from the front of the arena.
    pub fn offset_in_bytes(&self) -> u64 {
        self.offset_in_bytes
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.size_in_bytes
    }

    /// One past the last byte of the allocation.
    pub fn end_in_bytes(&self) -> u64 {
        self.offset_in_bytes + self.size_in_bytes
    }

    /// The resource bound to this range, if it has been recorded.
    pub fn owner(&self) -> Option<ResourceId> {
        self.owner
    }

    /// True when `offset` falls inside `[offset, offset + size)`.
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.offset_in_bytes && offset < self.end_in_bytes()
    }

    /// True when the two ranges share at least one byte.
    pub fn overlaps(&self, other: &Allocation) -> bool {
        self.offset_in_bytes < other.end_in_bytes()
            && other.offset_in_bytes < self.end_in_bytes()
    }
}

// internal api
impl Allocation {
    pub(super) fn new(raw_id: u64, offset_in_bytes: u64, size: u64) -> Self {
        Self {
            id: AllocationId(raw_id),
            offset_in_bytes,
            size_in_bytes: size,
            owner: None,
        }
    }

    pub(super) fn set_owner(&mut self, owner: ResourceId) {
        self.owner = Some(owner);
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{offset: {}, size: {}, owner: ",
            self.offset_in_bytes, self.size_in_bytes
        )?;
        match self.owner {
            Some(owner) => write!(f, "{}}}", owner.raw()),
            None => f.write_str("none}"),
        }
    }
}
