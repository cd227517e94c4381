//! Entity identifiers and the monotonic allocator that hands them out.
//!
//! An entity carries no attributes of its own: presence is defined
//! entirely by having at least one component attached in a [`crate::store::ComponentStore`].

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// An opaque, process-unique-within-its-container entity identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    /// The raw numeric value, exposed for ordering/indexing in snapshots.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// A contiguous, disjoint range of entity ids reserved for one match.
///
/// Matches own a disjoint entity-id subrange allocated by their container
///. `contains` is used to enforce the invariant that a
/// command for match M may only reference entities owned by M.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRange {
    start: u64,
    end: u64,
}

impl EntityRange {
    /// True if `id` falls within this reserved range.
    #[must_use]
    pub const fn contains(self, id: EntityId) -> bool {
        id.0 >= self.start && id.0 < self.end
    }

    /// The number of ids this range can hand out.
    #[must_use]
    pub const fn capacity(self) -> u64 {
        self.end - self.start
    }

    /// The range as a plain `Range<u64>`, for iteration in tests/tools.
    #[must_use]
    pub const fn as_u64_range(self) -> Range<u64> {
        self.start..self.end
    }
}

/// Monotonic, process-wide-per-container entity id allocator.
///
/// Matches reserve a subrange up front (`reserve_range`); within that
/// subrange, entities are allocated one at a time (`alloc_in`). Because a
/// single container owns exactly one allocator and is the sole writer to it
///, no internal synchronization is required here — callers are
/// expected to hold whatever lock/actor discipline the container imposes.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    next: u64,
}

impl EntityAllocator {
    /// Create a fresh allocator starting at id 0.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Reserve `size` consecutive ids as a new disjoint range.
    pub fn reserve_range(&mut self, size: u64) -> EntityRange {
        let start = self.next;
        let end = start.saturating_add(size);
        self.next = end;
        EntityRange { start, end }
    }
}

/// A cursor that allocates individual entity ids from within a match's
/// reserved [`EntityRange`], failing once the range is exhausted.
#[derive(Debug, Clone, Copy)]
pub struct RangeCursor {
    range: EntityRange,
    cursor: u64,
}

impl RangeCursor {
    /// Start a new cursor at the beginning of `range`.
    #[must_use]
    pub const fn new(range: EntityRange) -> Self {
        Self {
            range,
            cursor: range.start,
        }
    }

    /// Allocate the next entity id in the range, or `None` if exhausted.
    pub fn alloc(&mut self) -> Option<EntityId> {
        if self.cursor >= self.range.end {
            return None;
        }
        let id = EntityId(self.cursor);
        self.cursor += 1;
        Some(id)
    }

    /// The owning range, for containment checks.
    #[must_use]
    pub const fn range(self) -> EntityRange {
        self.range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_disjoint_and_consecutive() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.reserve_range(10);
        let b = alloc.reserve_range(5);
        assert_eq!(a.as_u64_range(), 0..10);
        assert_eq!(b.as_u64_range(), 10..15);
        assert!(!a.contains(EntityId(10)));
        assert!(b.contains(EntityId(10)));
    }

    #[test]
    fn cursor_exhausts_at_range_end() {
        let mut alloc = EntityAllocator::new();
        let range = alloc.reserve_range(2);
        let mut cursor = RangeCursor::new(range);
        assert_eq!(cursor.alloc(), Some(EntityId(0)));
        assert_eq!(cursor.alloc(), Some(EntityId(1)));
        assert_eq!(cursor.alloc(), None);
    }
}
