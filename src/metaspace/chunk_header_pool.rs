use super::chunklevel::ChunkLevel;
use super::metachunk::Metachunk;
use crate::util::Address;
use std::num::NonZeroU32;
use std::ops::{Index, IndexMut};

/// A handle to a chunk header in the [`ChunkHeaderPool`].
///
/// The index is non-zero so that `Option<ChunkIndex>` is as small as the index itself. The start maps
/// of the virtual space nodes store lots of them.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ChunkIndex(NonZeroU32);

impl ChunkIndex {
    fn from_slot(slot: usize) -> Self {
        let raw = u32::try_from(slot + 1)
            .ok()
            .and_then(NonZeroU32::new)
            .unwrap_or_else(|| panic!("too many chunk headers"));
        ChunkIndex(raw)
    }

    fn slot(self) -> usize {
        self.0.get() as usize - 1
    }
}

/// A slab of chunk headers.
///
/// Splitting a chunk creates a header for the new buddy. Merging two buddies retires the header of
/// the follower. Retired slots are recycled.
#[derive(Default)]
pub struct ChunkHeaderPool {
    slots: Vec<Metachunk>,
    free_slots: Vec<ChunkIndex>,
}

impl ChunkHeaderPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a header for a free, uncommitted chunk.
    pub fn allocate_chunk_header(
        &mut self,
        base: Address,
        level: ChunkLevel,
        node: usize,
    ) -> ChunkIndex {
        let header = Metachunk::new(base, level, node);
        if let Some(idx) = self.free_slots.pop() {
            debug_assert!(self.slots[idx.slot()].is_dead());
            self.slots[idx.slot()] = header;
            idx
        } else {
            self.slots.push(header);
            ChunkIndex::from_slot(self.slots.len() - 1)
        }
    }

    /// Retire a header. The index must not be used afterwards.
    pub fn return_chunk_header(&mut self, idx: ChunkIndex) {
        let c = &mut self.slots[idx.slot()];
        assert!(!c.is_dead(), "chunk header returned twice");
        assert!(
            c.prev.is_none() && c.next.is_none(),
            "chunk header still linked"
        );
        c.set_dead();
        self.free_slots.push(idx);
    }

    /// Number of live headers.
    pub fn used(&self) -> usize {
        self.slots.len() - self.free_slots.len()
    }

    /// Number of slots ever created.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterate over all live headers.
    pub fn iter(&self) -> impl Iterator<Item = (ChunkIndex, &Metachunk)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_dead())
            .map(|(i, c)| (ChunkIndex::from_slot(i), c))
    }
}

impl Index<ChunkIndex> for ChunkHeaderPool {
    type Output = Metachunk;

    fn index(&self, idx: ChunkIndex) -> &Metachunk {
        let c = &self.slots[idx.slot()];
        debug_assert!(!c.is_dead(), "access to dead chunk header");
        c
    }
}

impl IndexMut<ChunkIndex> for ChunkHeaderPool {
    fn index_mut(&mut self, idx: ChunkIndex) -> &mut Metachunk {
        let c = &mut self.slots[idx.slot()];
        debug_assert!(!c.is_dead(), "access to dead chunk header");
        c
    }
}
