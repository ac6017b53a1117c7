//! The buddy geometry of one root chunk.
//!
//! A root chunk area covers the address range of one root chunk. It knows which chunk starts at which
//! address (its start map, one slot per smallest chunk), and it splits and merges the chunks in its range.
//! Buddy relations are never stored: the buddy of a chunk is found from its base and level, and looked up
//! in the start map.

use super::chunk_header_pool::{ChunkHeaderPool, ChunkIndex};
use super::chunklevel::*;
use super::free_chunk_list::FreeChunkListVector;
use crate::util::Address;

pub struct RootChunkArea {
    base: Address,
    starts: Box<[Option<ChunkIndex>]>,
}

const NUM_START_SLOTS: usize = MAX_CHUNK_BYTE_SIZE / MIN_CHUNK_BYTE_SIZE;

impl RootChunkArea {
    /// Create the area for the root chunk at `base`, together with the header of the (free, uncommitted) root chunk.
    pub fn new(pool: &mut ChunkHeaderPool, base: Address, node: usize) -> (Self, ChunkIndex) {
        debug_assert!(base.is_aligned_to(MAX_CHUNK_BYTE_SIZE));
        let mut area = RootChunkArea {
            base,
            starts: vec![None; NUM_START_SLOTS].into_boxed_slice(),
        };
        let root = pool.allocate_chunk_header(base, ROOT_CHUNK_LEVEL, node);
        area.starts[0] = Some(root);
        (area, root)
    }

    pub fn base(&self) -> Address {
        self.base
    }

    pub fn end(&self) -> Address {
        self.base + MAX_CHUNK_BYTE_SIZE
    }

    fn slot(&self, addr: Address) -> usize {
        debug_assert!(addr.is_in_range(self.base, self.end()));
        debug_assert!(addr.is_aligned_to(MIN_CHUNK_BYTE_SIZE));
        (addr - self.base) / MIN_CHUNK_BYTE_SIZE
    }

    /// The chunk starting exactly at `addr`, if there is one.
    pub fn chunk_at(&self, addr: Address) -> Option<ChunkIndex> {
        self.starts[self.slot(addr)]
    }

    /// Whether the area consists of a single free root chunk.
    pub fn is_free(&self, pool: &ChunkHeaderPool) -> bool {
        self.starts[0].is_some_and(|c| pool[c].is_root_chunk() && pool[c].is_free())
    }

    /// Split the free chunk `c` until it has `target_level`. `c` keeps its base address; the splinters
    /// (the followers split off on the way) are added to the free lists.
    ///
    /// The committed words are handed down with the address range: the leader gets the committed prefix up to its
    /// size, the splinter gets the rest.
    pub fn split(
        &mut self,
        pool: &mut ChunkHeaderPool,
        free_lists: &mut FreeChunkListVector,
        c: ChunkIndex,
        target_level: ChunkLevel,
    ) {
        assert!(pool[c].is_free(), "only free chunks can be split: {}", pool[c]);
        assert!(
            target_level > pool[c].level(),
            "cannot split {} to level {}",
            pool[c],
            target_level
        );
        check_valid_level(target_level);

        let orig = pool[c].to_string();
        while pool[c].level() < target_level {
            let new_level = pool[c].level() + 1;
            let half_words = word_size_for_level(new_level);
            let committed = pool[c].committed_words();
            let splinter_base = pool[c].base() + byte_size_for_level(new_level);

            let splinter = pool.allocate_chunk_header(splinter_base, new_level, pool[c].node());
            pool[splinter].set_committed_words(committed.saturating_sub(half_words));
            pool[c].set_level(new_level);
            pool[c].set_committed_words(committed.min(half_words));

            let slot = self.slot(splinter_base);
            debug_assert!(self.starts[slot].is_none());
            self.starts[slot] = Some(splinter);
            free_lists.add(pool, splinter);
        }
        trace!("Split {} into {}", orig, pool[c]);
    }

    /// Merge the pair `leader`/`follower` into the leader. The follower header is retired.
    fn merge_pair(&mut self, pool: &mut ChunkHeaderPool, leader: ChunkIndex, follower: ChunkIndex) {
        debug_assert!(pool[leader].is_leader());
        debug_assert_eq!(pool[leader].level(), pool[follower].level());
        debug_assert_eq!(pool[leader].buddy_base(), pool[follower].base());

        // Committed memory is a prefix, so the follower's committed words only count if the leader is
        // fully committed.
        let committed = if pool[leader].is_fully_committed() {
            pool[leader].word_size() + pool[follower].committed_words()
        } else {
            pool[leader].committed_words()
        };
        let new_level = pool[leader].level() - 1;

        let slot = self.slot(pool[follower].base());
        self.starts[slot] = None;
        pool.return_chunk_header(follower);

        pool[leader].set_level(new_level);
        pool[leader].set_committed_words(committed);
    }

    /// The buddy of `c`, if it is free and not split. Such a buddy has the same level as `c`.
    fn free_unsplit_buddy(&self, pool: &ChunkHeaderPool, c: ChunkIndex) -> Option<ChunkIndex> {
        let buddy = self.chunk_at(pool[c].buddy_base())?;
        let b = &pool[buddy];
        (b.is_free() && b.level() == pool[c].level()).then_some(buddy)
    }

    /// Merge the free chunk `c` with its buddy as long as the buddy is free and unsplit. Merged buddies
    /// are removed from the free lists. `c` must not be in a free list. Returns the resulting chunk,
    /// which is also not in a free list.
    pub fn merge(
        &mut self,
        pool: &mut ChunkHeaderPool,
        free_lists: &mut FreeChunkListVector,
        c: ChunkIndex,
    ) -> ChunkIndex {
        assert!(pool[c].is_free(), "only free chunks can be merged: {}", pool[c]);
        let mut c = c;
        while !pool[c].is_root_chunk() {
            let Some(buddy) = self.free_unsplit_buddy(pool, c) else {
                break;
            };
            free_lists.remove(pool, buddy);
            let (leader, follower) = if pool[c].is_leader() {
                (c, buddy)
            } else {
                (buddy, c)
            };
            self.merge_pair(pool, leader, follower);
            c = leader;
            trace!("Merged into {}", pool[c]);
        }
        c
    }

    /// Whether the in-use chunk `c` can be grown in place up to `target_level`. The chunk has to stay the
    /// leader at every level on the way, and every buddy it would absorb has to be free and unsplit.
    pub fn can_enlarge_chunk_to(
        &self,
        pool: &ChunkHeaderPool,
        c: ChunkIndex,
        target_level: ChunkLevel,
    ) -> bool {
        let base = pool[c].base();
        let mut level = pool[c].level();
        while level > target_level {
            let byte_size = byte_size_for_level(level);
            if !base.is_aligned_to(2 * byte_size) {
                return false;
            }
            match self.chunk_at(base + byte_size) {
                Some(buddy) if pool[buddy].is_free() && pool[buddy].level() == level => level -= 1,
                _ => return false,
            }
        }
        true
    }

    /// Grow the in-use leader chunk `c` by one level by absorbing its buddy, if the buddy is free and
    /// unsplit. The chunk keeps its content and stays in use.
    pub fn attempt_enlarge_chunk(
        &mut self,
        pool: &mut ChunkHeaderPool,
        free_lists: &mut FreeChunkListVector,
        c: ChunkIndex,
    ) -> bool {
        assert!(pool[c].is_in_use(), "only in-use chunks are enlarged");
        if pool[c].is_root_chunk() || !pool[c].is_leader() {
            return false;
        }
        let Some(buddy) = self.free_unsplit_buddy(pool, c) else {
            return false;
        };
        free_lists.remove(pool, buddy);
        self.merge_pair(pool, c, buddy);
        debug!("Enlarged chunk to {}", pool[c]);
        true
    }

    /// Check that the chunks in the area tile it without gaps, and that the start map agrees with them.
    pub fn verify(&self, pool: &ChunkHeaderPool) {
        let mut addr = self.base;
        let mut expected_starts = 0;
        while addr < self.end() {
            let c = self
                .chunk_at(addr)
                .unwrap_or_else(|| panic!("no chunk starts at {} in area {}", addr, self.base));
            let chunk = &pool[c];
            chunk.verify();
            assert_eq!(chunk.base(), addr);
            addr = chunk.end();
            expected_starts += 1;
        }
        assert_eq!(addr, self.end(), "chunks overflow the root chunk area");
        let starts = self.starts.iter().filter(|s| s.is_some()).count();
        assert_eq!(starts, expected_starts, "stale entries in the start map");
    }

    /// All chunks in the area, in address order.
    pub fn chunks<'a>(&'a self, pool: &'a ChunkHeaderPool) -> impl Iterator<Item = ChunkIndex> + 'a {
        let mut addr = self.base;
        let end = self.end();
        std::iter::from_fn(move || {
            if addr >= end {
                return None;
            }
            let c = self.chunk_at(addr)?;
            addr = pool[c].end();
            Some(c)
        })
    }
}
