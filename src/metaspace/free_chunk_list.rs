//! The free lists of the chunk manager.
//!
//! Free chunks are kept in one intrusive doubly-linked list per level, linked through the `prev` and
//! `next` fields of their headers. The lists are roughly ordered: uncommitted chunks are added to the
//! back, (partially) committed chunks to the front. A search for a chunk with a minimum committed size
//! stops at the first uncommitted chunk.

use super::chunk_header_pool::{ChunkHeaderPool, ChunkIndex};
use super::chunklevel::*;

#[derive(Default)]
pub struct FreeChunkList {
    head: Option<ChunkIndex>,
    tail: Option<ChunkIndex>,
    num_chunks: usize,
}

impl FreeChunkList {
    pub fn first(&self) -> Option<ChunkIndex> {
        self.head
    }

    pub fn num_chunks(&self) -> usize {
        self.num_chunks
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Add a free chunk. Uncommitted chunks go to the back, fully or partially committed ones to the front.
    pub fn add(&mut self, pool: &mut ChunkHeaderPool, c: ChunkIndex) {
        debug_assert!(pool[c].is_free(), "chunk not free");
        debug_assert!(pool[c].prev.is_none() && pool[c].next.is_none());
        debug_assert!(
            self.head.map_or(true, |h| pool[h].level() == pool[c].level()),
            "list should only contain chunks of the same level"
        );
        if pool[c].committed_words() == 0 {
            self.push_back(pool, c);
        } else {
            self.push_front(pool, c);
        }
    }

    fn push_front(&mut self, pool: &mut ChunkHeaderPool, c: ChunkIndex) {
        pool[c].next = self.head;
        match self.head {
            Some(h) => pool[h].prev = Some(c),
            None => self.tail = Some(c),
        }
        self.head = Some(c);
        self.num_chunks += 1;
    }

    fn push_back(&mut self, pool: &mut ChunkHeaderPool, c: ChunkIndex) {
        pool[c].prev = self.tail;
        match self.tail {
            Some(t) => pool[t].next = Some(c),
            None => self.head = Some(c),
        }
        self.tail = Some(c);
        self.num_chunks += 1;
    }

    /// Remove a chunk from anywhere in this list. The list must contain the chunk.
    pub fn remove(&mut self, pool: &mut ChunkHeaderPool, c: ChunkIndex) {
        let prev = pool[c].prev.take();
        let next = pool[c].next.take();
        match prev {
            Some(p) => pool[p].next = next,
            None => {
                debug_assert_eq!(self.head, Some(c), "chunk not in this list");
                self.head = next;
            }
        }
        match next {
            Some(n) => pool[n].prev = prev,
            None => {
                debug_assert_eq!(self.tail, Some(c), "chunk not in this list");
                self.tail = prev;
            }
        }
        self.num_chunks -= 1;
    }

    pub fn remove_first(&mut self, pool: &mut ChunkHeaderPool) -> Option<ChunkIndex> {
        let c = self.head?;
        self.remove(pool, c);
        Some(c)
    }

    /// The first chunk with at least `min_committed_words` committed. Stops looking at the first
    /// fully uncommitted chunk, since all chunks behind it are uncommitted as well.
    pub fn first_minimally_committed(
        &self,
        pool: &ChunkHeaderPool,
        min_committed_words: usize,
    ) -> Option<ChunkIndex> {
        let mut cur = self.head;
        while let Some(c) = cur {
            let committed = pool[c].committed_words();
            if committed >= min_committed_words {
                return Some(c);
            }
            if committed == 0 {
                return None;
            }
            cur = pool[c].next;
        }
        None
    }

    pub fn iter<'a>(&self, pool: &'a ChunkHeaderPool) -> impl Iterator<Item = ChunkIndex> + 'a {
        let mut cur = self.head;
        std::iter::from_fn(move || {
            let c = cur?;
            cur = pool[c].next;
            Some(c)
        })
    }

    pub fn contains(&self, pool: &ChunkHeaderPool, c: ChunkIndex) -> bool {
        self.iter(pool).any(|x| x == c)
    }

    pub fn calc_committed_word_size(&self, pool: &ChunkHeaderPool) -> usize {
        self.iter(pool).map(|c| pool[c].committed_words()).sum()
    }

    pub fn verify(&self, pool: &ChunkHeaderPool) {
        let mut n = 0;
        let mut last: Option<ChunkIndex> = None;
        for c in self.iter(pool) {
            let chunk = &pool[c];
            chunk.verify();
            assert!(chunk.is_free(), "chunk in free list is not free: {}", chunk);
            assert_eq!(chunk.prev, last, "broken free list links");
            if let Some(l) = last {
                assert_eq!(pool[l].level(), chunk.level(), "wrong level");
                if pool[l].committed_words() == 0 {
                    assert_eq!(chunk.committed_words(), 0, "unordered free list");
                }
            }
            last = Some(c);
            n += 1;
        }
        assert_eq!(self.tail, last, "broken free list tail");
        assert_eq!(self.num_chunks, n, "free list count mismatch");
    }
}

/// One free list per chunk level.
#[derive(Default)]
pub struct FreeChunkListVector {
    lists: [FreeChunkList; NUM_CHUNK_LEVELS],
}

impl FreeChunkListVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list_for_level(&self, level: ChunkLevel) -> &FreeChunkList {
        &self.lists[level as usize]
    }

    pub fn add(&mut self, pool: &mut ChunkHeaderPool, c: ChunkIndex) {
        let level = pool[c].level();
        self.lists[level as usize].add(pool, c);
    }

    /// Remove a chunk from its list. The chunk must be in the list for its level.
    pub fn remove(&mut self, pool: &mut ChunkHeaderPool, c: ChunkIndex) {
        let level = pool[c].level();
        self.lists[level as usize].remove(pool, c);
    }

    pub fn remove_first(&mut self, pool: &mut ChunkHeaderPool, level: ChunkLevel) -> Option<ChunkIndex> {
        self.lists[level as usize].remove_first(pool)
    }

    pub fn first_at_level(&self, level: ChunkLevel) -> Option<ChunkIndex> {
        self.lists[level as usize].first()
    }

    pub fn num_chunks_at_level(&self, level: ChunkLevel) -> usize {
        self.lists[level as usize].num_chunks()
    }

    /// Look for a chunk from `level` up to and including `max_level` (i.e. towards smaller chunks) whose
    /// committed size is at least `min_committed_words`. The chunk found is removed from its list.
    pub fn search_chunk_ascending(
        &mut self,
        pool: &mut ChunkHeaderPool,
        level: ChunkLevel,
        max_level: ChunkLevel,
        min_committed_words: usize,
    ) -> Option<ChunkIndex> {
        debug_assert!(min_committed_words <= word_size_for_level(max_level));
        for l in level..=max_level {
            let list = &mut self.lists[l as usize];
            if let Some(c) = list.first_minimally_committed(pool, min_committed_words) {
                list.remove(pool, c);
                return Some(c);
            }
        }
        None
    }

    /// Look for a chunk from `level` down to and including the root level (i.e. towards larger chunks)
    /// whose committed size is at least `min_committed_words`. The chunk found is removed from its list.
    pub fn search_chunk_descending(
        &mut self,
        pool: &mut ChunkHeaderPool,
        level: ChunkLevel,
        min_committed_words: usize,
    ) -> Option<ChunkIndex> {
        for l in (LOWEST_CHUNK_LEVEL..=level).rev() {
            let list = &mut self.lists[l as usize];
            if let Some(c) = list.first_minimally_committed(pool, min_committed_words) {
                list.remove(pool, c);
                return Some(c);
            }
        }
        None
    }

    /// Total size of all free chunks, regardless of their commit state.
    pub fn word_size(&self) -> usize {
        (LOWEST_CHUNK_LEVEL..=HIGHEST_CHUNK_LEVEL)
            .map(|l| self.num_chunks_at_level(l) * word_size_for_level(l))
            .sum()
    }

    pub fn num_chunks(&self) -> usize {
        self.lists.iter().map(|l| l.num_chunks()).sum()
    }

    pub fn calc_committed_word_size_at_level(&self, pool: &ChunkHeaderPool, level: ChunkLevel) -> usize {
        self.lists[level as usize].calc_committed_word_size(pool)
    }

    pub fn calc_committed_word_size(&self, pool: &ChunkHeaderPool) -> usize {
        self.lists.iter().map(|l| l.calc_committed_word_size(pool)).sum()
    }

    pub fn contains(&self, pool: &ChunkHeaderPool, c: ChunkIndex) -> bool {
        self.lists[pool[c].level() as usize].contains(pool, c)
    }

    pub fn verify(&self, pool: &ChunkHeaderPool) {
        for (l, list) in self.lists.iter().enumerate() {
            list.verify(pool);
            for c in list.iter(pool) {
                assert_eq!(pool[c].level() as usize, l, "chunk in wrong list");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Address;

    fn make_chunks(pool: &mut ChunkHeaderPool, level: ChunkLevel, n: usize) -> Vec<ChunkIndex> {
        let base = unsafe { Address::from_usize(MAX_CHUNK_BYTE_SIZE * 16) };
        (0..n)
            .map(|i| pool.allocate_chunk_header(base + i * byte_size_for_level(level), level, 0))
            .collect()
    }

    #[test]
    fn test_committed_chunks_first() {
        let mut pool = ChunkHeaderPool::new();
        let chunks = make_chunks(&mut pool, CHUNK_LEVEL_64K, 3);
        pool[chunks[1]].set_committed_words(100);

        let mut list = FreeChunkList::default();
        list.add(&mut pool, chunks[0]);
        list.add(&mut pool, chunks[1]);
        list.add(&mut pool, chunks[2]);
        list.verify(&pool);

        assert_eq!(list.first(), Some(chunks[1]));
        assert_eq!(list.num_chunks(), 3);
        assert_eq!(list.first_minimally_committed(&pool, 50), Some(chunks[1]));
        assert_eq!(list.first_minimally_committed(&pool, 101), None);
        assert_eq!(list.first_minimally_committed(&pool, 0), Some(chunks[1]));
        assert_eq!(list.calc_committed_word_size(&pool), 100);
    }

    #[test]
    fn test_remove_from_middle() {
        let mut pool = ChunkHeaderPool::new();
        let chunks = make_chunks(&mut pool, CHUNK_LEVEL_1K, 3);
        let mut list = FreeChunkList::default();
        for &c in &chunks {
            list.add(&mut pool, c);
        }
        list.remove(&mut pool, chunks[1]);
        list.verify(&pool);
        assert!(!list.contains(&pool, chunks[1]));
        assert_eq!(list.iter(&pool).collect::<Vec<_>>(), vec![chunks[0], chunks[2]]);
        assert_eq!(list.remove_first(&mut pool), Some(chunks[0]));
        assert_eq!(list.remove_first(&mut pool), Some(chunks[2]));
        assert_eq!(list.remove_first(&mut pool), None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_search() {
        let mut pool = ChunkHeaderPool::new();
        let mut lists = FreeChunkListVector::new();
        let small = make_chunks(&mut pool, CHUNK_LEVEL_4K, 1)[0];
        let large = make_chunks(&mut pool, CHUNK_LEVEL_1M, 1)[0];
        lists.add(&mut pool, small);
        lists.add(&mut pool, large);
        assert_eq!(lists.num_chunks(), 2);
        assert_eq!(
            lists.word_size(),
            word_size_for_level(CHUNK_LEVEL_4K) + word_size_for_level(CHUNK_LEVEL_1M)
        );

        // Nothing between 8K and 1K.
        assert_eq!(
            lists.search_chunk_ascending(&mut pool, CHUNK_LEVEL_8K, CHUNK_LEVEL_8K, 0),
            None
        );
        // Towards smaller chunks, we find the 4K chunk.
        assert_eq!(
            lists.search_chunk_ascending(&mut pool, CHUNK_LEVEL_8K, CHUNK_LEVEL_4K, 0),
            Some(small)
        );
        // Towards larger chunks, we find the 1M chunk, but only if we do not need committed memory.
        assert_eq!(lists.search_chunk_descending(&mut pool, CHUNK_LEVEL_8K, 1), None);
        assert_eq!(
            lists.search_chunk_descending(&mut pool, CHUNK_LEVEL_8K, 0),
            Some(large)
        );
        assert_eq!(lists.num_chunks(), 0);
        lists.verify(&pool);
    }
}
