use super::chunk_header_pool::{ChunkHeaderPool, ChunkIndex};
use super::chunklevel::*;
use super::commit_limiter::CommitLimiter;
use super::commit_mask::CommitMask;
use super::counters::SizeCounter;
use super::root_chunk_area::RootChunkArea;
use super::AllocationError;
use crate::util::conversions::{bytes_to_words, words_to_bytes};
use crate::util::os::{self, Reservation};
use crate::util::Address;

/// One reservation of address space, carved into root chunks front to back.
///
/// The node tracks which commit granules of its range are committed, and keeps a [`RootChunkArea`] for
/// every root chunk it has handed out.
pub struct VirtualSpaceNode {
    reservation: Reservation,
    /// Index of this node in its list.
    index: usize,
    /// Words carved into root chunks, from the start of the reservation.
    used_words: usize,
    commit_mask: CommitMask,
    root_chunk_areas: Vec<Option<RootChunkArea>>,
}

impl VirtualSpaceNode {
    /// Reserve a new node of `word_size` words.
    pub fn create(
        word_size: usize,
        commit_granule_words: usize,
        index: usize,
    ) -> Result<Self, AllocationError> {
        let reservation = Reservation::new(words_to_bytes(word_size), MAX_CHUNK_BYTE_SIZE)
            .map_err(|e| {
                info!(
                    "Failed to reserve {} words of metaspace: {}",
                    word_size, e
                );
                AllocationError::VirtualSpaceExhausted
            })?;
        Ok(Self::from_reservation(reservation, commit_granule_words, index))
    }

    /// Wrap an existing reservation. It must be aligned to and sized in root chunks.
    pub fn from_reservation(
        reservation: Reservation,
        commit_granule_words: usize,
        index: usize,
    ) -> Self {
        assert!(
            reservation.start().is_aligned_to(MAX_CHUNK_BYTE_SIZE),
            "reservation is not aligned to a root chunk"
        );
        assert!(
            reservation.size() % MAX_CHUNK_BYTE_SIZE == 0,
            "reservation is not a multiple of a root chunk"
        );
        let word_size = bytes_to_words(reservation.size());
        let num_roots = word_size / MAX_CHUNK_WORD_SIZE;
        debug!(
            "Created virtual space node {} [{}, {})",
            index,
            reservation.start(),
            reservation.end()
        );
        VirtualSpaceNode {
            commit_mask: CommitMask::new(reservation.start(), word_size, commit_granule_words),
            root_chunk_areas: (0..num_roots).map(|_| None).collect(),
            reservation,
            index,
            used_words: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn base(&self) -> Address {
        self.reservation.start()
    }

    pub fn end(&self) -> Address {
        self.reservation.end()
    }

    pub fn word_size(&self) -> usize {
        bytes_to_words(self.reservation.size())
    }

    pub fn used_words(&self) -> usize {
        self.used_words
    }

    pub fn free_words(&self) -> usize {
        self.word_size() - self.used_words
    }

    pub fn committed_words(&self) -> usize {
        self.commit_mask.get_committed_size()
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.reservation.contains(addr)
    }

    /// Number of root chunks that can still be carved.
    pub fn num_free_root_chunks(&self) -> usize {
        self.free_words() / MAX_CHUNK_WORD_SIZE
    }

    /// Carve the next root chunk. Returns `None` if the node is full.
    pub fn allocate_root_chunk(&mut self, pool: &mut ChunkHeaderPool) -> Option<ChunkIndex> {
        if self.free_words() < MAX_CHUNK_WORD_SIZE {
            return None;
        }
        let base = self.base().add_words(self.used_words);
        let (area, root) = RootChunkArea::new(pool, base, self.index);
        let slot = self.used_words / MAX_CHUNK_WORD_SIZE;
        debug_assert!(self.root_chunk_areas[slot].is_none());
        self.root_chunk_areas[slot] = Some(area);
        self.used_words += MAX_CHUNK_WORD_SIZE;
        trace!("Carved root chunk {} from node {}", pool[root], self.index);
        Some(root)
    }

    fn area_slot(&self, addr: Address) -> usize {
        debug_assert!(self.contains(addr));
        (addr - self.base()) / MAX_CHUNK_BYTE_SIZE
    }

    /// The root chunk area covering `addr`. The root chunk there must have been carved.
    pub fn root_chunk_area(&self, addr: Address) -> &RootChunkArea {
        let slot = self.area_slot(addr);
        self.root_chunk_areas[slot]
            .as_ref()
            .unwrap_or_else(|| panic!("{} is not in a carved root chunk", addr))
    }

    pub fn root_chunk_area_mut(&mut self, addr: Address) -> &mut RootChunkArea {
        let slot = self.area_slot(addr);
        self.root_chunk_areas[slot]
            .as_mut()
            .unwrap_or_else(|| panic!("{} is not in a carved root chunk", addr))
    }

    pub fn root_chunk_areas(&self) -> impl Iterator<Item = &RootChunkArea> {
        self.root_chunk_areas.iter().flatten()
    }

    /// Make sure `[start, start + word_size)` is committed. The range is widened to commit granules.
    ///
    /// The commit limiter is asked for the words that are missing before the OS is called. On success the
    /// newly committed words are added to the limiter and to `list_committed`. If the OS fails to commit,
    /// the granules committed by this call are uncommitted again.
    pub fn ensure_range_is_committed(
        &mut self,
        limiter: &mut CommitLimiter,
        list_committed: &mut SizeCounter,
        start: Address,
        word_size: usize,
    ) -> Result<(), AllocationError> {
        self.ensure_range_is_committed_with(limiter, list_committed, start, word_size, os::commit)
    }

    fn ensure_range_is_committed_with(
        &mut self,
        limiter: &mut CommitLimiter,
        list_committed: &mut SizeCounter,
        start: Address,
        word_size: usize,
        mut commit: impl FnMut(Address, usize) -> std::io::Result<()>,
    ) -> Result<(), AllocationError> {
        let granule_bytes = words_to_bytes(self.commit_mask.words_per_granule());
        let from = start.align_down(granule_bytes);
        let to = start.add_words(word_size).align_up(granule_bytes);
        debug_assert!(from >= self.base() && to <= self.end());
        let words = to.words_from(from);

        let missing = words - self.commit_mask.get_committed_size_in_range(from, words);
        if missing == 0 {
            return Ok(());
        }
        limiter.can_commit(missing).map_err(|e| {
            debug!(
                "Cannot commit {} words for [{}, {}): {}",
                missing, from, to, e
            );
            e
        })?;

        // Only commit what is not committed yet. Committing over committed memory would zero it.
        let runs = self.commit_mask.uncommitted_runs(from, words);
        for (i, &(g_from, g_to)) in runs.iter().enumerate() {
            let run_start = self.commit_mask.granule_address(g_from);
            let run_bytes = (g_to - g_from) * granule_bytes;
            if let Err(e) = commit(run_start, run_bytes) {
                error!(
                    "Failed to commit [{}, {}): {}",
                    run_start,
                    run_start + run_bytes,
                    e
                );
                for &(r_from, r_to) in runs[..i].iter() {
                    let r_start = self.commit_mask.granule_address(r_from);
                    let r_words = (r_to - r_from) * self.commit_mask.words_per_granule();
                    self.uncommit_range(limiter, list_committed, r_start, r_words);
                }
                return Err(AllocationError::MmapOutOfMemory);
            }
            self.commit_mask.mark_range_as_committed(run_start, bytes_to_words(run_bytes));
            limiter.increase_committed(bytes_to_words(run_bytes));
            list_committed.increment_by(bytes_to_words(run_bytes));
        }
        trace!("Committed {} words in [{}, {})", missing, from, to);
        Ok(())
    }

    /// Uncommit `[start, start + word_size)`. The range must be granule aligned.
    ///
    /// Returns the words that were uncommitted. If the OS refuses, the memory stays committed.
    pub fn uncommit_range(
        &mut self,
        limiter: &mut CommitLimiter,
        list_committed: &mut SizeCounter,
        start: Address,
        word_size: usize,
    ) -> usize {
        let granule_words = self.commit_mask.words_per_granule();
        debug_assert!(start.words_from(self.base()) % granule_words == 0);
        debug_assert!(word_size % granule_words == 0);

        let committed = self.commit_mask.get_committed_size_in_range(start, word_size);
        if committed == 0 {
            return 0;
        }
        if let Err(e) = os::uncommit(start, words_to_bytes(word_size)) {
            error!(
                "Failed to uncommit [{}, {}): {}",
                start,
                start.add_words(word_size),
                e
            );
            return 0;
        }
        let uncommitted = self.commit_mask.mark_range_as_uncommitted(start, word_size);
        debug_assert_eq!(uncommitted, committed);
        limiter.decrease_committed(uncommitted);
        list_committed.decrement_by(uncommitted);
        trace!("Uncommitted {} words in [{}, {})", uncommitted, start, start.add_words(word_size));
        uncommitted
    }

    pub fn is_range_fully_committed(&self, start: Address, word_size: usize) -> bool {
        let granule_bytes = words_to_bytes(self.commit_mask.words_per_granule());
        let from = start.align_down(granule_bytes);
        let to = start.add_words(word_size).align_up(granule_bytes);
        let words = to.words_from(from);
        self.commit_mask.get_committed_size_in_range(from, words) == words
    }

    pub fn verify(&self, pool: &ChunkHeaderPool) {
        assert!(self.used_words <= self.word_size());
        assert_eq!(self.used_words % MAX_CHUNK_WORD_SIZE, 0);
        let carved = self.used_words / MAX_CHUNK_WORD_SIZE;
        for (i, area) in self.root_chunk_areas.iter().enumerate() {
            assert_eq!(area.is_some(), i < carved, "root chunk area {} of node {}", i, self.index);
            if let Some(area) = area {
                area.verify(pool);
                for c in area.chunks(pool) {
                    let chunk = &pool[c];
                    assert_eq!(chunk.node(), self.index);
                    // A chunk may under-report its committed memory, never over-report it.
                    if chunk.committed_words() > 0 {
                        assert!(
                            self.is_range_fully_committed(chunk.base(), chunk.committed_words()),
                            "{} claims uncommitted memory",
                            chunk
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRANULE_WORDS: usize = 8 * 1024;

    fn node(roots: usize) -> VirtualSpaceNode {
        VirtualSpaceNode::create(roots * MAX_CHUNK_WORD_SIZE, GRANULE_WORDS, 0).unwrap()
    }

    #[test]
    fn test_carve_root_chunks() {
        let mut pool = ChunkHeaderPool::new();
        let mut n = node(2);
        assert_eq!(n.num_free_root_chunks(), 2);
        let a = n.allocate_root_chunk(&mut pool).unwrap();
        let b = n.allocate_root_chunk(&mut pool).unwrap();
        assert!(n.allocate_root_chunk(&mut pool).is_none());
        assert_eq!(pool[a].base(), n.base());
        assert_eq!(pool[b].base(), pool[a].end());
        assert_eq!(n.free_words(), 0);
        assert_eq!(n.root_chunk_area(pool[b].base()).base(), pool[b].base());
        n.verify(&pool);
    }

    #[test]
    fn test_commit_widens_to_granules() {
        let mut n = node(1);
        let mut limiter = CommitLimiter::unlimited();
        let mut counter = SizeCounter::new();
        let start = n.base().add_words(10);
        n.ensure_range_is_committed(&mut limiter, &mut counter, start, 10)
            .unwrap();
        assert_eq!(n.committed_words(), GRANULE_WORDS);
        assert_eq!(limiter.committed_words(), GRANULE_WORDS);
        assert_eq!(counter.get(), GRANULE_WORDS);

        // Committing again is free.
        n.ensure_range_is_committed(&mut limiter, &mut counter, n.base(), GRANULE_WORDS + 1)
            .unwrap();
        assert_eq!(n.committed_words(), 2 * GRANULE_WORDS);
        assert_eq!(limiter.committed_words(), 2 * GRANULE_WORDS);
    }

    #[test]
    fn test_commit_keeps_content() {
        let mut n = node(1);
        let mut limiter = CommitLimiter::unlimited();
        let mut counter = SizeCounter::new();
        n.ensure_range_is_committed(&mut limiter, &mut counter, n.base(), 1)
            .unwrap();
        unsafe { n.base().store(0xdeadusize) };
        n.ensure_range_is_committed(&mut limiter, &mut counter, n.base(), 3 * GRANULE_WORDS)
            .unwrap();
        assert_eq!(unsafe { n.base().load::<usize>() }, 0xdead);
    }

    #[test]
    fn test_commit_refused_by_limiter() {
        let mut n = node(1);
        let mut limiter = CommitLimiter::new(GRANULE_WORDS);
        let mut counter = SizeCounter::new();
        assert_eq!(
            n.ensure_range_is_committed(&mut limiter, &mut counter, n.base(), GRANULE_WORDS + 1),
            Err(AllocationError::CommitLimitReached)
        );
        assert_eq!(n.committed_words(), 0);
        assert_eq!(limiter.committed_words(), 0);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_commit_failure_rolls_back() {
        let mut n = node(1);
        let mut limiter = CommitLimiter::unlimited();
        let mut counter = SizeCounter::new();
        // Commit the second granule, so the range below splits into two uncommitted runs.
        let second = n.base().add_words(GRANULE_WORDS);
        n.ensure_range_is_committed(&mut limiter, &mut counter, second, 1)
            .unwrap();

        let mut calls = 0;
        let result = n.ensure_range_is_committed_with(
            &mut limiter,
            &mut counter,
            n.base(),
            3 * GRANULE_WORDS,
            |start, size| {
                calls += 1;
                if calls == 1 {
                    os::commit(start, size)
                } else {
                    Err(std::io::Error::from_raw_os_error(libc::ENOMEM))
                }
            },
        );
        assert_eq!(result, Err(AllocationError::MmapOutOfMemory));
        assert_eq!(calls, 2);
        // Only the granule committed before the call is left.
        assert_eq!(n.committed_words(), GRANULE_WORDS);
        assert!(n.is_range_fully_committed(second, GRANULE_WORDS));
        assert_eq!(limiter.committed_words(), GRANULE_WORDS);
        assert_eq!(counter.get(), GRANULE_WORDS);
    }

    #[test]
    fn test_uncommit() {
        let mut n = node(1);
        let mut limiter = CommitLimiter::unlimited();
        let mut counter = SizeCounter::new();
        n.ensure_range_is_committed(&mut limiter, &mut counter, n.base(), 2 * GRANULE_WORDS)
            .unwrap();
        let uncommitted = n.uncommit_range(&mut limiter, &mut counter, n.base(), 4 * GRANULE_WORDS);
        assert_eq!(uncommitted, 2 * GRANULE_WORDS);
        assert_eq!(n.committed_words(), 0);
        assert_eq!(limiter.committed_words(), 0);
        assert_eq!(counter.get(), 0);
        assert_eq!(n.uncommit_range(&mut limiter, &mut counter, n.base(), GRANULE_WORDS), 0);
    }
}
