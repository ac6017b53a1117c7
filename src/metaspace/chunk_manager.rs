//! The chunk manager: a buddy allocator of chunks on top of a [`VirtualSpaceList`].
//!
//! Free chunks are kept in per-level free lists. A request for a chunk is served from the free lists if
//! possible (splitting a larger chunk down to the wanted level), and otherwise from a fresh root chunk.
//! Returned chunks are merged with their free buddies as far as possible before they go back to the free
//! lists.

use super::chunk_header_pool::{ChunkHeaderPool, ChunkIndex};
use super::chunklevel::*;
use super::commit_limiter::CommitLimiter;
use super::free_chunk_list::FreeChunkListVector;
use super::metachunk::{ChunkState, Metachunk};
use super::root_chunk_area::RootChunkArea;
use super::settings::Settings;
use super::statistics::ChunkManagerStats;
use super::virtual_space_list::VirtualSpaceList;
use super::AllocationError;
use crate::util::conversions::raw_align_up;

pub struct ChunkManager {
    name: &'static str,
    vsl: VirtualSpaceList,
    pool: ChunkHeaderPool,
    free_chunks: FreeChunkListVector,
    settings: Settings,
}

impl ChunkManager {
    pub fn new(name: &'static str, vsl: VirtualSpaceList, settings: Settings) -> Self {
        ChunkManager {
            name,
            vsl,
            pool: ChunkHeaderPool::new(),
            free_chunks: FreeChunkListVector::new(),
            settings,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn vsl(&self) -> &VirtualSpaceList {
        &self.vsl
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pool(&self) -> &ChunkHeaderPool {
        &self.pool
    }

    /// The header of a chunk.
    pub fn chunk(&self, c: ChunkIndex) -> &Metachunk {
        &self.pool[c]
    }

    /// Bump-allocate from an in-use chunk. See [`Metachunk::allocate`].
    pub fn allocate_in_chunk(&mut self, c: ChunkIndex, word_size: usize) -> Option<crate::util::Address> {
        debug_assert!(self.pool[c].is_in_use());
        self.pool[c].allocate(word_size)
    }

    /// Total word size of all free chunks.
    pub fn total_free_word_size(&self) -> usize {
        self.free_chunks.word_size()
    }

    pub fn total_num_free_chunks(&self) -> usize {
        self.free_chunks.num_chunks()
    }

    pub fn num_free_chunks_at_level(&self, level: ChunkLevel) -> usize {
        self.free_chunks.num_chunks_at_level(level)
    }

    pub fn calc_committed_word_size_of_free_chunks(&self) -> usize {
        self.free_chunks.calc_committed_word_size(&self.pool)
    }

    fn area_mut<'a>(
        vsl: &'a mut VirtualSpaceList,
        pool: &ChunkHeaderPool,
        c: ChunkIndex,
    ) -> &'a mut RootChunkArea {
        vsl.node_mut(pool[c].node()).root_chunk_area_mut(pool[c].base())
    }

    /// Get a chunk of at least `max_level` and at most `preferred_level`, committed to at least
    /// `min_committed_words`.
    ///
    /// Free chunks that are already committed far enough are preferred, since using them costs no commit. If no
    /// free chunk is large enough, a new root chunk is taken from the virtual space list. The limiter is asked
    /// before that happens, so a refused commit leaves the virtual space untouched.
    pub fn get_chunk(
        &mut self,
        limiter: &mut CommitLimiter,
        preferred_level: ChunkLevel,
        max_level: ChunkLevel,
        min_committed_words: usize,
    ) -> Result<ChunkIndex, AllocationError> {
        check_valid_level(max_level);
        check_valid_level(preferred_level);
        assert!(
            preferred_level <= max_level,
            "preferred level {} is smaller than the max level {}",
            preferred_level,
            max_level
        );
        assert!(min_committed_words <= word_size_for_level(max_level));

        let fully_committed = self.settings.new_chunks_are_fully_committed;
        // A new root chunk is split down to the preferred level before it is committed.
        let new_root_commit_words =
            if fully_committed { word_size_for_level(preferred_level) } else { min_committed_words };
        let c = self.get_chunk_inner(
            limiter,
            preferred_level,
            max_level,
            min_committed_words,
            new_root_commit_words,
        )?;

        // Commit the chunk far enough. If that fails, give the chunk back.
        let commit_words = if fully_committed { self.pool[c].word_size() } else { min_committed_words };
        if let Err(e) = self.commit_chunk_to(limiter, c, commit_words) {
            debug!(
                "{}: failed to commit new chunk {} to {} words: {}",
                self.name, self.pool[c], commit_words, e
            );
            self.return_free_chunk(limiter, c);
            return Err(e);
        }

        self.pool[c].set_in_use();
        debug!("{}: handing out chunk {}", self.name, self.pool[c]);
        self.verify_if_extreme();
        Ok(c)
    }

    fn get_chunk_inner(
        &mut self,
        limiter: &mut CommitLimiter,
        preferred_level: ChunkLevel,
        max_level: ChunkLevel,
        min_committed_words: usize,
        new_root_commit_words: usize,
    ) -> Result<ChunkIndex, AllocationError> {
        let pool = &mut self.pool;
        let lists = &mut self.free_chunks;

        // 1. Chunks of the preferred size or a bit smaller that are committed far enough. Tiny
        //    splinters are left alone, so that large arenas do not consume them.
        let c = lists
            .search_chunk_ascending(
                pool,
                preferred_level,
                max_level.min(preferred_level + 2),
                min_committed_words,
            )
            // 2. Larger chunks that are committed far enough.
            .or_else(|| lists.search_chunk_descending(pool, preferred_level, min_committed_words))
            // 3. Any chunk of the preferred size or smaller.
            .or_else(|| lists.search_chunk_ascending(pool, preferred_level, max_level, 0))
            // 4. Any larger chunk.
            .or_else(|| lists.search_chunk_descending(pool, preferred_level, 0));

        let c = match c {
            Some(c) => {
                trace!("{}: found free chunk {}", self.name, self.pool[c]);
                c
            }
            None => {
                // 5. A new root chunk. Make sure we may commit before we carve it.
                let granule = self.settings.commit_granule_words;
                let precheck = raw_align_up(new_root_commit_words, granule).min(MAX_CHUNK_WORD_SIZE);
                limiter.can_commit(precheck)?;
                let c = self.vsl.allocate_root_chunk(&mut self.pool)?;
                trace!("{}: new root chunk {}", self.name, self.pool[c]);
                c
            }
        };

        debug_assert!(self.pool[c].is_free());
        if self.pool[c].level() < preferred_level {
            Self::area_mut(&mut self.vsl, &self.pool, c).split(
                &mut self.pool,
                &mut self.free_chunks,
                c,
                preferred_level,
            );
        }
        Ok(c)
    }

    /// Commit the chunk at least up to `word_size` words. Commits are done in granules, so more may be committed.
    fn commit_chunk_to(
        &mut self,
        limiter: &mut CommitLimiter,
        c: ChunkIndex,
        word_size: usize,
    ) -> Result<(), AllocationError> {
        let chunk = &self.pool[c];
        if chunk.committed_words() >= word_size {
            return Ok(());
        }
        let commit_to = raw_align_up(word_size, self.settings.commit_granule_words).min(chunk.word_size());
        let (node, base, committed) = (chunk.node(), chunk.base(), chunk.committed_words());
        self.vsl
            .ensure_range_is_committed(limiter, node, base.add_words(committed), commit_to - committed)?;
        self.pool[c].set_committed_words(commit_to);
        Ok(())
    }

    /// Make sure the in-use chunk is committed at least up to `word_size` words.
    pub fn ensure_committed(
        &mut self,
        limiter: &mut CommitLimiter,
        c: ChunkIndex,
        word_size: usize,
    ) -> Result<(), AllocationError> {
        assert!(word_size <= self.pool[c].word_size());
        self.commit_chunk_to(limiter, c, word_size)
    }

    /// Make sure `additional` words can be allocated from the in-use chunk without committing.
    pub fn ensure_committed_additional(
        &mut self,
        limiter: &mut CommitLimiter,
        c: ChunkIndex,
        additional: usize,
    ) -> Result<(), AllocationError> {
        let target = self.pool[c].used_words() + additional;
        self.ensure_committed(limiter, c, target)
    }

    /// Take back an in-use chunk. Its content is discarded.
    pub fn return_chunk(&mut self, limiter: &mut CommitLimiter, c: ChunkIndex) {
        assert!(self.pool[c].is_in_use(), "returning a chunk that is not in use: {}", self.pool[c]);
        debug!("{}: taking back chunk {}", self.name, self.pool[c]);
        self.pool[c].reset_used_words();
        self.pool[c].set_free();
        self.return_free_chunk(limiter, c);
        self.verify_if_extreme();
    }

    /// Merge a free chunk that is in no list with its buddies, optionally uncommit it, and add the result to the
    /// free lists.
    fn return_free_chunk(&mut self, limiter: &mut CommitLimiter, c: ChunkIndex) {
        let merged =
            Self::area_mut(&mut self.vsl, &self.pool, c).merge(&mut self.pool, &mut self.free_chunks, c);
        if self.settings.uncommit_free_chunks
            && self.pool[merged].word_size() >= self.settings.commit_granule_words
        {
            self.uncommit_chunk(limiter, merged);
        }
        self.free_chunks.add(&mut self.pool, merged);
    }

    /// Uncommit a free chunk that is at least one granule large.
    fn uncommit_chunk(&mut self, limiter: &mut CommitLimiter, c: ChunkIndex) {
        let chunk = &self.pool[c];
        debug_assert!(chunk.is_free());
        debug_assert!(chunk.word_size() >= self.settings.commit_granule_words);
        // A merged chunk may under-report its committed words, so ask the commit mask instead.
        let (node, base, word_size) = (chunk.node(), chunk.base(), chunk.word_size());
        self.vsl.uncommit_range(limiter, node, base, word_size);
        // If the OS refused, the memory is still committed, but the chunk may under-report it.
        self.pool[c].set_committed_words(0);
    }

    /// Grow an in-use chunk in place by one level, absorbing its free buddy. Returns false if the buddy is not
    /// free, or the chunk is not a leader.
    pub fn attempt_enlarge_chunk(&mut self, c: ChunkIndex) -> bool {
        let chunk = &self.pool[c];
        if chunk.is_root_chunk() || !chunk.is_leader() {
            return false;
        }
        let enlarged = Self::area_mut(&mut self.vsl, &self.pool, c).attempt_enlarge_chunk(
            &mut self.pool,
            &mut self.free_chunks,
            c,
        );
        self.verify_if_extreme();
        enlarged
    }

    /// Whether [`Self::attempt_enlarge_chunk`] would succeed until the in-use chunk `c` has `target_level`.
    pub fn can_enlarge_chunk_to(&self, c: ChunkIndex, target_level: ChunkLevel) -> bool {
        let chunk = &self.pool[c];
        self.vsl
            .node(chunk.node())
            .root_chunk_area(chunk.base())
            .can_enlarge_chunk_to(&self.pool, c, target_level)
    }

    /// Get `n` root chunks that are adjacent in address order, in use, and committed to `min_committed_words`
    /// each.
    ///
    /// Free root chunks are used if `n` of them happen to be adjacent. Otherwise the virtual space list carves new
    /// ones.
    pub fn get_contiguous_root_chunks(
        &mut self,
        limiter: &mut CommitLimiter,
        n: usize,
        min_committed_words: usize,
    ) -> Result<Vec<ChunkIndex>, AllocationError> {
        assert!(n > 0);
        assert!(min_committed_words <= MAX_CHUNK_WORD_SIZE);
        let chunks = match self.find_adjacent_free_root_chunks(n) {
            Some(chunks) => {
                for &c in chunks.iter() {
                    self.free_chunks.remove(&mut self.pool, c);
                }
                chunks
            }
            None => {
                let granule = self.settings.commit_granule_words;
                limiter.can_commit(n * raw_align_up(min_committed_words, granule).min(MAX_CHUNK_WORD_SIZE))?;
                self.vsl.allocate_multiple_root_chunks(&mut self.pool, n)?
            }
        };
        for (i, &c) in chunks.iter().enumerate() {
            if let Err(e) = self.commit_chunk_to(limiter, c, min_committed_words) {
                // Give back the chunks we have not handed out yet, as well as the ones committed so far.
                for &r in chunks[..i].iter() {
                    self.pool[r].set_in_use();
                    self.return_chunk(limiter, r);
                }
                for &r in chunks[i..].iter() {
                    self.return_free_chunk(limiter, r);
                }
                return Err(e);
            }
            self.pool[c].set_in_use();
        }
        debug!(
            "{}: handing out {} adjacent root chunks at {}",
            self.name,
            n,
            self.pool[chunks[0]].base()
        );
        self.verify_if_extreme();
        Ok(chunks)
    }

    fn find_adjacent_free_root_chunks(&self, n: usize) -> Option<Vec<ChunkIndex>> {
        let mut roots: Vec<ChunkIndex> = self
            .free_chunks
            .list_for_level(ROOT_CHUNK_LEVEL)
            .iter(&self.pool)
            .collect();
        if roots.len() < n {
            return None;
        }
        roots.sort_by_key(|&c| self.pool[c].base());
        let mut run_start = 0;
        for i in 1..=roots.len() {
            if i - run_start == n {
                return Some(roots[run_start..i].to_vec());
            }
            if i < roots.len() && self.pool[roots[i - 1]].end() != self.pool[roots[i]].base() {
                run_start = i;
            }
        }
        None
    }

    /// Uncommit all free chunks that are at least one granule large. Returns the words uncommitted.
    pub fn purge(&mut self, limiter: &mut CommitLimiter) -> usize {
        let committed_before = self.vsl.committed_words();
        for level in LOWEST_CHUNK_LEVEL..=HIGHEST_CHUNK_LEVEL {
            if word_size_for_level(level) < self.settings.commit_granule_words {
                break;
            }
            let to_uncommit: Vec<ChunkIndex> = self
                .free_chunks
                .list_for_level(level)
                .iter(&self.pool)
                .collect();
            for c in to_uncommit {
                self.free_chunks.remove(&mut self.pool, c);
                self.uncommit_chunk(limiter, c);
                self.free_chunks.add(&mut self.pool, c);
            }
        }
        let purged = committed_before - self.vsl.committed_words();
        info!("{}: purged {} committed words", self.name, purged);
        self.verify_if_extreme();
        purged
    }

    pub fn add_to_statistics(&self) -> ChunkManagerStats {
        let mut stats = ChunkManagerStats::default();
        for level in LOWEST_CHUNK_LEVEL..=HIGHEST_CHUNK_LEVEL {
            stats.num_chunks[level as usize] = self.free_chunks.num_chunks_at_level(level);
            stats.committed_word_size[level as usize] =
                self.free_chunks.calc_committed_word_size_at_level(&self.pool, level);
        }
        stats
    }

    fn verify_if_extreme(&self) {
        #[cfg(feature = "extreme_assertions")]
        self.verify();
    }

    pub fn verify(&self) {
        self.free_chunks.verify(&self.pool);
        self.vsl.verify(&self.pool);
        for (c, chunk) in self.pool.iter() {
            match chunk.state() {
                ChunkState::Free => {
                    // Free chunks are in the free lists, except salvaged root chunks that wait in the list.
                    assert!(
                        self.free_chunks.contains(&self.pool, c) || self.vsl.is_salvaged(c),
                        "free chunk {} is in no free list",
                        chunk
                    );
                }
                ChunkState::InUse => {
                    assert!(!self.free_chunks.contains(&self.pool, c));
                }
                ChunkState::Dead => unreachable!(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_util::fixtures::*;

    #[test]
    fn test_get_chunk_splits_root() {
        let mut limiter = CommitLimiter::unlimited();
        let mut cm = expandable_chunk_manager(test_settings());
        let c = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_4K, CHUNK_LEVEL_4K, 100)
            .unwrap();
        let chunk = cm.chunk(c);
        assert_eq!(chunk.level(), CHUNK_LEVEL_4K);
        assert!(chunk.is_in_use());
        assert!(chunk.committed_words() >= 100);
        assert_eq!(chunk.used_words(), 0);
        // One splinter per level between the root and the chunk.
        assert_eq!(cm.total_num_free_chunks(), CHUNK_LEVEL_4K as usize);
        assert_eq!(
            cm.total_free_word_size() + chunk.word_size(),
            MAX_CHUNK_WORD_SIZE
        );
        cm.verify();
    }

    #[test]
    fn test_get_chunk_reuses_returned_chunk() {
        let mut limiter = CommitLimiter::unlimited();
        let mut cm = expandable_chunk_manager(test_settings());
        let a = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_64K, CHUNK_LEVEL_64K, 10)
            .unwrap();
        let b = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_64K, CHUNK_LEVEL_64K, 10)
            .unwrap();
        let b_base = cm.chunk(b).base();
        cm.return_chunk(&mut limiter, b);
        let c = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_64K, CHUNK_LEVEL_64K, 10)
            .unwrap();
        assert_eq!(cm.chunk(c).base(), b_base);
        assert_eq!(cm.vsl().num_nodes(), 1);
        cm.return_chunk(&mut limiter, a);
        cm.return_chunk(&mut limiter, c);
        // Everything is merged back into one root chunk.
        assert_eq!(cm.total_num_free_chunks(), 1);
        assert_eq!(cm.num_free_chunks_at_level(ROOT_CHUNK_LEVEL), 1);
        cm.verify();
    }

    #[test]
    fn test_get_chunk_accepts_smaller_chunk_down_to_max_level() {
        let mut limiter = CommitLimiter::unlimited();
        let mut cm = expandable_chunk_manager(test_settings());
        let a = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_2M, CHUNK_LEVEL_2M, 10)
            .unwrap();
        cm.return_chunk(&mut limiter, a);
        // Split the root into 1K and splinters; keep the 1K chunk.
        let tiny = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_1K, CHUNK_LEVEL_1K, 10)
            .unwrap();
        // A 1K chunk is free now; a request that accepts 1K gets it.
        let b = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_4K, CHUNK_LEVEL_1K, 10)
            .unwrap();
        assert!(cm.chunk(b).level() >= CHUNK_LEVEL_4K);
        cm.return_chunk(&mut limiter, b);
        cm.return_chunk(&mut limiter, tiny);
        cm.verify();
    }

    #[test]
    fn test_limiter_refusal_consumes_nothing() {
        let mut limiter = CommitLimiter::new(0);
        let mut cm = expandable_chunk_manager(test_settings());
        assert_eq!(
            cm.get_chunk(&mut limiter, CHUNK_LEVEL_4K, CHUNK_LEVEL_4K, 1),
            Err(AllocationError::CommitLimitReached)
        );
        assert_eq!(cm.vsl().reserved_words(), 0);
        assert_eq!(cm.vsl().committed_words(), 0);
        assert_eq!(cm.total_num_free_chunks(), 0);
    }

    #[test]
    fn test_commit_failure_on_free_chunk_restores_state() {
        let mut limiter = CommitLimiter::unlimited();
        let settings = test_settings();
        let mut cm = expandable_chunk_manager(settings);
        let a = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_4K, CHUNK_LEVEL_4K, 1)
            .unwrap();
        cm.return_chunk(&mut limiter, a);
        let free_before = cm.total_num_free_chunks();

        let mut strict = CommitLimiter::new(limiter.committed_words());
        let big = word_size_for_level(CHUNK_LEVEL_1M);
        assert_eq!(
            cm.get_chunk(&mut strict, CHUNK_LEVEL_1M, CHUNK_LEVEL_1M, big),
            Err(AllocationError::CommitLimitReached)
        );
        assert_eq!(cm.total_num_free_chunks(), free_before);
        cm.verify();
    }

    #[test]
    fn test_fixed_list_exhaustion() {
        let mut limiter = CommitLimiter::unlimited();
        let mut cm = fixed_chunk_manager(1, test_settings());
        let a = cm
            .get_chunk(&mut limiter, ROOT_CHUNK_LEVEL, ROOT_CHUNK_LEVEL, 1)
            .unwrap();
        assert_eq!(
            cm.get_chunk(&mut limiter, CHUNK_LEVEL_1K, CHUNK_LEVEL_1K, 1),
            Err(AllocationError::VirtualSpaceExhausted)
        );
        cm.return_chunk(&mut limiter, a);
        assert!(cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_1K, CHUNK_LEVEL_1K, 1)
            .is_ok());
    }

    #[test]
    fn test_return_uncommits_large_chunks() {
        let mut limiter = CommitLimiter::unlimited();
        let mut cm = expandable_chunk_manager(test_settings());
        let c = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_1M, CHUNK_LEVEL_1M, 1000)
            .unwrap();
        assert!(limiter.committed_words() > 0);
        cm.return_chunk(&mut limiter, c);
        assert_eq!(limiter.committed_words(), 0);
        assert_eq!(cm.vsl().committed_words(), 0);
    }

    #[test]
    fn test_purge() {
        let mut limiter = CommitLimiter::unlimited();
        let mut settings = test_settings();
        settings.uncommit_free_chunks = false;
        let mut cm = expandable_chunk_manager(settings);
        let c = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_1M, CHUNK_LEVEL_1M, 1000)
            .unwrap();
        cm.return_chunk(&mut limiter, c);
        let committed = limiter.committed_words();
        assert!(committed > 0);
        assert_eq!(cm.calc_committed_word_size_of_free_chunks(), committed);
        assert_eq!(cm.purge(&mut limiter), committed);
        assert_eq!(limiter.committed_words(), 0);
        assert_eq!(cm.calc_committed_word_size_of_free_chunks(), 0);
        cm.verify();
    }

    #[test]
    fn test_return_uncommits_buddy_after_merge() {
        let mut limiter = CommitLimiter::unlimited();
        let settings = test_settings();
        let granule = settings.commit_granule_words;
        let mut cm = expandable_chunk_manager(settings);
        let leader = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_64K, CHUNK_LEVEL_64K, granule)
            .unwrap();
        let follower = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_64K, CHUNK_LEVEL_64K, granule)
            .unwrap();
        assert!(cm.chunk(leader).is_leader());
        assert_eq!(cm.chunk(leader).end(), cm.chunk(follower).base());
        assert_eq!(limiter.committed_words(), 2 * granule);

        // The leader is uncommitted on its own. Merging the follower into it yields a chunk that reports
        // nothing committed, although the follower's granule still is.
        cm.return_chunk(&mut limiter, leader);
        assert_eq!(limiter.committed_words(), granule);
        cm.return_chunk(&mut limiter, follower);
        assert_eq!(cm.num_free_chunks_at_level(ROOT_CHUNK_LEVEL), 1);
        assert_eq!(limiter.committed_words(), 0);
        assert_eq!(cm.vsl().committed_words(), 0);
        assert_eq!(cm.purge(&mut limiter), 0);
        cm.verify();
    }

    #[test]
    fn test_purge_uncommits_under_reported_chunks() {
        let mut limiter = CommitLimiter::unlimited();
        let mut settings = test_settings();
        settings.uncommit_free_chunks = false;
        let granule = settings.commit_granule_words;
        let mut cm = expandable_chunk_manager(settings);
        let leader = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_128K, CHUNK_LEVEL_128K, 1)
            .unwrap();
        let follower = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_128K, CHUNK_LEVEL_128K, 1)
            .unwrap();
        assert_eq!(cm.chunk(leader).end(), cm.chunk(follower).base());
        // Both are committed one granule deep, so the merged chunk only counts the leader's granule.
        cm.return_chunk(&mut limiter, follower);
        cm.return_chunk(&mut limiter, leader);
        assert_eq!(limiter.committed_words(), 2 * granule);
        assert_eq!(cm.calc_committed_word_size_of_free_chunks(), granule);
        assert_eq!(cm.purge(&mut limiter), 2 * granule);
        assert_eq!(limiter.committed_words(), 0);
        cm.verify();
    }

    #[test]
    fn test_fully_committed_refusal_reserves_nothing() {
        let mut settings = test_settings();
        settings.new_chunks_are_fully_committed = true;
        let granule = settings.commit_granule_words;
        let mut cm = expandable_chunk_manager(settings);
        // Enough for the minimum commit, too little for the whole chunk.
        let mut limiter = CommitLimiter::new(2 * granule);
        assert!(word_size_for_level(CHUNK_LEVEL_256K) > 2 * granule);
        assert_eq!(
            cm.get_chunk(&mut limiter, CHUNK_LEVEL_256K, CHUNK_LEVEL_256K, 1),
            Err(AllocationError::CommitLimitReached)
        );
        assert_eq!(cm.vsl().reserved_words(), 0);
        assert_eq!(cm.total_num_free_chunks(), 0);
        assert_eq!(limiter.committed_words(), 0);
    }

    #[test]
    fn test_enlarge_chunk() {
        let mut limiter = CommitLimiter::unlimited();
        let mut cm = expandable_chunk_manager(test_settings());
        let c = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_4K, CHUNK_LEVEL_4K, 1)
            .unwrap();
        assert!(cm.chunk(c).is_leader());
        assert!(cm.attempt_enlarge_chunk(c));
        assert_eq!(cm.chunk(c).level(), CHUNK_LEVEL_8K);
        assert!(cm.chunk(c).is_in_use());
        cm.verify();
    }

    #[test]
    fn test_fully_committed_new_chunks() {
        let mut limiter = CommitLimiter::unlimited();
        let mut settings = test_settings();
        settings.new_chunks_are_fully_committed = true;
        let mut cm = expandable_chunk_manager(settings);
        let c = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_256K, CHUNK_LEVEL_256K, 1)
            .unwrap();
        assert!(cm.chunk(c).is_fully_committed());
    }

    #[test]
    fn test_statistics() {
        let mut limiter = CommitLimiter::unlimited();
        let mut settings = test_settings();
        settings.uncommit_free_chunks = false;
        let mut cm = expandable_chunk_manager(settings);
        let c = cm
            .get_chunk(&mut limiter, CHUNK_LEVEL_1M, CHUNK_LEVEL_1M, 1)
            .unwrap();
        let stats = cm.add_to_statistics();
        // The splinters of the root: one 2M and one 1M chunk, neither committed.
        assert_eq!(stats.total_num_chunks(), 2);
        assert_eq!(stats.num_chunks[CHUNK_LEVEL_2M as usize], 1);
        assert_eq!(stats.num_chunks[CHUNK_LEVEL_1M as usize], 1);
        assert_eq!(stats.total_word_size(), MAX_CHUNK_WORD_SIZE - cm.chunk(c).word_size());
        assert_eq!(stats.total_committed_word_size(), 0);

        cm.return_chunk(&mut limiter, c);
        let stats = cm.add_to_statistics();
        assert_eq!(stats.num_chunks[ROOT_CHUNK_LEVEL as usize], 1);
        assert_eq!(stats.total_committed_word_size(), settings.commit_granule_words);
    }

    #[test]
    fn test_contiguous_root_chunks() {
        let mut limiter = CommitLimiter::unlimited();
        let mut cm = expandable_chunk_manager(test_settings());
        let chunks = cm.get_contiguous_root_chunks(&mut limiter, 3, 10).unwrap();
        assert_eq!(chunks.len(), 3);
        for pair in chunks.windows(2) {
            assert_eq!(cm.chunk(pair[0]).end(), cm.chunk(pair[1]).base());
        }
        let bases: Vec<_> = chunks.iter().map(|&c| cm.chunk(c).base()).collect();
        for c in chunks {
            cm.return_chunk(&mut limiter, c);
        }
        // The free roots are adjacent, so they are reused.
        let again = cm.get_contiguous_root_chunks(&mut limiter, 3, 10).unwrap();
        let again_bases: Vec<_> = again.iter().map(|&c| cm.chunk(c).base()).collect();
        assert_eq!(bases, again_bases);
        cm.verify();
    }
}
