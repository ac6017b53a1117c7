//! The per-loader bump allocator.

use super::arena_growth_policy::ArenaGrowthPolicy;
use super::chunk_header_pool::ChunkIndex;
use super::chunklevel::*;
use super::commit_limiter::CommitLimiter;
use super::context::MetaspaceContext;
use super::counters::SizeCounter;
use super::metablock::MetaBlock;
use super::statistics::ArenaStats;
use super::AllocationError;
use crate::util::conversions::words_to_bytes;
use crate::util::Address;

/// An arena owns a sequence of chunks and bump-allocates from the last one, the current chunk.
///
/// When the current chunk is too small, the arena first tries to grow it in place by merging it with its free
/// buddy. Otherwise it retires the chunk and gets a new one from the chunk manager, sized by its growth policy.
/// What is left in a retired chunk is handed back to the caller as wastage, to be recycled.
///
/// All chunks are returned to the chunk manager by [`MetaspaceArena::release`].
pub struct MetaspaceArena {
    name: &'static str,
    chunks: Vec<ChunkIndex>,
    growth_policy: &'static dyn ArenaGrowthPolicy,
    alignment_words: usize,
    used_words: SizeCounter,
}

impl MetaspaceArena {
    pub fn new(
        name: &'static str,
        growth_policy: &'static dyn ArenaGrowthPolicy,
        alignment_words: usize,
    ) -> Self {
        assert!(alignment_words.is_power_of_two());
        assert!(
            alignment_words <= MIN_CHUNK_WORD_SIZE,
            "allocation alignment larger than the smallest chunk"
        );
        MetaspaceArena {
            name,
            chunks: vec![],
            growth_policy,
            alignment_words,
            used_words: SizeCounter::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn alignment_words(&self) -> usize {
        self.alignment_words
    }

    pub fn used_words(&self) -> usize {
        self.used_words.get()
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> &[ChunkIndex] {
        &self.chunks
    }

    pub fn current_chunk(&self) -> Option<ChunkIndex> {
        self.chunks.last().copied()
    }

    /// The level of the next chunk this arena gets.
    pub fn next_chunk_level(&self) -> ChunkLevel {
        self.growth_policy.level_at_step(self.chunks.len())
    }

    /// Words between `top` and the next address with the arena's alignment.
    fn alignment_gap(&self, top: Address) -> usize {
        let aligned = top.align_up(words_to_bytes(self.alignment_words));
        aligned.words_from(top)
    }

    fn account_used(&mut self, ctx: &mut MetaspaceContext, words: usize) {
        self.used_words.increment_by(words);
        ctx.used_words.increment_by(words);
    }

    /// Allocate `requested` words.
    ///
    /// Returns the allocated block and the wastage: either the alignment gap in front of the block, or what was left
    /// in the chunk that was retired for this allocation. The wastage may be empty.
    pub fn allocate(
        &mut self,
        ctx: &mut MetaspaceContext,
        limiter: &mut CommitLimiter,
        requested: usize,
    ) -> Result<(MetaBlock, MetaBlock), AllocationError> {
        assert!(requested > 0, "zero-sized allocation");

        if let Some(current) = self.current_chunk() {
            let gap = self.alignment_gap(ctx.cm.chunk(current).top());
            let needed = requested + gap;

            let mut current_chunk_too_small = false;
            let mut commit_failure = false;

            if ctx.cm.chunk(current).free_words() < needed {
                if self.attempt_enlarge_current_chunk(ctx, needed) {
                    trace!("{}: enlarged current chunk to {}", self.name, ctx.cm.chunk(current));
                } else {
                    current_chunk_too_small = true;
                }
            }

            if !current_chunk_too_small {
                if let Err(e) = ctx.cm.ensure_committed_additional(limiter, current, needed) {
                    info!(
                        "{}: commit failure (requested {} words): {}",
                        self.name, requested, e
                    );
                    commit_failure = true;
                }
            }

            if !current_chunk_too_small && !commit_failure {
                let Some(p) = ctx.cm.allocate_in_chunk(current, needed) else {
                    panic!("allocation from committed chunk {} failed", ctx.cm.chunk(current));
                };
                self.account_used(ctx, needed);
                let mut wastage = MetaBlock::new(p, needed);
                let result = wastage.split_off_tail(gap);
                self.verify_if_extreme(ctx);
                return Ok((result, wastage));
            }
        }

        // No current chunk, or it was too small, or we could not commit it further.
        match self.allocate_new_chunk(ctx, limiter, requested) {
            Ok(new_chunk) => {
                let wastage = self.salvage_current_chunk(ctx);
                self.chunks.push(new_chunk);
                let Some(p) = ctx.cm.allocate_in_chunk(new_chunk, requested) else {
                    panic!("allocation from new chunk {} failed", ctx.cm.chunk(new_chunk));
                };
                debug_assert!(p.is_aligned_to(words_to_bytes(self.alignment_words)));
                self.account_used(ctx, requested);
                self.verify_if_extreme(ctx);
                Ok((MetaBlock::new(p, requested), wastage))
            }
            Err(e) => {
                info!(
                    "{}: failed to get a new chunk for {} words: {}",
                    self.name, requested, e
                );
                Err(e)
            }
        }
    }

    /// Try to grow the current chunk in place until `requested` more words fit into it.
    fn attempt_enlarge_current_chunk(&self, ctx: &mut MetaspaceContext, requested: usize) -> bool {
        let settings = *ctx.cm.settings();
        if !settings.enlarge_chunks_in_place {
            return false;
        }
        let Some(current) = self.current_chunk() else {
            return false;
        };
        let c = ctx.cm.chunk(current);
        debug_assert!(c.free_words() < requested);
        if c.is_root_chunk() {
            return false;
        }
        let target_size = c.used_words() + requested;
        if target_size > MAX_CHUNK_WORD_SIZE {
            return false;
        }
        let new_level = level_fitting_word_size(target_size);
        debug_assert!(new_level < c.level());
        if c.level() - new_level > settings.max_enlargement_levels {
            return false;
        }
        // Enlarging only works for the leader of a buddy pair.
        if !c.is_leader() {
            return false;
        }
        // Do not grow beyond what the growth policy would give us anyway.
        if self.next_chunk_level() > c.level() {
            return false;
        }
        // Check every buddy first, so the chunk is not left half grown.
        if !ctx.cm.can_enlarge_chunk_to(current, new_level) {
            return false;
        }
        while ctx.cm.chunk(current).level() > new_level {
            let enlarged = ctx.cm.attempt_enlarge_chunk(current);
            debug_assert!(enlarged, "failed to enlarge {}", ctx.cm.chunk(current));
            if !enlarged {
                return false;
            }
        }
        true
    }

    fn allocate_new_chunk(
        &self,
        ctx: &mut MetaspaceContext,
        limiter: &mut CommitLimiter,
        requested: usize,
    ) -> Result<ChunkIndex, AllocationError> {
        assert!(
            requested <= MAX_CHUNK_WORD_SIZE,
            "{}: allocation of {} words is larger than a root chunk",
            self.name,
            requested
        );
        // The smallest chunk that holds the request, and the chunk the growth policy wants if that is larger.
        let max_level = level_fitting_word_size(requested);
        let preferred_level = max_level.min(self.next_chunk_level());
        ctx.cm.get_chunk(limiter, preferred_level, max_level, requested)
    }

    /// Use up what is committed but unused in the current chunk, and return it as a block.
    fn salvage_current_chunk(&mut self, ctx: &mut MetaspaceContext) -> MetaBlock {
        let Some(current) = self.current_chunk() else {
            return MetaBlock::empty();
        };
        let remaining = ctx.cm.chunk(current).free_below_committed_words();
        if remaining == 0 {
            return MetaBlock::empty();
        }
        let Some(p) = ctx.cm.allocate_in_chunk(current, remaining) else {
            panic!("salvaging chunk {} failed", ctx.cm.chunk(current));
        };
        self.account_used(ctx, remaining);
        trace!(
            "{}: salvaged {} words of retired chunk {}",
            self.name,
            remaining,
            ctx.cm.chunk(current)
        );
        MetaBlock::new(p, remaining)
    }

    /// Give all chunks back to the chunk manager.
    pub fn release(&mut self, ctx: &mut MetaspaceContext, limiter: &mut CommitLimiter) {
        debug!(
            "{}: releasing {} chunks, {} used words",
            self.name,
            self.chunks.len(),
            self.used_words.get()
        );
        for c in self.chunks.drain(..) {
            let used = ctx.cm.chunk(c).used_words();
            self.used_words.decrement_by(used);
            ctx.used_words.decrement_by(used);
            ctx.cm.return_chunk(limiter, c);
        }
        self.used_words.check(0);
    }

    /// Whether `addr` lies in one of this arena's chunks.
    pub fn contains(&self, ctx: &MetaspaceContext, addr: Address) -> bool {
        self.chunks.iter().any(|&c| ctx.cm.chunk(c).contains(addr))
    }

    pub fn add_to_statistics(&self, ctx: &MetaspaceContext) -> ArenaStats {
        let mut stats = ArenaStats::default();
        for &c in self.chunks.iter() {
            let chunk = ctx.cm.chunk(c);
            let s = &mut stats.stats[chunk.level() as usize];
            s.num += 1;
            s.word_size += chunk.word_size();
            s.committed_words += chunk.committed_words();
            s.used_words += chunk.used_words();
            // Only the current chunk can still be allocated from.
            if Some(c) == self.current_chunk() {
                s.free_words += chunk.free_below_committed_words();
            } else {
                s.waste_words += chunk.free_below_committed_words();
            }
        }
        stats
    }

    fn verify_if_extreme(&self, ctx: &MetaspaceContext) {
        #[cfg(feature = "extreme_assertions")]
        self.verify(ctx);
        #[cfg(not(feature = "extreme_assertions"))]
        let _ = ctx;
    }

    /// Check that the used words of all chunks add up to the arena's counter.
    pub fn verify(&self, ctx: &MetaspaceContext) {
        let mut used = 0;
        for &c in self.chunks.iter() {
            let chunk = ctx.cm.chunk(c);
            assert!(chunk.is_in_use(), "{}: chunk {} is not in use", self.name, chunk);
            chunk.verify();
            used += chunk.used_words();
        }
        self.used_words.check(used);
    }
}

impl Drop for MetaspaceArena {
    fn drop(&mut self) {
        // An arena must be released before it goes away, or its chunks are lost.
        if !std::thread::panicking() {
            debug_assert!(
                self.chunks.is_empty(),
                "{}: dropped with {} chunks",
                self.name,
                self.chunks.len()
            );
        }
    }
}
