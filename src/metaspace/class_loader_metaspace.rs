use super::arena_growth_policy::policy_for_space_type;
use super::commit_limiter::CommitLimiter;
use super::context::MetaspaceContext;
use super::free_blocks::{ClassSpaceInfo, FreeBlocks};
use super::metablock::MetaBlock;
use super::metaspace_arena::MetaspaceArena;
use super::statistics::ClmsStats;
use super::{AllocationError, MetadataType, MetaspaceType};
use crate::util::constants::ALLOCATION_ALIGNMENT_WORDS;
use crate::util::conversions::raw_align_up;
use crate::util::Address;
use enum_map::EnumMap;

/// The metaspace of one class loader: a class arena, a non-class arena, and the free blocks both of them recycle
/// into.
///
/// Requests are served from the free blocks first, and from the arena of their kind otherwise. This type holds
/// no lock. The caller must hold the metaspace lock and pass in the contexts and the commit limiter.
pub struct ClassLoaderMetaspaceImpl {
    space_type: MetaspaceType,
    arenas: EnumMap<MetadataType, MetaspaceArena>,
    free_blocks: FreeBlocks,
}

/// The size that is actually allocated for a request of `word_size` words. Every block must be large enough to be
/// kept in the free blocks once it is deallocated.
pub fn raw_word_size(word_size: usize) -> usize {
    raw_align_up(
        word_size.max(FreeBlocks::MIN_WORD_SIZE),
        ALLOCATION_ALIGNMENT_WORDS,
    )
}

impl ClassLoaderMetaspaceImpl {
    pub fn new(space_type: MetaspaceType, class_space: ClassSpaceInfo) -> Self {
        let non_class = MetaspaceArena::new(
            "non-class arena",
            policy_for_space_type(space_type, MetadataType::NonClass),
            ALLOCATION_ALIGNMENT_WORDS,
        );
        let class = MetaspaceArena::new(
            "class arena",
            policy_for_space_type(space_type, MetadataType::Class),
            class_space.klass_alignment_words.max(ALLOCATION_ALIGNMENT_WORDS),
        );
        debug!("Created {} class loader metaspace", space_type);
        ClassLoaderMetaspaceImpl {
            space_type,
            arenas: EnumMap::from_array([non_class, class]),
            free_blocks: FreeBlocks::new(class_space),
        }
    }

    pub fn space_type(&self) -> MetaspaceType {
        self.space_type
    }

    pub fn arena(&self, kind: MetadataType) -> &MetaspaceArena {
        &self.arenas[kind]
    }

    pub fn free_blocks(&self) -> &FreeBlocks {
        &self.free_blocks
    }

    /// Allocate `word_size` words of metadata of the given kind.
    pub fn allocate(
        &mut self,
        contexts: &mut EnumMap<MetadataType, MetaspaceContext>,
        limiter: &mut CommitLimiter,
        word_size: usize,
        kind: MetadataType,
    ) -> Result<Address, AllocationError> {
        let raw = raw_word_size(word_size);

        if let Some(block) = self.free_blocks.remove_block(raw, kind.is_class()) {
            debug_assert_eq!(block.word_size(), raw);
            trace!("Allocated {} words at {} from free blocks", raw, block.base());
            contexts[kind].histogram.register(word_size);
            return Ok(block.base());
        }

        let (block, wastage) = self.arenas[kind].allocate(&mut contexts[kind], limiter, raw)?;
        if wastage.is_nonempty() {
            self.free_blocks.add_block(wastage);
        }
        trace!("Allocated {} words at {} from the {}", raw, block.base(), kind);
        contexts[kind].histogram.register(word_size);
        Ok(block.base())
    }

    /// Give back a block that was allocated with `word_size`. The block is recycled right away.
    pub fn deallocate(&mut self, addr: Address, word_size: usize, kind: MetadataType) {
        let raw = raw_word_size(word_size);
        let block = MetaBlock::new(addr, raw);
        if cfg!(debug_assertions) && kind.is_class() {
            let cs = self.free_blocks.class_space();
            assert!(
                addr.is_in_range(cs.start, cs.end),
                "class metadata {} outside of the class space",
                block
            );
        }
        trace!("Deallocated {}", block);
        self.free_blocks.add_block(block);
    }

    /// Whether `addr` lies in a chunk of this loader.
    pub fn contains(&self, contexts: &EnumMap<MetadataType, MetaspaceContext>, addr: Address) -> bool {
        self.arenas
            .iter()
            .any(|(kind, arena)| arena.contains(&contexts[kind], addr))
    }

    /// Return all chunks to the chunk managers. Blocks held by the free blocks die with them.
    pub fn release(
        &mut self,
        contexts: &mut EnumMap<MetadataType, MetaspaceContext>,
        limiter: &mut CommitLimiter,
    ) {
        debug!("Releasing {} class loader metaspace", self.space_type);
        for (kind, arena) in self.arenas.iter_mut() {
            arena.release(&mut contexts[kind], limiter);
        }
        self.free_blocks = FreeBlocks::new(self.free_blocks.class_space());
    }

    pub fn add_to_statistics(&self, contexts: &EnumMap<MetadataType, MetaspaceContext>) -> ClmsStats {
        let mut stats = ClmsStats::default();
        for (kind, arena) in self.arenas.iter() {
            stats.arena_stats[kind] = arena.add_to_statistics(&contexts[kind]);
        }
        stats.free_blocks = self.free_blocks.add_to_statistics();
        stats
    }

    pub fn verify(&self, contexts: &EnumMap<MetadataType, MetaspaceContext>) {
        for (kind, arena) in self.arenas.iter() {
            arena.verify(&contexts[kind]);
        }
        self.free_blocks.verify();
    }
}
