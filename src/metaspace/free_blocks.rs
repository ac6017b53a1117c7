//! Recycling of deallocated and salvaged blocks.
//!
//! [`FreeBlocks`] keeps three structures. Small non-class blocks go to a [`BinList`]; larger non-class
//! blocks go to a [`BlockTree`]. Blocks that may hold class metadata (they lie in the class space, are
//! aligned for class metadata, and are large enough for the smallest class metadata object) go to a
//! separate tree, so that class metadata requests can be served from them.

use super::bin_list::BinList;
use super::block_tree::BlockTree;
use super::metablock::MetaBlock;
use super::statistics::FreeBlocksStats;
use crate::util::conversions::words_to_bytes;
use crate::util::Address;

/// Where class metadata may live, and what it looks like.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ClassSpaceInfo {
    pub start: Address,
    pub end: Address,
    /// Alignment of class metadata objects, in words.
    pub klass_alignment_words: usize,
    /// The smallest class metadata object, in words.
    pub min_klass_words: usize,
}

impl ClassSpaceInfo {
    /// Whether class metadata could be placed into the block.
    pub fn can_hold_class_metadata(&self, block: &MetaBlock) -> bool {
        block.base().is_in_range(self.start, self.end)
            && block
                .base()
                .is_aligned_to(words_to_bytes(self.klass_alignment_words))
            && block.word_size() >= self.min_klass_words
    }
}

pub struct FreeBlocks {
    small_blocks: BinList,
    non_class_tree: BlockTree,
    class_tree: BlockTree,
    class_space: ClassSpaceInfo,
    wasted_words: usize,
}

impl FreeBlocks {
    /// Blocks smaller than this are not kept.
    pub const MIN_WORD_SIZE: usize = BinList::MIN_WORD_SIZE;

    pub fn new(class_space: ClassSpaceInfo) -> Self {
        FreeBlocks {
            small_blocks: BinList::new(),
            non_class_tree: BlockTree::new(),
            class_tree: BlockTree::new(),
            class_space,
            wasted_words: 0,
        }
    }

    /// Add a block. Blocks too small to be kept are counted as wasted.
    pub fn add_block(&mut self, block: MetaBlock) {
        if block.is_empty() {
            return;
        }
        if block.word_size() < Self::MIN_WORD_SIZE {
            self.wasted_words += block.word_size();
            return;
        }
        if self.class_space.can_hold_class_metadata(&block) {
            self.class_tree.add_block(block);
        } else if block.word_size() <= BinList::MAX_WORD_SIZE {
            self.small_blocks.add_block(block);
        } else {
            self.non_class_tree.add_block(block);
        }
    }

    /// Remove a block of exactly `word_size` words. Class metadata requests are only served from blocks that can
    /// hold class metadata. If the block found is larger, its tail is added back, or counted as wasted if it is
    /// too small to be kept.
    pub fn remove_block(&mut self, word_size: usize, is_class: bool) -> Option<MetaBlock> {
        assert!(word_size >= Self::MIN_WORD_SIZE);
        let mut block = if is_class {
            self.class_tree.remove_block(word_size)
        } else {
            let small = if word_size <= BinList::MAX_WORD_SIZE {
                self.small_blocks.remove_block(word_size)
            } else {
                None
            };
            small.or_else(|| self.non_class_tree.remove_block(word_size))
        }?;
        debug_assert!(block.word_size() >= word_size);

        let tail = block.split_off_tail(word_size);
        if tail.is_nonempty() {
            self.add_block(tail);
        }
        trace!("Reusing {}", block);
        Some(block)
    }

    pub fn class_space(&self) -> ClassSpaceInfo {
        self.class_space
    }

    pub fn total_blocks(&self) -> usize {
        self.small_blocks.count() + self.non_class_tree.count() + self.class_tree.count()
    }

    pub fn total_words(&self) -> usize {
        self.small_blocks.total_size() + self.non_class_tree.total_size() + self.class_tree.total_size()
    }

    pub fn wasted_words(&self) -> usize {
        self.wasted_words
    }

    pub fn is_empty(&self) -> bool {
        self.total_blocks() == 0
    }

    pub fn add_to_statistics(&self) -> FreeBlocksStats {
        FreeBlocksStats {
            small_blocks: self.small_blocks.count(),
            small_words: self.small_blocks.total_size(),
            non_class_blocks: self.non_class_tree.count(),
            non_class_words: self.non_class_tree.total_size(),
            class_blocks: self.class_tree.count(),
            class_words: self.class_tree.total_size(),
            wasted_words: self.wasted_words,
        }
    }

    pub fn verify(&self) {
        self.small_blocks.verify();
        self.non_class_tree.verify();
        self.class_tree.verify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASS_SPACE: usize = 0x1000_0000;

    fn class_space() -> ClassSpaceInfo {
        unsafe {
            ClassSpaceInfo {
                start: Address::from_usize(CLASS_SPACE),
                end: Address::from_usize(2 * CLASS_SPACE),
                klass_alignment_words: 8,
                min_klass_words: 32,
            }
        }
    }

    fn block(addr: usize, word_size: usize) -> MetaBlock {
        MetaBlock::new(unsafe { Address::from_usize(addr) }, word_size)
    }

    #[test]
    fn test_routing() {
        let mut fb = FreeBlocks::new(class_space());
        // Outside the class space.
        fb.add_block(block(0x1000, 10));
        fb.add_block(block(0x2000, 100));
        // Class space, aligned, large enough.
        fb.add_block(block(CLASS_SPACE, 64));
        // Class space, but misaligned or too small.
        fb.add_block(block(CLASS_SPACE + 8, 64));
        fb.add_block(block(CLASS_SPACE + 0x1000, 16));

        let stats = fb.add_to_statistics();
        assert_eq!(stats.class_blocks, 1);
        assert_eq!(stats.small_blocks, 2);
        assert_eq!(stats.non_class_blocks, 2);
        assert_eq!(fb.total_words(), 10 + 100 + 64 + 64 + 16);
        fb.verify();
    }

    #[test]
    fn test_too_small_blocks_are_wasted() {
        let mut fb = FreeBlocks::new(class_space());
        fb.add_block(block(0x1000, 1));
        assert!(fb.is_empty());
        assert_eq!(fb.wasted_words(), 1);
    }

    #[test]
    fn test_class_requests_use_class_blocks_only() {
        let mut fb = FreeBlocks::new(class_space());
        fb.add_block(block(0x2000, 100));
        assert_eq!(fb.remove_block(40, true), None);
        fb.add_block(block(CLASS_SPACE, 64));
        let b = fb.remove_block(40, true).unwrap();
        assert_eq!(b.base(), unsafe { Address::from_usize(CLASS_SPACE) });
        assert_eq!(b.word_size(), 40);
    }

    #[test]
    fn test_split_remainder_is_reinserted() {
        let mut fb = FreeBlocks::new(class_space());
        fb.add_block(block(0x2000, 100));
        let b = fb.remove_block(60, false).unwrap();
        assert_eq!(b.word_size(), 60);
        assert_eq!(fb.total_blocks(), 1);
        assert_eq!(fb.total_words(), 40);
        let rest = fb.remove_block(40, false).unwrap();
        assert_eq!(rest.base(), b.end());
        assert!(fb.is_empty());
    }

    #[test]
    fn test_split_remainder_too_small_is_wasted() {
        let mut fb = FreeBlocks::new(class_space());
        fb.add_block(block(0x2000, 11));
        let b = fb.remove_block(10, false).unwrap();
        assert_eq!(b.word_size(), 10);
        assert!(fb.is_empty());
        assert_eq!(fb.wasted_words(), 1);
    }

    #[test]
    fn test_non_class_request_falls_back_to_tree() {
        let mut fb = FreeBlocks::new(class_space());
        fb.add_block(block(0x2000, 500));
        let b = fb.remove_block(5, false).unwrap();
        assert_eq!(b.word_size(), 5);
        assert_eq!(fb.total_words(), 495);
    }
}
