use crate::util::Address;
use std::fmt;

/// A contiguous range of memory that is not owned by any structure: `{base, word_size}`.
///
/// A `MetaBlock` never owns memory by itself. Ownership is established by whoever currently
/// holds it (a free block structure, an arena, or the caller). An empty block has a zero base
/// and a zero size, and denotes "no memory".
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct MetaBlock {
    base: Address,
    word_size: usize,
}

impl MetaBlock {
    pub fn new(base: Address, word_size: usize) -> Self {
        debug_assert!(
            base.is_zero() == (word_size == 0),
            "block base and size must be both zero or both non-zero ({}, {})",
            base,
            word_size
        );
        MetaBlock { base, word_size }
    }

    pub const fn empty() -> Self {
        MetaBlock {
            base: Address::ZERO,
            word_size: 0,
        }
    }

    pub fn base(&self) -> Address {
        self.base
    }

    pub fn word_size(&self) -> usize {
        self.word_size
    }

    pub fn end(&self) -> Address {
        self.base.add_words(self.word_size)
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_zero()
    }

    pub fn is_nonempty(&self) -> bool {
        !self.is_empty()
    }

    /// Shrink this block to `head_words` and return the tail as a new block.
    /// Returns an empty block if there is no tail.
    pub fn split_off_tail(&mut self, head_words: usize) -> MetaBlock {
        if self.word_size <= head_words {
            return MetaBlock::empty();
        }
        let tail = MetaBlock::new(self.base.add_words(head_words), self.word_size - head_words);
        self.word_size = head_words;
        if head_words == 0 {
            self.base = Address::ZERO;
        }
        tail
    }

    pub fn is_aligned_base(&self, alignment_words: usize) -> bool {
        self.base
            .is_aligned_to(crate::util::conversions::words_to_bytes(alignment_words))
    }

    /// Returns true if the two blocks share any memory.
    pub fn overlaps(&self, other: &MetaBlock) -> bool {
        self.is_nonempty()
            && other.is_nonempty()
            && self.base < other.end()
            && other.base < self.end()
    }
}

impl fmt::Display for MetaBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "block (@{} word size {})", self.base, self.word_size)
    }
}

impl fmt::Debug for MetaBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
