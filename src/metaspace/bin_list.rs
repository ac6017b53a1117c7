use super::counters::MemRangeCounter;
use super::metablock::MetaBlock;
use crate::util::Address;

const BIN_COUNT: usize = 32;

/// A list of bins for small blocks, one bin per word size from [`BinList::MIN_WORD_SIZE`] up to
/// [`BinList::MAX_WORD_SIZE`].
///
/// A bitmask tracks which bins are non-empty, so a best-fit lookup is a single bit scan.
pub struct BinList {
    bins: [Vec<Address>; BIN_COUNT],
    mask: u32,
    counter: MemRangeCounter,
}

impl BinList {
    pub const NUM_BINS: usize = BIN_COUNT;
    pub const MIN_WORD_SIZE: usize = 2;
    pub const MAX_WORD_SIZE: usize = Self::MIN_WORD_SIZE + Self::NUM_BINS - 1;

    pub fn new() -> Self {
        BinList {
            bins: std::array::from_fn(|_| vec![]),
            mask: 0,
            counter: MemRangeCounter::new(),
        }
    }

    fn bin_index(word_size: usize) -> usize {
        debug_assert!((Self::MIN_WORD_SIZE..=Self::MAX_WORD_SIZE).contains(&word_size));
        word_size - Self::MIN_WORD_SIZE
    }

    fn word_size_for_bin(index: usize) -> usize {
        index + Self::MIN_WORD_SIZE
    }

    pub fn add_block(&mut self, block: MetaBlock) {
        assert!(block.is_nonempty());
        let index = Self::bin_index(block.word_size());
        self.bins[index].push(block.base());
        self.mask |= 1 << index;
        self.counter.add(block.word_size());
    }

    /// Remove the smallest block that is at least `word_size` large. The block is returned whole; it may be
    /// larger than requested.
    pub fn remove_block(&mut self, word_size: usize) -> Option<MetaBlock> {
        if word_size > Self::MAX_WORD_SIZE {
            return None;
        }
        let from = Self::bin_index(word_size.max(Self::MIN_WORD_SIZE));
        let candidates = self.mask >> from;
        if candidates == 0 {
            return None;
        }
        let index = from + candidates.trailing_zeros() as usize;
        let base = self.bins[index].pop()?;
        if self.bins[index].is_empty() {
            self.mask &= !(1 << index);
        }
        let block_size = Self::word_size_for_bin(index);
        self.counter.sub(block_size);
        Some(MetaBlock::new(base, block_size))
    }

    pub fn count(&self) -> usize {
        self.counter.count()
    }

    pub fn total_size(&self) -> usize {
        self.counter.total_size()
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    pub fn verify(&self) {
        let mut count = 0;
        let mut size = 0;
        for (i, bin) in self.bins.iter().enumerate() {
            assert_eq!(bin.is_empty(), self.mask & (1 << i) == 0, "bin mask is out of sync");
            count += bin.len();
            size += bin.len() * Self::word_size_for_bin(i);
        }
        self.counter.check(count, size);
    }
}

impl Default for BinList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(addr: usize, word_size: usize) -> MetaBlock {
        MetaBlock::new(unsafe { Address::from_usize(addr) }, word_size)
    }

    #[test]
    fn test_exact_fit() {
        let mut bins = BinList::new();
        bins.add_block(block(0x1000, 5));
        bins.add_block(block(0x2000, 7));
        assert_eq!(bins.count(), 2);
        assert_eq!(bins.total_size(), 12);
        let b = bins.remove_block(7).unwrap();
        assert_eq!(b, block(0x2000, 7));
        bins.verify();
    }

    #[test]
    fn test_best_fit() {
        let mut bins = BinList::new();
        bins.add_block(block(0x1000, 20));
        bins.add_block(block(0x2000, 9));
        assert_eq!(bins.remove_block(6), Some(block(0x2000, 9)));
        assert_eq!(bins.remove_block(6), Some(block(0x1000, 20)));
        assert_eq!(bins.remove_block(6), None);
        assert!(bins.is_empty());
        bins.verify();
    }

    #[test]
    fn test_bounds() {
        let mut bins = BinList::new();
        bins.add_block(block(0x1000, BinList::MIN_WORD_SIZE));
        bins.add_block(block(0x2000, BinList::MAX_WORD_SIZE));
        assert_eq!(bins.remove_block(BinList::MAX_WORD_SIZE + 1), None);
        assert_eq!(
            bins.remove_block(BinList::MAX_WORD_SIZE),
            Some(block(0x2000, BinList::MAX_WORD_SIZE))
        );
        assert_eq!(
            bins.remove_block(1),
            Some(block(0x1000, BinList::MIN_WORD_SIZE))
        );
        assert_eq!(bins.count(), 0);
    }
}
