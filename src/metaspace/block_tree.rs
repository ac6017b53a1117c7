use super::counters::MemRangeCounter;
use super::metablock::MetaBlock;
use crate::util::Address;
use std::collections::BTreeMap;

/// Free blocks of any size, ordered by size. Blocks of equal size share one node.
#[derive(Default)]
pub struct BlockTree {
    nodes: BTreeMap<usize, Vec<Address>>,
    counter: MemRangeCounter,
}

impl BlockTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block(&mut self, block: MetaBlock) {
        assert!(block.is_nonempty());
        self.nodes
            .entry(block.word_size())
            .or_default()
            .push(block.base());
        self.counter.add(block.word_size());
    }

    /// Remove the smallest block that is at least `word_size` large. The block is returned whole.
    pub fn remove_block(&mut self, word_size: usize) -> Option<MetaBlock> {
        let (&size, bases) = self.nodes.range_mut(word_size..).next()?;
        let base = bases.pop()?;
        if bases.is_empty() {
            self.nodes.remove(&size);
        }
        self.counter.sub(size);
        Some(MetaBlock::new(base, size))
    }

    pub fn count(&self) -> usize {
        self.counter.count()
    }

    pub fn total_size(&self) -> usize {
        self.counter.total_size()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn verify(&self) {
        let mut count = 0;
        let mut size = 0;
        for (&word_size, bases) in self.nodes.iter() {
            assert!(!bases.is_empty(), "empty node of size {}", word_size);
            count += bases.len();
            size += bases.len() * word_size;
        }
        self.counter.check(count, size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(addr: usize, word_size: usize) -> MetaBlock {
        MetaBlock::new(unsafe { Address::from_usize(addr) }, word_size)
    }

    #[test]
    fn test_best_fit() {
        let mut tree = BlockTree::new();
        for (i, size) in [100, 40, 1000, 40, 64].into_iter().enumerate() {
            tree.add_block(block(0x10000 * (i + 1), size));
        }
        assert_eq!(tree.count(), 5);
        assert_eq!(tree.total_size(), 1244);

        assert_eq!(tree.remove_block(41).map(|b| b.word_size()), Some(64));
        assert_eq!(tree.remove_block(40).map(|b| b.word_size()), Some(40));
        assert_eq!(tree.remove_block(40).map(|b| b.word_size()), Some(40));
        assert_eq!(tree.remove_block(40).map(|b| b.word_size()), Some(100));
        assert_eq!(tree.remove_block(1001), None);
        assert_eq!(tree.remove_block(1).map(|b| b.word_size()), Some(1000));
        assert!(tree.is_empty());
        tree.verify();
    }

    #[test]
    fn test_same_size_blocks_are_kept_apart() {
        let mut tree = BlockTree::new();
        tree.add_block(block(0x1000, 50));
        tree.add_block(block(0x2000, 50));
        let a = tree.remove_block(50).unwrap();
        let b = tree.remove_block(50).unwrap();
        assert_ne!(a.base(), b.base());
        tree.verify();
    }
}
