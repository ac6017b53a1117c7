use crate::util::constants::BITS_IN_WORD;
use crate::util::Address;

/// One bit per commit granule of a virtual space node. A set bit means the granule is committed.
pub struct CommitMask {
    base: Address,
    word_size: usize,
    words_per_granule: usize,
    bits: Vec<usize>,
}

impl CommitMask {
    pub fn new(base: Address, word_size: usize, words_per_granule: usize) -> Self {
        debug_assert!(words_per_granule.is_power_of_two());
        debug_assert!(word_size % words_per_granule == 0);
        let num_granules = word_size / words_per_granule;
        CommitMask {
            base,
            word_size,
            words_per_granule,
            bits: vec![0; num_granules.div_ceil(BITS_IN_WORD)],
        }
    }

    pub fn num_granules(&self) -> usize {
        self.word_size / self.words_per_granule
    }

    pub fn words_per_granule(&self) -> usize {
        self.words_per_granule
    }

    fn granule_index(&self, addr: Address) -> usize {
        debug_assert!(addr >= self.base);
        addr.words_from(self.base) / self.words_per_granule
    }

    /// The granule range `[from, to)` covered by the word range starting at `start`.
    /// The word range must be granule aligned.
    fn granule_range(&self, start: Address, word_size: usize) -> (usize, usize) {
        debug_assert!(start.words_from(self.base) % self.words_per_granule == 0);
        debug_assert!(word_size % self.words_per_granule == 0);
        let from = self.granule_index(start);
        let to = from + word_size / self.words_per_granule;
        debug_assert!(to <= self.num_granules());
        (from, to)
    }

    pub fn is_granule_committed(&self, granule: usize) -> bool {
        self.bits[granule / BITS_IN_WORD] & (1 << (granule % BITS_IN_WORD)) != 0
    }

    fn set_granule(&mut self, granule: usize, committed: bool) -> bool {
        let word = &mut self.bits[granule / BITS_IN_WORD];
        let mask = 1 << (granule % BITS_IN_WORD);
        let old = *word & mask != 0;
        if committed {
            *word |= mask;
        } else {
            *word &= !mask;
        }
        old != committed
    }

    pub fn is_committed_address(&self, addr: Address) -> bool {
        self.is_granule_committed(self.granule_index(addr))
    }

    /// Committed words in the given granule-aligned range.
    pub fn get_committed_size_in_range(&self, start: Address, word_size: usize) -> usize {
        let (from, to) = self.granule_range(start, word_size);
        (from..to).filter(|&g| self.is_granule_committed(g)).count() * self.words_per_granule
    }

    pub fn get_committed_size(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum::<usize>() * self.words_per_granule
    }

    /// Mark a granule-aligned range as committed. Returns the number of words that were not committed before.
    pub fn mark_range_as_committed(&mut self, start: Address, word_size: usize) -> usize {
        let (from, to) = self.granule_range(start, word_size);
        (from..to).filter(|&g| self.set_granule(g, true)).count() * self.words_per_granule
    }

    /// Mark a granule-aligned range as uncommitted. Returns the number of words that were committed before.
    pub fn mark_range_as_uncommitted(&mut self, start: Address, word_size: usize) -> usize {
        let (from, to) = self.granule_range(start, word_size);
        (from..to).filter(|&g| self.set_granule(g, false)).count() * self.words_per_granule
    }

    /// Runs of uncommitted granules in `[from, to)`, as granule index ranges.
    pub fn uncommitted_runs(&self, start: Address, word_size: usize) -> Vec<(usize, usize)> {
        let (from, to) = self.granule_range(start, word_size);
        let mut runs = vec![];
        let mut g = from;
        while g < to {
            if self.is_granule_committed(g) {
                g += 1;
                continue;
            }
            let run_start = g;
            while g < to && !self.is_granule_committed(g) {
                g += 1;
            }
            runs.push((run_start, g));
        }
        runs
    }

    /// The start address of a granule.
    pub fn granule_address(&self, granule: usize) -> Address {
        self.base.add_words(granule * self.words_per_granule)
    }
}
