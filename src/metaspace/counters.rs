//! Word counters for used, committed and reserved memory.
//!
//! Every counter is owned by the structure whose memory it describes (an arena, a context, a
//! virtual space list or a commit limiter). All counters are mutated under the metaspace lock,
//! so they are plain integers. Underflow means the accounting is corrupt, and is fatal.

/// A counter of words.
#[derive(Default, Debug)]
pub struct SizeCounter {
    words: usize,
}

impl SizeCounter {
    pub const fn new() -> Self {
        SizeCounter { words: 0 }
    }

    pub fn get(&self) -> usize {
        self.words
    }

    pub fn increment_by(&mut self, words: usize) {
        self.words = self
            .words
            .checked_add(words)
            .unwrap_or_else(|| panic!("counter overflow ({} + {})", self.words, words));
    }

    pub fn decrement_by(&mut self, words: usize) {
        assert!(
            self.words >= words,
            "counter underflow ({} - {})",
            self.words,
            words
        );
        self.words -= words;
    }

    /// Check the counter against a value computed by walking the counted structure.
    pub fn check(&self, expected: usize) {
        assert_eq!(self.words, expected, "counter mismatch");
    }
}

/// Counts a number of memory ranges and their total word size.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRangeCounter {
    count: usize,
    total_size: usize,
}

impl MemRangeCounter {
    pub const fn new() -> Self {
        MemRangeCounter {
            count: 0,
            total_size: 0,
        }
    }

    pub fn add(&mut self, word_size: usize) {
        self.count += 1;
        self.total_size += word_size;
    }

    pub fn sub(&mut self, word_size: usize) {
        assert!(self.count > 0, "range counter underflow");
        assert!(self.total_size >= word_size, "range counter underflow");
        self.count -= 1;
        self.total_size -= word_size;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn check(&self, count: usize, total_size: usize) {
        assert_eq!(self.count, count, "range count mismatch");
        assert_eq!(self.total_size, total_size, "range size mismatch");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_counter() {
        let mut c = SizeCounter::new();
        c.increment_by(10);
        c.decrement_by(4);
        assert_eq!(c.get(), 6);
        c.check(6);
    }

    #[test]
    #[should_panic]
    fn test_size_counter_underflow() {
        let mut c = SizeCounter::new();
        c.increment_by(1);
        c.decrement_by(2);
    }

    #[test]
    fn test_mem_range_counter() {
        let mut c = MemRangeCounter::new();
        c.add(3);
        c.add(5);
        c.sub(3);
        assert_eq!(c.count(), 1);
        assert_eq!(c.total_size(), 5);
    }
}
