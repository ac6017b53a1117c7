//! Read-only reports on the allocator.
//!
//! All statistics are snapshots taken under the metaspace lock. Sizes are in words.

use super::chunklevel::*;
use super::MetadataType;
use enum_map::EnumMap;
use std::fmt;
use std::ops::{Add, AddAssign};

/// Used, committed and reserved words of a space.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MetaspaceUsage {
    pub used_words: usize,
    pub committed_words: usize,
    pub reserved_words: usize,
}

impl Add for MetaspaceUsage {
    type Output = MetaspaceUsage;

    fn add(self, other: MetaspaceUsage) -> MetaspaceUsage {
        MetaspaceUsage {
            used_words: self.used_words + other.used_words,
            committed_words: self.committed_words + other.committed_words,
            reserved_words: self.reserved_words + other.reserved_words,
        }
    }
}

impl fmt::Display for MetaspaceUsage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "used {}, committed {}, reserved {} words",
            self.used_words, self.committed_words, self.reserved_words
        )
    }
}

/// Statistics of the in-use chunks of one level.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct InUseChunkStats {
    pub num: usize,
    pub word_size: usize,
    pub committed_words: usize,
    pub used_words: usize,
    /// Committed but not used.
    pub free_words: usize,
    /// Words wasted in the chunk. Only chunks that are no longer current have waste.
    pub waste_words: usize,
}

impl AddAssign for InUseChunkStats {
    fn add_assign(&mut self, other: InUseChunkStats) {
        self.num += other.num;
        self.word_size += other.word_size;
        self.committed_words += other.committed_words;
        self.used_words += other.used_words;
        self.free_words += other.free_words;
        self.waste_words += other.waste_words;
    }
}

/// The chunks of an arena, per level.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    pub stats: [InUseChunkStats; NUM_CHUNK_LEVELS],
}

impl ArenaStats {
    pub fn totals(&self) -> InUseChunkStats {
        let mut total = InUseChunkStats::default();
        for s in self.stats.iter() {
            total += *s;
        }
        total
    }
}

impl AddAssign for ArenaStats {
    fn add_assign(&mut self, other: ArenaStats) {
        for (a, b) in self.stats.iter_mut().zip(other.stats) {
            *a += b;
        }
    }
}

/// The free chunks of a chunk manager, per level.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkManagerStats {
    pub num_chunks: [usize; NUM_CHUNK_LEVELS],
    pub committed_word_size: [usize; NUM_CHUNK_LEVELS],
}

impl ChunkManagerStats {
    pub fn total_num_chunks(&self) -> usize {
        self.num_chunks.iter().sum()
    }

    pub fn total_word_size(&self) -> usize {
        self.num_chunks
            .iter()
            .enumerate()
            .map(|(l, n)| n * word_size_for_level(l as ChunkLevel))
            .sum()
    }

    pub fn total_committed_word_size(&self) -> usize {
        self.committed_word_size.iter().sum()
    }
}

impl fmt::Display for ChunkManagerStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for l in LOWEST_CHUNK_LEVEL..=HIGHEST_CHUNK_LEVEL {
            let i = l as usize;
            if self.num_chunks[i] > 0 {
                writeln!(
                    f,
                    "{}: {} chunks, {} words committed",
                    level_to_string(l),
                    self.num_chunks[i],
                    self.committed_word_size[i]
                )?;
            }
        }
        write!(
            f,
            "total: {} chunks, {} words, {} words committed",
            self.total_num_chunks(),
            self.total_word_size(),
            self.total_committed_word_size()
        )
    }
}

/// The blocks held by a [`FreeBlocks`](super::free_blocks::FreeBlocks) structure.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FreeBlocksStats {
    pub small_blocks: usize,
    pub small_words: usize,
    pub non_class_blocks: usize,
    pub non_class_words: usize,
    pub class_blocks: usize,
    pub class_words: usize,
    /// Words that were too small to keep.
    pub wasted_words: usize,
}

impl FreeBlocksStats {
    pub fn total_blocks(&self) -> usize {
        self.small_blocks + self.non_class_blocks + self.class_blocks
    }

    pub fn total_words(&self) -> usize {
        self.small_words + self.non_class_words + self.class_words
    }
}

impl AddAssign for FreeBlocksStats {
    fn add_assign(&mut self, other: FreeBlocksStats) {
        self.small_blocks += other.small_blocks;
        self.small_words += other.small_words;
        self.non_class_blocks += other.non_class_blocks;
        self.non_class_words += other.non_class_words;
        self.class_blocks += other.class_blocks;
        self.class_words += other.class_words;
        self.wasted_words += other.wasted_words;
    }
}

/// Statistics of one class loader metaspace, or the sum over several.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClmsStats {
    pub arena_stats: EnumMap<MetadataType, ArenaStats>,
    pub free_blocks: FreeBlocksStats,
}

impl ClmsStats {
    pub fn totals(&self) -> InUseChunkStats {
        let mut total = InUseChunkStats::default();
        for (_, s) in self.arena_stats.iter() {
            total += s.totals();
        }
        total
    }
}

impl AddAssign<&ClmsStats> for ClmsStats {
    fn add_assign(&mut self, other: &ClmsStats) {
        for (t, s) in other.arena_stats.iter() {
            self.arena_stats[t] += *s;
        }
        self.free_blocks += other.free_blocks;
    }
}

const HISTOGRAM_INTERVALS: usize = 512;

/// A histogram of requested allocation sizes.
#[derive(Clone, Debug)]
pub struct Histogram {
    counts: Box<[usize; HISTOGRAM_INTERVALS]>,
    peak_word_size: usize,
}

impl Histogram {
    pub const NUM_INTERVALS: usize = HISTOGRAM_INTERVALS;
    pub const INTERVAL_WORDS: usize = 8;

    pub fn new() -> Self {
        Histogram {
            counts: Box::new([0; Self::NUM_INTERVALS]),
            peak_word_size: 0,
        }
    }

    /// The interval a word size falls into. The last interval takes everything beyond the others.
    pub fn interval_for(word_size: usize) -> usize {
        (word_size / Self::INTERVAL_WORDS).min(Self::NUM_INTERVALS - 1)
    }

    pub fn register(&mut self, word_size: usize) {
        self.counts[Self::interval_for(word_size)] += 1;
        self.peak_word_size = self.peak_word_size.max(word_size);
    }

    pub fn count(&self, interval: usize) -> usize {
        self.counts[interval]
    }

    pub fn total_count(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn peak_word_size(&self) -> usize {
        self.peak_word_size
    }

    /// Non-empty intervals as `(first word size, count)`.
    pub fn non_empty_intervals(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &n)| n > 0)
            .map(|(i, &n)| (i * Self::INTERVAL_WORDS, n))
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (from, n) in self.non_empty_intervals() {
            writeln!(f, "[{}, {}): {}", from, from + Self::INTERVAL_WORDS, n)?;
        }
        write!(f, "peak: {} words", self.peak_word_size)
    }
}
