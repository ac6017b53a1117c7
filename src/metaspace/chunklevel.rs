//! Chunk levels.
//!
//! Chunks form a buddy hierarchy with a fixed number of levels. A chunk of level `l` is twice as large
//! as a chunk of level `l + 1`. Level 0 is the root chunk, the largest chunk size (4 MB), which is carved
//! directly from a virtual space node. The highest level is the smallest chunk size (1 KB). The size of
//! a chunk is a pure function of its level.

use crate::util::constants::*;
use crate::util::conversions::log2_ceil;

/// The level of a chunk. Lower levels are larger chunks.
pub type ChunkLevel = u8;

/// log2 of the byte size of a root chunk.
pub const LOG_MAX_CHUNK_BYTE_SIZE: usize = 22;
/// log2 of the word size of a root chunk.
pub const LOG_MAX_CHUNK_WORD_SIZE: usize = LOG_MAX_CHUNK_BYTE_SIZE - LOG_BYTES_IN_WORD as usize;
/// The byte size of a root chunk.
pub const MAX_CHUNK_BYTE_SIZE: usize = 1 << LOG_MAX_CHUNK_BYTE_SIZE;
/// The word size of a root chunk.
pub const MAX_CHUNK_WORD_SIZE: usize = MAX_CHUNK_BYTE_SIZE / BYTES_IN_WORD;

pub const ROOT_CHUNK_LEVEL: ChunkLevel = 0;
pub const LOWEST_CHUNK_LEVEL: ChunkLevel = ROOT_CHUNK_LEVEL;
pub const HIGHEST_CHUNK_LEVEL: ChunkLevel = 12;
pub const NUM_CHUNK_LEVELS: usize = HIGHEST_CHUNK_LEVEL as usize + 1;

/// The byte size of the smallest chunk.
pub const MIN_CHUNK_BYTE_SIZE: usize = MAX_CHUNK_BYTE_SIZE >> HIGHEST_CHUNK_LEVEL;
/// The word size of the smallest chunk.
pub const MIN_CHUNK_WORD_SIZE: usize = MIN_CHUNK_BYTE_SIZE / BYTES_IN_WORD;

pub const CHUNK_LEVEL_4M: ChunkLevel = 0;
pub const CHUNK_LEVEL_2M: ChunkLevel = 1;
pub const CHUNK_LEVEL_1M: ChunkLevel = 2;
pub const CHUNK_LEVEL_512K: ChunkLevel = 3;
pub const CHUNK_LEVEL_256K: ChunkLevel = 4;
pub const CHUNK_LEVEL_128K: ChunkLevel = 5;
pub const CHUNK_LEVEL_64K: ChunkLevel = 6;
pub const CHUNK_LEVEL_32K: ChunkLevel = 7;
pub const CHUNK_LEVEL_16K: ChunkLevel = 8;
pub const CHUNK_LEVEL_8K: ChunkLevel = 9;
pub const CHUNK_LEVEL_4K: ChunkLevel = 10;
pub const CHUNK_LEVEL_2K: ChunkLevel = 11;
pub const CHUNK_LEVEL_1K: ChunkLevel = 12;

const_assert_eq!(MAX_CHUNK_BYTE_SIZE, 4 << LOG_BYTES_IN_MBYTE);
const_assert_eq!(MIN_CHUNK_BYTE_SIZE, BYTES_IN_KBYTE);
const_assert_eq!(CHUNK_LEVEL_1K, HIGHEST_CHUNK_LEVEL);

pub const fn is_valid_level(level: ChunkLevel) -> bool {
    level <= HIGHEST_CHUNK_LEVEL
}

pub fn check_valid_level(level: ChunkLevel) {
    assert!(is_valid_level(level), "invalid chunk level ({})", level);
}

/// The word size of a chunk of the given level.
pub const fn word_size_for_level(level: ChunkLevel) -> usize {
    debug_assert!(is_valid_level(level));
    MAX_CHUNK_WORD_SIZE >> level
}

/// The byte size of a chunk of the given level.
pub const fn byte_size_for_level(level: ChunkLevel) -> usize {
    debug_assert!(is_valid_level(level));
    MAX_CHUNK_BYTE_SIZE >> level
}

/// The level of the smallest chunk that can hold the given word size.
/// Word sizes larger than a root chunk are a programming error.
pub fn level_fitting_word_size(word_size: usize) -> ChunkLevel {
    assert!(
        word_size <= MAX_CHUNK_WORD_SIZE,
        "word size too large ({} > {})",
        word_size,
        MAX_CHUNK_WORD_SIZE
    );
    if word_size == 0 {
        return HIGHEST_CHUNK_LEVEL;
    }
    let l = (LOG_MAX_CHUNK_WORD_SIZE - log2_ceil(word_size) as usize) as ChunkLevel;
    l.min(HIGHEST_CHUNK_LEVEL)
}

/// Print a level together with the chunk size it denotes, e.g. `lv02 (1M)`.
pub fn level_to_string(level: ChunkLevel) -> String {
    format!(
        "lv{:02} ({})",
        level,
        crate::util::conversions::bytes_to_formatted_string(byte_size_for_level(level))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_size_for_level() {
        assert_eq!(word_size_for_level(ROOT_CHUNK_LEVEL), MAX_CHUNK_WORD_SIZE);
        assert_eq!(word_size_for_level(HIGHEST_CHUNK_LEVEL), MIN_CHUNK_WORD_SIZE);
        for l in LOWEST_CHUNK_LEVEL..HIGHEST_CHUNK_LEVEL {
            assert_eq!(word_size_for_level(l), word_size_for_level(l + 1) * 2);
        }
        assert_eq!(byte_size_for_level(CHUNK_LEVEL_64K), 64 * BYTES_IN_KBYTE);
    }

    #[test]
    fn test_level_fitting_word_size() {
        assert_eq!(level_fitting_word_size(0), HIGHEST_CHUNK_LEVEL);
        assert_eq!(level_fitting_word_size(1), HIGHEST_CHUNK_LEVEL);
        assert_eq!(level_fitting_word_size(MIN_CHUNK_WORD_SIZE), HIGHEST_CHUNK_LEVEL);
        assert_eq!(
            level_fitting_word_size(MIN_CHUNK_WORD_SIZE + 1),
            HIGHEST_CHUNK_LEVEL - 1
        );
        assert_eq!(level_fitting_word_size(MAX_CHUNK_WORD_SIZE), ROOT_CHUNK_LEVEL);
        assert_eq!(
            level_fitting_word_size(MAX_CHUNK_WORD_SIZE / 2 + 1),
            ROOT_CHUNK_LEVEL
        );
        for l in LOWEST_CHUNK_LEVEL..=HIGHEST_CHUNK_LEVEL {
            let ws = word_size_for_level(l);
            assert_eq!(level_fitting_word_size(ws), l);
            if ws > MIN_CHUNK_WORD_SIZE {
                assert_eq!(level_fitting_word_size(ws - 1), l);
            }
        }
    }

    #[test]
    #[should_panic]
    fn test_level_fitting_too_large() {
        level_fitting_word_size(MAX_CHUNK_WORD_SIZE + 1);
    }

    #[test]
    fn test_level_to_string() {
        assert_eq!(level_to_string(ROOT_CHUNK_LEVEL), "lv00 (4M)");
        assert_eq!(level_to_string(CHUNK_LEVEL_1K), "lv12 (1K)");
    }
}
