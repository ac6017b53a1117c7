use crate::util::constants::*;

/* Alignment */

pub const fn raw_align_up(val: usize, align: usize) -> usize {
    // See https://github.com/rust-lang/rust/blob/e620d0f337d0643c757bab791fc7d88d63217704/src/libcore/alloc.rs#L192
    val.wrapping_add(align).wrapping_sub(1) & !align.wrapping_sub(1)
}

pub const fn raw_align_down(val: usize, align: usize) -> usize {
    val & !align.wrapping_sub(1)
}

pub const fn raw_is_aligned(val: usize, align: usize) -> bool {
    val & align.wrapping_sub(1) == 0
}

/* Conversion */

pub const fn words_to_bytes(words: usize) -> usize {
    words << LOG_BYTES_IN_WORD
}

/// Convert bytes to words. The byte size must be word aligned.
pub const fn bytes_to_words(bytes: usize) -> usize {
    debug_assert!(raw_is_aligned(bytes, BYTES_IN_WORD));
    bytes >> LOG_BYTES_IN_WORD
}

/// Convert bytes to words, dropping a partial trailing word.
pub const fn bytes_to_words_down(bytes: usize) -> usize {
    bytes >> LOG_BYTES_IN_WORD
}

/// log2 of the smallest power of two that is not smaller than `val`. `val` must not be zero.
pub const fn log2_ceil(val: usize) -> u32 {
    debug_assert!(val > 0);
    val.next_power_of_two().trailing_zeros()
}

/// Format a size in bytes with a binary unit suffix, e.g. `4M` or `64K`.
/// Sizes that are not a multiple of the unit are printed in the next smaller unit.
pub fn bytes_to_formatted_string(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["", "K", "M", "G"];
    let mut num = bytes;
    let mut i = 0;
    while num >= BYTES_IN_KBYTE && num % BYTES_IN_KBYTE == 0 && i < UNITS.len() - 1 {
        num >>= LOG_BYTES_IN_KBYTE;
        i += 1;
    }
    format!("{}{}", num, UNITS[i])
}
