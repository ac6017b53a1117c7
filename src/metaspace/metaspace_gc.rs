//! The metadata GC threshold.
//!
//! Committing metadata memory beyond `capacity_until_gc` fails with
//! [`AllocationError::GcThresholdReached`](super::AllocationError::GcThresholdReached). The runtime then either
//! raises the threshold (see [`crate::ClassLoaderMetaspace::expand_and_allocate`]) or collects metadata.
//! The threshold is read and raised without the metaspace lock, so it is kept in an atomic.

use crate::util::conversions::{bytes_to_words_down, raw_align_up, words_to_bytes};
use crate::util::options::Options;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Why the threshold was not raised.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IncCapacityError {
    /// Another thread changed the threshold concurrently. A retry may succeed.
    Raced,
    /// The new threshold would exceed the maximum metaspace size. Do not retry.
    AtMaximum,
}

/// A successful threshold increment.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CapacityIncrement {
    pub before: usize,
    pub after: usize,
}

pub struct MetaspaceGc {
    /// In bytes.
    capacity_until_gc: AtomicUsize,
    max_metaspace_size: usize,
    min_expansion: usize,
    max_expansion: usize,
    commit_alignment: usize,
}

impl MetaspaceGc {
    pub fn new(options: &Options) -> Self {
        let commit_alignment = options.commit_granule_size;
        let max_metaspace_size = options.max_metaspace_size;
        let initial = raw_align_up(options.metaspace_size, commit_alignment).min(max_metaspace_size);
        let min_expansion = raw_align_up(options.min_metaspace_expansion, commit_alignment);
        let max_expansion =
            raw_align_up(options.max_metaspace_expansion, commit_alignment).max(min_expansion);
        debug!(
            "Metaspace GC threshold: initial {}, max {}, expansion [{}, {}]",
            initial, max_metaspace_size, min_expansion, max_expansion
        );
        MetaspaceGc {
            capacity_until_gc: AtomicUsize::new(initial),
            max_metaspace_size,
            min_expansion,
            max_expansion,
            commit_alignment,
        }
    }

    /// The current threshold in bytes.
    pub fn capacity_until_gc(&self) -> usize {
        self.capacity_until_gc.load(Ordering::SeqCst)
    }

    pub fn max_metaspace_size(&self) -> usize {
        self.max_metaspace_size
    }

    /// Raise the threshold by `v` bytes.
    pub fn inc_capacity_until_gc(&self, v: usize) -> Result<CapacityIncrement, IncCapacityError> {
        debug_assert!(v % self.commit_alignment == 0);
        let before = self.capacity_until_gc();
        // On overflow, clamp to the largest aligned value.
        let after = before
            .checked_add(v)
            .unwrap_or(usize::MAX & !(self.commit_alignment - 1));
        if after > self.max_metaspace_size {
            return Err(IncCapacityError::AtMaximum);
        }
        match self.capacity_until_gc.compare_exchange(
            before,
            after,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => Ok(CapacityIncrement { before, after }),
            Err(_) => Err(IncCapacityError::Raced),
        }
    }

    /// Lower the threshold by `v` bytes. Returns the new threshold.
    pub fn dec_capacity_until_gc(&self, v: usize) -> usize {
        debug_assert!(v % self.commit_alignment == 0);
        let prev = self.capacity_until_gc.fetch_sub(v, Ordering::SeqCst);
        assert!(prev >= v, "GC threshold underflow ({} - {})", prev, v);
        prev - v
    }

    /// How much to raise the threshold so that an allocation of `bytes` may succeed.
    pub fn delta_capacity_until_gc(&self, bytes: usize) -> usize {
        let delta = raw_align_up(bytes, self.commit_alignment);
        if delta <= self.min_expansion {
            self.min_expansion
        } else if delta <= self.max_expansion {
            self.max_expansion
        } else {
            delta + self.min_expansion
        }
    }

    /// How many words may still be committed, given the currently committed words, before we hit
    /// either the threshold or the maximum metaspace size.
    pub fn allowed_expansion(&self, committed_words: usize) -> usize {
        let committed = words_to_bytes(committed_words);
        let left_until_max = self.max_metaspace_size.saturating_sub(committed);
        let left_until_gc = self.capacity_until_gc().saturating_sub(committed);
        bytes_to_words_down(left_until_max.min(left_until_gc))
    }
}
