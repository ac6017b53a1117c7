use super::counters::SizeCounter;
use super::metaspace_gc::MetaspaceGc;
use super::AllocationError;
use std::sync::Arc;

/// The gate every commit goes through.
///
/// It bounds the committed metadata memory by a hard cap (the maximum metaspace size) and, if it is
/// connected to a [`MetaspaceGc`], by the GC threshold. The limiter also counts the committed words
/// of all virtual space lists that share it.
pub struct CommitLimiter {
    cap_words: usize,
    committed: SizeCounter,
    gc: Option<Arc<MetaspaceGc>>,
}

impl CommitLimiter {
    /// A limiter with only a hard cap.
    pub fn new(cap_words: usize) -> Self {
        CommitLimiter {
            cap_words,
            committed: SizeCounter::new(),
            gc: None,
        }
    }

    /// A limiter that never refuses.
    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    /// A limiter with a hard cap and a GC threshold.
    pub fn with_gc_threshold(cap_words: usize, gc: Arc<MetaspaceGc>) -> Self {
        CommitLimiter {
            cap_words,
            committed: SizeCounter::new(),
            gc: Some(gc),
        }
    }

    pub fn cap_words(&self) -> usize {
        self.cap_words
    }

    pub fn committed_words(&self) -> usize {
        self.committed.get()
    }

    /// How many words may be committed before the limiter refuses.
    pub fn possible_expansion_words(&self) -> usize {
        let below_cap = self.cap_words.saturating_sub(self.committed.get());
        match &self.gc {
            Some(gc) => below_cap.min(gc.allowed_expansion(self.committed.get())),
            None => below_cap,
        }
    }

    /// Check whether `words` more words may be committed. Nothing is recorded.
    pub fn can_commit(&self, words: usize) -> Result<(), AllocationError> {
        if words <= self.possible_expansion_words() {
            return Ok(());
        }
        let below_cap = self.cap_words.saturating_sub(self.committed.get());
        if words > below_cap {
            Err(AllocationError::CommitLimitReached)
        } else {
            Err(AllocationError::GcThresholdReached)
        }
    }

    /// Whether `words` more words may be committed.
    pub fn try_commit(&self, words: usize) -> bool {
        self.can_commit(words).is_ok()
    }

    pub fn increase_committed(&mut self, words: usize) {
        self.committed.increment_by(words);
    }

    pub fn decrease_committed(&mut self, words: usize) {
        self.committed.decrement_by(words);
    }
}
