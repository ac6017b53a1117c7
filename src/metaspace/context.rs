use super::chunk_manager::ChunkManager;
use super::commit_limiter::CommitLimiter;
use super::counters::SizeCounter;
use super::settings::Settings;
use super::statistics::{Histogram, MetaspaceUsage};
use super::virtual_space_list::VirtualSpaceList;
use super::AllocationError;
use crate::util::conversions::bytes_to_words;
use crate::util::os::Reservation;

/// One metadata space: a virtual space list, the chunk manager on top of it, and the counters of all arenas that
/// allocate from it.
pub struct MetaspaceContext {
    name: &'static str,
    pub(super) cm: ChunkManager,
    /// Words used by all arenas of this context.
    pub(super) used_words: SizeCounter,
    pub(super) histogram: Histogram,
}

impl MetaspaceContext {
    /// A context that reserves more memory whenever it needs to.
    pub fn new_expandable(name: &'static str, settings: Settings) -> Self {
        let vsl = VirtualSpaceList::new_expandable(
            name,
            settings.virtual_space_node_default_word_size,
            settings.commit_granule_words,
        );
        Self::new(name, vsl, settings)
    }

    /// A context confined to the given reservation.
    pub fn new_fixed(name: &'static str, reservation: Reservation, settings: Settings) -> Self {
        let vsl = VirtualSpaceList::new_fixed(name, reservation, settings.commit_granule_words);
        Self::new(name, vsl, settings)
    }

    /// A context confined to a fresh reservation of `byte_size` bytes.
    pub fn reserve_fixed(
        name: &'static str,
        byte_size: usize,
        settings: Settings,
    ) -> Result<Self, AllocationError> {
        let reservation =
            Reservation::new(byte_size, super::chunklevel::MAX_CHUNK_BYTE_SIZE).map_err(|e| {
                error!("Failed to reserve {} bytes for {}: {}", byte_size, name, e);
                AllocationError::VirtualSpaceExhausted
            })?;
        debug!(
            "{}: reserved {} words at {}",
            name,
            bytes_to_words(byte_size),
            reservation.start()
        );
        Ok(Self::new_fixed(name, reservation, settings))
    }

    fn new(name: &'static str, vsl: VirtualSpaceList, settings: Settings) -> Self {
        MetaspaceContext {
            name,
            cm: ChunkManager::new(name, vsl, settings),
            used_words: SizeCounter::new(),
            histogram: Histogram::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn chunk_manager(&self) -> &ChunkManager {
        &self.cm
    }

    pub fn vsl(&self) -> &VirtualSpaceList {
        self.cm.vsl()
    }

    pub fn used_words(&self) -> usize {
        self.used_words.get()
    }

    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    pub fn usage(&self) -> MetaspaceUsage {
        MetaspaceUsage {
            used_words: self.used_words.get(),
            committed_words: self.vsl().committed_words(),
            reserved_words: self.vsl().reserved_words(),
        }
    }

    /// Uncommit all free chunks. Returns the number of words uncommitted.
    pub fn purge(&mut self, limiter: &mut CommitLimiter) -> usize {
        self.cm.purge(limiter)
    }

    pub fn verify(&self) {
        self.cm.verify();
        let in_use: usize = self
            .cm
            .pool()
            .iter()
            .filter(|(_, c)| c.is_in_use())
            .map(|(_, c)| c.used_words())
            .sum();
        // Used words of chunks handed out directly by the chunk manager are not counted here.
        assert!(self.used_words.get() <= in_use, "{}: used words exceed in-use chunks", self.name);
    }
}
