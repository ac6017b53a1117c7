use super::chunk_header_pool::ChunkIndex;
use super::chunklevel::*;
use crate::util::Address;
use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChunkState {
    /// In a free list of the chunk manager.
    Free,
    /// Owned by an arena.
    InUse,
    /// The header slot is unused. The chunk was merged into its buddy.
    Dead,
}

/// The header of a chunk.
///
/// Headers live out of line in the [`ChunkHeaderPool`](super::chunk_header_pool::ChunkHeaderPool) and
/// are referred to by [`ChunkIndex`]. A chunk covers `[base, base + word_size)`, of which the prefix
/// `[base, base + committed_words)` is backed by memory and the prefix `[base, base + used_words)` has
/// been handed out.
///
/// Invariant: `used_words <= committed_words <= word_size`.
pub struct Metachunk {
    base: Address,
    level: ChunkLevel,
    state: ChunkState,
    committed_words: usize,
    used_words: usize,
    /// Index of the virtual space node containing this chunk.
    node: usize,
    // Free list links. Only meaningful while the chunk is free.
    pub(super) prev: Option<ChunkIndex>,
    pub(super) next: Option<ChunkIndex>,
}

impl Metachunk {
    pub(super) fn new(base: Address, level: ChunkLevel, node: usize) -> Self {
        check_valid_level(level);
        debug_assert!(base.is_aligned_to(byte_size_for_level(level)));
        Metachunk {
            base,
            level,
            state: ChunkState::Free,
            committed_words: 0,
            used_words: 0,
            node,
            prev: None,
            next: None,
        }
    }

    pub fn base(&self) -> Address {
        self.base
    }

    pub fn level(&self) -> ChunkLevel {
        self.level
    }

    pub fn word_size(&self) -> usize {
        word_size_for_level(self.level)
    }

    pub fn byte_size(&self) -> usize {
        byte_size_for_level(self.level)
    }

    pub fn end(&self) -> Address {
        self.base + self.byte_size()
    }

    /// The bump pointer.
    pub fn top(&self) -> Address {
        self.base.add_words(self.used_words)
    }

    pub fn committed_words(&self) -> usize {
        self.committed_words
    }

    pub fn used_words(&self) -> usize {
        self.used_words
    }

    pub fn free_words(&self) -> usize {
        self.word_size() - self.used_words
    }

    /// Committed but unused words, i.e. what can be allocated without committing.
    pub fn free_below_committed_words(&self) -> usize {
        self.committed_words - self.used_words
    }

    pub fn node(&self) -> usize {
        self.node
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn is_free(&self) -> bool {
        self.state == ChunkState::Free
    }

    pub fn is_in_use(&self) -> bool {
        self.state == ChunkState::InUse
    }

    pub fn is_dead(&self) -> bool {
        self.state == ChunkState::Dead
    }

    pub fn is_root_chunk(&self) -> bool {
        self.level == ROOT_CHUNK_LEVEL
    }

    /// A chunk is the leader of its buddy pair if it occupies the lower half of its parent.
    /// Root chunks have no buddy and are not leaders.
    pub fn is_leader(&self) -> bool {
        !self.is_root_chunk() && self.base.is_aligned_to(self.byte_size() * 2)
    }

    /// The base address of the buddy of this chunk.
    pub fn buddy_base(&self) -> Address {
        debug_assert!(!self.is_root_chunk());
        self.base ^ self.byte_size()
    }

    pub fn is_fully_committed(&self) -> bool {
        self.committed_words == self.word_size()
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr.is_in_range(self.base, self.end())
    }

    pub(super) fn set_free(&mut self) {
        self.state = ChunkState::Free;
    }

    pub(super) fn set_in_use(&mut self) {
        self.state = ChunkState::InUse;
    }

    pub(super) fn set_dead(&mut self) {
        self.state = ChunkState::Dead;
    }

    pub(super) fn set_level(&mut self, level: ChunkLevel) {
        check_valid_level(level);
        self.level = level;
    }

    pub(super) fn set_committed_words(&mut self, words: usize) {
        assert!(words <= self.word_size());
        self.committed_words = words;
    }

    pub(super) fn reset_used_words(&mut self) {
        self.used_words = 0;
    }

    /// Bump-allocate `words` from the committed part of the chunk. Returns `None` if there is
    /// not enough committed room.
    pub fn allocate(&mut self, words: usize) -> Option<Address> {
        if self.free_below_committed_words() < words {
            return None;
        }
        let p = self.top();
        self.used_words += words;
        Some(p)
    }

    pub fn verify(&self) {
        assert!(!self.is_dead(), "dead chunk {}", self);
        check_valid_level(self.level);
        assert!(self.base.is_aligned_to(self.byte_size()), "misaligned chunk {}", self);
        assert!(self.committed_words <= self.word_size(), "{}", self);
        assert!(self.used_words <= self.committed_words, "{}", self);
        if self.is_free() {
            assert_eq!(self.used_words, 0, "free chunk with used words {}", self);
        }
    }
}

impl fmt::Display for Metachunk {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = match self.state {
            ChunkState::Free => 'f',
            ChunkState::InUse => 'u',
            ChunkState::Dead => 'd',
        };
        write!(
            f,
            "@{}, {}, {}, used {}, committed {}",
            self.base,
            state,
            level_to_string(self.level),
            self.used_words,
            self.committed_words
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(raw: usize, level: ChunkLevel) -> Metachunk {
        Metachunk::new(unsafe { Address::from_usize(raw) }, level, 0)
    }

    #[test]
    fn test_allocate_within_committed() {
        let mut c = chunk(MAX_CHUNK_BYTE_SIZE, CHUNK_LEVEL_4K);
        assert!(c.allocate(1).is_none());
        c.set_committed_words(100);
        let p = c.allocate(60).unwrap();
        assert_eq!(p, c.base());
        assert_eq!(c.top(), c.base().add_words(60));
        assert_eq!(c.free_below_committed_words(), 40);
        assert!(c.allocate(41).is_none());
        assert_eq!(c.used_words(), 60);
        c.verify();
    }

    #[test]
    fn test_leader_and_buddy() {
        let lvl = CHUNK_LEVEL_64K;
        let size = byte_size_for_level(lvl);
        let leader = chunk(MAX_CHUNK_BYTE_SIZE, lvl);
        let follower = chunk(MAX_CHUNK_BYTE_SIZE + size, lvl);
        assert!(leader.is_leader());
        assert!(!follower.is_leader());
        assert_eq!(leader.buddy_base(), follower.base());
        assert_eq!(follower.buddy_base(), leader.base());

        let root = chunk(MAX_CHUNK_BYTE_SIZE, ROOT_CHUNK_LEVEL);
        assert!(root.is_root_chunk());
        assert!(!root.is_leader());
    }
}
