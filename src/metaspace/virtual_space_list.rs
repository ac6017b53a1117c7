use super::chunk_header_pool::{ChunkHeaderPool, ChunkIndex};
use super::chunklevel::*;
use super::commit_limiter::CommitLimiter;
use super::counters::SizeCounter;
use super::virtual_space_node::VirtualSpaceNode;
use super::AllocationError;
use crate::util::os::Reservation;
use crate::util::Address;
use std::collections::VecDeque;

/// A list of [`VirtualSpaceNode`]s that hands out root chunks.
///
/// An expandable list reserves a new node whenever the current one (the last one) is full. A fixed list wraps one
/// reservation given to it at construction, and fails once that is used up.
pub struct VirtualSpaceList {
    name: &'static str,
    nodes: Vec<VirtualSpaceNode>,
    can_expand: bool,
    node_word_size: usize,
    commit_granule_words: usize,
    /// Root chunks carved from nodes that were retired early, to be handed out before carving new ones.
    salvaged_root_chunks: VecDeque<ChunkIndex>,
    reserved_words: SizeCounter,
    committed_words: SizeCounter,
}

impl VirtualSpaceList {
    /// An expandable list. Nodes are reserved lazily, with `node_word_size` words each.
    pub fn new_expandable(
        name: &'static str,
        node_word_size: usize,
        commit_granule_words: usize,
    ) -> Self {
        assert!(node_word_size > 0 && node_word_size % MAX_CHUNK_WORD_SIZE == 0);
        VirtualSpaceList {
            name,
            nodes: vec![],
            can_expand: true,
            node_word_size,
            commit_granule_words,
            salvaged_root_chunks: VecDeque::new(),
            reserved_words: SizeCounter::new(),
            committed_words: SizeCounter::new(),
        }
    }

    /// A fixed list over the given reservation.
    pub fn new_fixed(
        name: &'static str,
        reservation: Reservation,
        commit_granule_words: usize,
    ) -> Self {
        let node = VirtualSpaceNode::from_reservation(reservation, commit_granule_words, 0);
        let mut reserved_words = SizeCounter::new();
        reserved_words.increment_by(node.word_size());
        VirtualSpaceList {
            name,
            node_word_size: node.word_size(),
            nodes: vec![node],
            can_expand: false,
            commit_granule_words,
            salvaged_root_chunks: VecDeque::new(),
            reserved_words,
            committed_words: SizeCounter::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn reserved_words(&self) -> usize {
        self.reserved_words.get()
    }

    pub fn committed_words(&self) -> usize {
        self.committed_words.get()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, index: usize) -> &VirtualSpaceNode {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut VirtualSpaceNode {
        &mut self.nodes[index]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &VirtualSpaceNode> {
        self.nodes.iter()
    }

    pub fn num_salvaged_root_chunks(&self) -> usize {
        self.salvaged_root_chunks.len()
    }

    pub fn is_salvaged(&self, c: ChunkIndex) -> bool {
        self.salvaged_root_chunks.contains(&c)
    }

    /// Whether `addr` lies in any node of this list.
    pub fn contains(&self, addr: Address) -> bool {
        self.nodes.iter().any(|n| n.contains(addr))
    }

    fn create_new_node(&mut self, word_size: usize) -> Result<(), AllocationError> {
        debug_assert!(self.can_expand);
        let index = self.nodes.len();
        let node = VirtualSpaceNode::create(word_size, self.commit_granule_words, index)?;
        self.reserved_words.increment_by(node.word_size());
        self.nodes.push(node);
        debug!(
            "{}: added node {} ({} words), reserved {} words",
            self.name,
            index,
            word_size,
            self.reserved_words()
        );
        Ok(())
    }

    /// Hand out a free, uncommitted root chunk.
    ///
    /// Salvaged root chunks go first, then the current node is carved. An expandable list reserves a new node
    /// if the current node is full.
    pub fn allocate_root_chunk(
        &mut self,
        pool: &mut ChunkHeaderPool,
    ) -> Result<ChunkIndex, AllocationError> {
        if let Some(c) = self.salvaged_root_chunks.pop_front() {
            return Ok(c);
        }
        if let Some(c) = self
            .nodes
            .last_mut()
            .and_then(|node| node.allocate_root_chunk(pool))
        {
            return Ok(c);
        }
        if !self.can_expand {
            info!("{}: virtual space exhausted", self.name);
            return Err(AllocationError::VirtualSpaceExhausted);
        }
        self.create_new_node(self.node_word_size)?;
        let node = self
            .nodes
            .last_mut()
            .unwrap_or_else(|| panic!("no current node after expansion"));
        Ok(node
            .allocate_root_chunk(pool)
            .unwrap_or_else(|| panic!("a new node is too small for a root chunk")))
    }

    /// Hand out `n` free, uncommitted root chunks that are contiguous in address order.
    ///
    /// If the current node cannot hold them, its remaining root chunks are carved and salvaged, and a new node
    /// large enough for all `n` is reserved. A fixed list fails instead.
    pub fn allocate_multiple_root_chunks(
        &mut self,
        pool: &mut ChunkHeaderPool,
        n: usize,
    ) -> Result<Vec<ChunkIndex>, AllocationError> {
        assert!(n > 0);
        if n == 1 {
            return self.allocate_root_chunk(pool).map(|c| vec![c]);
        }
        let fits_current = self
            .nodes
            .last()
            .is_some_and(|node| node.num_free_root_chunks() >= n);
        if !fits_current {
            if !self.can_expand {
                info!("{}: no room for {} adjacent root chunks", self.name, n);
                return Err(AllocationError::VirtualSpaceExhausted);
            }
            self.salvage_current_node(pool);
            self.create_new_node((n * MAX_CHUNK_WORD_SIZE).max(self.node_word_size))?;
        }
        let node = self
            .nodes
            .last_mut()
            .unwrap_or_else(|| panic!("no current node"));
        let chunks: Vec<ChunkIndex> = (0..n)
            .map_while(|_| node.allocate_root_chunk(pool))
            .collect();
        assert_eq!(chunks.len(), n, "node ran out of root chunks");
        Ok(chunks)
    }

    /// Carve all remaining root chunks of the current node into the salvage pool.
    fn salvage_current_node(&mut self, pool: &mut ChunkHeaderPool) {
        if let Some(node) = self.nodes.last_mut() {
            let mut salvaged = 0;
            while let Some(c) = node.allocate_root_chunk(pool) {
                self.salvaged_root_chunks.push_back(c);
                salvaged += 1;
            }
            if salvaged > 0 {
                debug!(
                    "{}: salvaged {} root chunks of node {}",
                    self.name,
                    salvaged,
                    node.index()
                );
            }
        }
    }

    /// Commit `[start, start + word_size)` in the given node. See [`VirtualSpaceNode::ensure_range_is_committed`].
    pub fn ensure_range_is_committed(
        &mut self,
        limiter: &mut CommitLimiter,
        node: usize,
        start: Address,
        word_size: usize,
    ) -> Result<(), AllocationError> {
        self.nodes[node].ensure_range_is_committed(
            limiter,
            &mut self.committed_words,
            start,
            word_size,
        )
    }

    /// Uncommit `[start, start + word_size)` in the given node. See [`VirtualSpaceNode::uncommit_range`].
    pub fn uncommit_range(
        &mut self,
        limiter: &mut CommitLimiter,
        node: usize,
        start: Address,
        word_size: usize,
    ) -> usize {
        self.nodes[node].uncommit_range(limiter, &mut self.committed_words, start, word_size)
    }

    pub fn verify(&self, pool: &ChunkHeaderPool) {
        let mut reserved = 0;
        let mut committed = 0;
        for (i, node) in self.nodes.iter().enumerate() {
            assert_eq!(node.index(), i);
            node.verify(pool);
            reserved += node.word_size();
            committed += node.committed_words();
        }
        self.reserved_words.check(reserved);
        self.committed_words.check(committed);
        for &c in self.salvaged_root_chunks.iter() {
            assert!(pool[c].is_root_chunk() && pool[c].is_free());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRANULE_WORDS: usize = 8 * 1024;

    #[test]
    fn test_expandable_list_grows() {
        let mut pool = ChunkHeaderPool::new();
        let mut vsl = VirtualSpaceList::new_expandable("test", 2 * MAX_CHUNK_WORD_SIZE, GRANULE_WORDS);
        assert_eq!(vsl.reserved_words(), 0);
        for _ in 0..3 {
            vsl.allocate_root_chunk(&mut pool).unwrap();
        }
        assert_eq!(vsl.num_nodes(), 2);
        assert_eq!(vsl.reserved_words(), 4 * MAX_CHUNK_WORD_SIZE);
        vsl.verify(&pool);
    }

    #[test]
    fn test_fixed_list_exhausts() {
        let mut pool = ChunkHeaderPool::new();
        let rs = Reservation::new(2 * MAX_CHUNK_BYTE_SIZE, MAX_CHUNK_BYTE_SIZE).unwrap();
        let start = rs.start();
        let mut vsl = VirtualSpaceList::new_fixed("test", rs, GRANULE_WORDS);
        let a = vsl.allocate_root_chunk(&mut pool).unwrap();
        assert_eq!(pool[a].base(), start);
        vsl.allocate_root_chunk(&mut pool).unwrap();
        assert_eq!(
            vsl.allocate_root_chunk(&mut pool),
            Err(AllocationError::VirtualSpaceExhausted)
        );
        assert_eq!(vsl.num_nodes(), 1);
        assert_eq!(
            vsl.allocate_multiple_root_chunks(&mut pool, 2),
            Err(AllocationError::VirtualSpaceExhausted)
        );
    }

    #[test]
    fn test_multiple_root_chunks_are_adjacent() {
        let mut pool = ChunkHeaderPool::new();
        let mut vsl = VirtualSpaceList::new_expandable("test", 4 * MAX_CHUNK_WORD_SIZE, GRANULE_WORDS);
        vsl.allocate_root_chunk(&mut pool).unwrap();
        vsl.allocate_root_chunk(&mut pool).unwrap();

        // Two roots are left in the first node; asking for three salvages them into a new node.
        let chunks = vsl.allocate_multiple_root_chunks(&mut pool, 3).unwrap();
        assert_eq!(chunks.len(), 3);
        for pair in chunks.windows(2) {
            assert_eq!(pool[pair[0]].end(), pool[pair[1]].base());
        }
        assert_eq!(vsl.num_nodes(), 2);
        assert_eq!(vsl.num_salvaged_root_chunks(), 2);

        // Salvaged root chunks are handed out first.
        let c = vsl.allocate_root_chunk(&mut pool).unwrap();
        assert_eq!(pool[c].node(), 0);
        vsl.verify(&pool);
    }

    #[test]
    fn test_oversized_node_for_many_root_chunks() {
        let mut pool = ChunkHeaderPool::new();
        let mut vsl = VirtualSpaceList::new_expandable("test", 2 * MAX_CHUNK_WORD_SIZE, GRANULE_WORDS);
        let chunks = vsl.allocate_multiple_root_chunks(&mut pool, 5).unwrap();
        assert_eq!(chunks.len(), 5);
        assert_eq!(vsl.reserved_words(), 5 * MAX_CHUNK_WORD_SIZE);
    }

    #[test]
    fn test_commit_counters() {
        let mut pool = ChunkHeaderPool::new();
        let mut limiter = CommitLimiter::unlimited();
        let mut vsl = VirtualSpaceList::new_expandable("test", MAX_CHUNK_WORD_SIZE, GRANULE_WORDS);
        let c = vsl.allocate_root_chunk(&mut pool).unwrap();
        vsl.ensure_range_is_committed(&mut limiter, pool[c].node(), pool[c].base(), 100)
            .unwrap();
        assert_eq!(vsl.committed_words(), GRANULE_WORDS);
        assert_eq!(
            vsl.uncommit_range(&mut limiter, pool[c].node(), pool[c].base(), GRANULE_WORDS),
            GRANULE_WORDS
        );
        assert_eq!(vsl.committed_words(), 0);
        vsl.verify(&pool);
    }
}
