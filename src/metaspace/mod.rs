//! The metadata allocator.
//!
//! Memory is reserved from the OS by [`VirtualSpaceList`](virtual_space_list::VirtualSpaceList)s, carved into
//! root chunks, and handed out as power-of-two chunks by the [`ChunkManager`](chunk_manager::ChunkManager),
//! a buddy allocator. Each class loader owns a [`ClassLoaderMetaspaceImpl`](class_loader_metaspace::ClassLoaderMetaspaceImpl)
//! with two [`MetaspaceArena`](metaspace_arena::MetaspaceArena)s (class and non-class) that bump-allocate from
//! their chunks, and a [`FreeBlocks`](free_blocks::FreeBlocks) structure that recycles deallocated blocks.
//!
//! All mutable state is guarded by one lock in [`crate::Metaspace`].

pub mod arena_growth_policy;
pub mod bin_list;
pub mod block_tree;
pub mod chunk_header_pool;
pub mod chunk_manager;
pub mod chunklevel;
pub mod class_loader_metaspace;
pub mod commit_limiter;
pub mod commit_mask;
pub mod context;
pub mod counters;
pub mod free_blocks;
pub mod free_chunk_list;
pub mod metablock;
pub mod metachunk;
pub mod metaspace_arena;
pub mod metaspace_gc;
pub mod root_chunk_area;
pub mod settings;
pub mod statistics;
pub mod virtual_space_list;
pub mod virtual_space_node;

use enum_map::Enum;
use std::fmt;

/// The kind of metadata. Class metadata lives in the size-capped class space, everything else
/// in the expandable non-class space.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Enum, strum_macros::Display)]
pub enum MetadataType {
    NonClass,
    Class,
}

impl MetadataType {
    pub fn is_class(self) -> bool {
        self == MetadataType::Class
    }
}

/// The type of a class loader. It selects the arena growth policies.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
pub enum MetaspaceType {
    /// An ordinary class loader.
    Standard,
    /// The boot class loader. It loads lots of classes, so its arenas start with large chunks.
    Boot,
    /// A loader that holds exactly one class whose mirror it keeps alive.
    ClassMirrorHolder,
    /// A loader for generated reflection accessors. These load very few classes.
    Reflection,
}

/// Error type for metadata allocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// Committing more memory would cross the GC threshold. The runtime may raise the threshold
    /// (see `expand_and_allocate`) or collect metadata and retry.
    GcThresholdReached,
    /// Committing more memory would exceed the hard cap on committed metadata memory.
    CommitLimitReached,
    /// A fixed virtual space list is full, or the OS refused to reserve more address space.
    /// Raising the GC threshold does not help.
    VirtualSpaceExhausted,
    /// The OS is unable to commit more memory.
    MmapOutOfMemory,
}

impl AllocationError {
    /// Whether raising the GC threshold may make a retry succeed.
    pub fn is_threshold_related(self) -> bool {
        self == AllocationError::GcThresholdReached
    }
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            AllocationError::GcThresholdReached => "metaspace GC threshold reached",
            AllocationError::CommitLimitReached => "metaspace commit limit reached",
            AllocationError::VirtualSpaceExhausted => "metaspace virtual space exhausted",
            AllocationError::MmapOutOfMemory => "OS failed to commit metaspace memory",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for AllocationError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_metaspace_type_names() {
        for t in MetaspaceType::iter() {
            assert_eq!(MetaspaceType::from_str(&t.to_string()), Ok(t));
        }
        assert!(MetaspaceType::from_str("Nonsense").is_err());
    }

    #[test]
    fn test_error_kinds() {
        assert!(AllocationError::GcThresholdReached.is_threshold_related());
        assert!(!AllocationError::CommitLimitReached.is_threshold_related());
        assert!(!AllocationError::VirtualSpaceExhausted.is_threshold_related());
        assert_eq!(
            AllocationError::CommitLimitReached.to_string(),
            "metaspace commit limit reached"
        );
    }
}
