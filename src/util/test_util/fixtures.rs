// Shared building blocks for the unit tests of the metaspace components.

use crate::metaspace::chunk_manager::ChunkManager;
use crate::metaspace::chunklevel::{MAX_CHUNK_BYTE_SIZE, MAX_CHUNK_WORD_SIZE};
use crate::metaspace::context::MetaspaceContext;
use crate::metaspace::free_blocks::ClassSpaceInfo;
use crate::metaspace::settings::Settings;
use crate::metaspace::virtual_space_list::VirtualSpaceList;
use crate::metaspace::MetadataType;
use crate::util::os::Reservation;
use enum_map::EnumMap;

/// Roots per node of an expandable list in tests. Smaller than the default, so tests reserve little.
pub const TEST_NODE_ROOTS: usize = 4;
/// Roots in the class space of [`test_contexts`].
pub const TEST_CLASS_SPACE_ROOTS: usize = 2;

/// The built-in settings, with small nodes. Environment variables are ignored.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.virtual_space_node_default_word_size = TEST_NODE_ROOTS * MAX_CHUNK_WORD_SIZE;
    settings
}

fn reserve_roots(n_roots: usize) -> Reservation {
    Reservation::new(n_roots * MAX_CHUNK_BYTE_SIZE, MAX_CHUNK_BYTE_SIZE)
        .unwrap_or_else(|e| panic!("failed to reserve {} root chunks: {}", n_roots, e))
}

pub fn expandable_chunk_manager(settings: Settings) -> ChunkManager {
    let vsl = VirtualSpaceList::new_expandable(
        "test",
        settings.virtual_space_node_default_word_size,
        settings.commit_granule_words,
    );
    ChunkManager::new("test", vsl, settings)
}

/// A chunk manager over a fixed list of `n_roots` root chunks.
pub fn fixed_chunk_manager(n_roots: usize, settings: Settings) -> ChunkManager {
    let vsl = VirtualSpaceList::new_fixed("test", reserve_roots(n_roots), settings.commit_granule_words);
    ChunkManager::new("test", vsl, settings)
}

pub fn expandable_context(settings: Settings) -> MetaspaceContext {
    MetaspaceContext::new_expandable("test non-class space", settings)
}

pub fn fixed_context(n_roots: usize, settings: Settings) -> MetaspaceContext {
    MetaspaceContext::new_fixed("test class space", reserve_roots(n_roots), settings)
}

/// Describes the class space of `ctx`, a fixed context.
pub fn class_space_info(ctx: &MetaspaceContext, klass_alignment_words: usize) -> ClassSpaceInfo {
    let node = ctx.vsl().node(0);
    ClassSpaceInfo {
        start: node.base(),
        end: node.end(),
        klass_alignment_words,
        min_klass_words: 32,
    }
}

/// A non-class and a class context, the way a metaspace sets them up.
pub fn test_contexts(settings: Settings) -> (EnumMap<MetadataType, MetaspaceContext>, ClassSpaceInfo) {
    let non_class = expandable_context(settings);
    let class = fixed_context(TEST_CLASS_SPACE_ROOTS, settings);
    let info = class_space_info(&class, 1);
    (EnumMap::from_array([non_class, class]), info)
}
