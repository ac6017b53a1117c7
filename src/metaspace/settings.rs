use super::chunklevel::ChunkLevel;
use crate::util::conversions::bytes_to_words;
use crate::util::options::Options;

/// The configuration the allocator components consume, derived from [`Options`].
#[derive(Copy, Clone, Debug)]
pub struct Settings {
    /// Memory is committed in granules of this many words.
    pub commit_granule_words: usize,
    /// Word size of a new node of an expandable virtual space list.
    pub virtual_space_node_default_word_size: usize,
    pub enlarge_chunks_in_place: bool,
    pub max_enlargement_levels: ChunkLevel,
    pub new_chunks_are_fully_committed: bool,
    pub uncommit_free_chunks: bool,
}

impl Settings {
    pub fn from_options(options: &Options) -> Self {
        let settings = Settings {
            commit_granule_words: bytes_to_words(options.commit_granule_size),
            virtual_space_node_default_word_size: bytes_to_words(options.virtual_space_node_size),
            enlarge_chunks_in_place: options.enlarge_chunks_in_place,
            max_enlargement_levels: options.max_enlargement_levels,
            new_chunks_are_fully_committed: options.new_chunks_are_fully_committed,
            uncommit_free_chunks: options.uncommit_free_chunks,
        };
        debug!("{:?}", settings);
        settings
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::from_options(&Options::builtin())
    }
}
