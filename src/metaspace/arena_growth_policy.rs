use super::chunklevel::*;
use super::{MetadataType, MetaspaceType};

/// Decides how large the chunks of an arena are.
pub trait ArenaGrowthPolicy: Sync + Send {
    /// The level of the chunk an arena should get when it already holds `step` chunks.
    fn level_at_step(&self, step: usize) -> ChunkLevel;
}

/// A growth policy given by a fixed sequence of levels. Past its end, the last level repeats.
pub struct SequenceGrowthPolicy {
    levels: &'static [ChunkLevel],
}

impl SequenceGrowthPolicy {
    pub const fn new(levels: &'static [ChunkLevel]) -> Self {
        assert!(!levels.is_empty());
        SequenceGrowthPolicy { levels }
    }
}

impl ArenaGrowthPolicy for SequenceGrowthPolicy {
    fn level_at_step(&self, step: usize) -> ChunkLevel {
        self.levels[step.min(self.levels.len() - 1)]
    }
}

static STANDARD_NON_CLASS: SequenceGrowthPolicy = SequenceGrowthPolicy::new(&[
    CHUNK_LEVEL_4K,
    CHUNK_LEVEL_4K,
    CHUNK_LEVEL_4K,
    CHUNK_LEVEL_8K,
    CHUNK_LEVEL_16K,
]);
static STANDARD_CLASS: SequenceGrowthPolicy = SequenceGrowthPolicy::new(&[
    CHUNK_LEVEL_2K,
    CHUNK_LEVEL_2K,
    CHUNK_LEVEL_4K,
    CHUNK_LEVEL_8K,
    CHUNK_LEVEL_16K,
]);
static BOOT_NON_CLASS: SequenceGrowthPolicy =
    SequenceGrowthPolicy::new(&[CHUNK_LEVEL_4M, CHUNK_LEVEL_1M]);
static BOOT_CLASS: SequenceGrowthPolicy =
    SequenceGrowthPolicy::new(&[CHUNK_LEVEL_1M, CHUNK_LEVEL_256K]);
static CLASS_MIRROR_HOLDER_NON_CLASS: SequenceGrowthPolicy =
    SequenceGrowthPolicy::new(&[CHUNK_LEVEL_1K]);
static CLASS_MIRROR_HOLDER_CLASS: SequenceGrowthPolicy =
    SequenceGrowthPolicy::new(&[CHUNK_LEVEL_1K]);
static REFLECTION_NON_CLASS: SequenceGrowthPolicy =
    SequenceGrowthPolicy::new(&[CHUNK_LEVEL_2K, CHUNK_LEVEL_1K]);
static REFLECTION_CLASS: SequenceGrowthPolicy = SequenceGrowthPolicy::new(&[CHUNK_LEVEL_1K]);

/// The growth policy for an arena of a loader of the given type.
pub fn policy_for_space_type(
    space_type: MetaspaceType,
    kind: MetadataType,
) -> &'static dyn ArenaGrowthPolicy {
    match (space_type, kind) {
        (MetaspaceType::Standard, MetadataType::NonClass) => &STANDARD_NON_CLASS,
        (MetaspaceType::Standard, MetadataType::Class) => &STANDARD_CLASS,
        (MetaspaceType::Boot, MetadataType::NonClass) => &BOOT_NON_CLASS,
        (MetaspaceType::Boot, MetadataType::Class) => &BOOT_CLASS,
        (MetaspaceType::ClassMirrorHolder, MetadataType::NonClass) => &CLASS_MIRROR_HOLDER_NON_CLASS,
        (MetaspaceType::ClassMirrorHolder, MetadataType::Class) => &CLASS_MIRROR_HOLDER_CLASS,
        (MetaspaceType::Reflection, MetadataType::NonClass) => &REFLECTION_NON_CLASS,
        (MetaspaceType::Reflection, MetadataType::Class) => &REFLECTION_CLASS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_standard_sequence() {
        let p = policy_for_space_type(MetaspaceType::Standard, MetadataType::NonClass);
        let levels: Vec<_> = (0..7).map(|s| p.level_at_step(s)).collect();
        assert_eq!(
            levels,
            vec![
                CHUNK_LEVEL_4K,
                CHUNK_LEVEL_4K,
                CHUNK_LEVEL_4K,
                CHUNK_LEVEL_8K,
                CHUNK_LEVEL_16K,
                CHUNK_LEVEL_16K,
                CHUNK_LEVEL_16K
            ]
        );
    }

    #[test]
    fn test_every_policy_settles() {
        for space_type in MetaspaceType::iter() {
            for kind in [MetadataType::NonClass, MetadataType::Class] {
                let p = policy_for_space_type(space_type, kind);
                for step in 0..10 {
                    assert!(is_valid_level(p.level_at_step(step)));
                }
                assert_eq!(p.level_at_step(10), p.level_at_step(usize::MAX));
            }
        }
    }

    #[test]
    fn test_boot_starts_large() {
        let p = policy_for_space_type(MetaspaceType::Boot, MetadataType::NonClass);
        assert_eq!(p.level_at_step(0), ROOT_CHUNK_LEVEL);
        assert_eq!(p.level_at_step(100), CHUNK_LEVEL_1M);
    }
}
