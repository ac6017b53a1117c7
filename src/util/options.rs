use crate::metaspace::chunklevel::{HIGHEST_CHUNK_LEVEL, MAX_CHUNK_BYTE_SIZE, MIN_CHUNK_WORD_SIZE};
use crate::util::constants::*;
use crate::util::conversions::raw_is_aligned;
use std::default::Default;

/// The default initial GC threshold for metadata.
pub const DEFAULT_METASPACE_SIZE: usize = 21 << LOG_BYTES_IN_MBYTE;
/// The default lower bound of a GC threshold increment.
pub const DEFAULT_MIN_METASPACE_EXPANSION: usize = 256 << LOG_BYTES_IN_KBYTE;
/// The default upper bound of a GC threshold increment (for ordinary requests).
pub const DEFAULT_MAX_METASPACE_EXPANSION: usize = 4 << LOG_BYTES_IN_MBYTE;
/// The default size of the compressed class space reservation.
pub const DEFAULT_COMPRESSED_CLASS_SPACE_SIZE: usize = 1 << LOG_BYTES_IN_GBYTE;
/// The default commit granule.
pub const DEFAULT_COMMIT_GRANULE_SIZE: usize = 64 << LOG_BYTES_IN_KBYTE;
/// The default size of a virtual space node, i.e. one reservation in an expandable list.
pub const DEFAULT_VIRTUAL_SPACE_NODE_SIZE: usize = 16 * MAX_CHUNK_BYTE_SIZE;

fn always_valid<T>(_: &T) -> bool {
    true
}

fn is_valid_commit_granule(v: &usize) -> bool {
    v.is_power_of_two() && *v >= crate::util::os::page_size() && *v <= MAX_CHUNK_BYTE_SIZE
}

fn is_valid_node_size(v: &usize) -> bool {
    *v > 0 && raw_is_aligned(*v, MAX_CHUNK_BYTE_SIZE)
}

fn is_valid_klass_alignment(v: &usize) -> bool {
    v.is_power_of_two() && *v <= MIN_CHUNK_WORD_SIZE
}

macro_rules! options {
    ($($(#[$outer:meta])*$name:ident: $type:ty[$validator:expr] = $default:expr),*,) => [
        options!($($(#[$outer])*$name: $type[$validator] = $default),*);
    ];
    ($($(#[$outer:meta])*$name:ident: $type:ty[$validator:expr] = $default:expr),*) => [
        /// Options for the metaspace. Sizes are in bytes.
        #[derive(Clone, Debug)]
        pub struct Options {
            $($(#[$outer])*pub $name: $type),*
        }
        impl Options {
            /// Options with the built-in default values. Environment variables are not read.
            pub fn builtin() -> Self {
                Options {
                    $($name: $default),*
                }
            }

            /// Set an option by its name and a string value. Returns true if the value is
            /// parsed and valid. Otherwise the option keeps its current value.
            pub fn set_from_str(&mut self, s: &str, val: &str) -> bool {
                match s {
                    // Parse the given value from str (by env vars or by calling set_option()) to the right type
                    $(stringify!($name) => if let Ok(typed_val) = val.parse::<$type>() {
                        let validate_fn = $validator;
                        let is_valid = validate_fn(&typed_val);
                        if is_valid {
                            // Only set value if valid.
                            self.$name = typed_val;
                        } else {
                            warn!("Unable to set {}={:?}. Invalid value. Current value will be used.", s, val);
                        }
                        is_valid
                    } else {
                        warn!("Unable to set {}={:?}. Can't parse value. Current value will be used.", s, val);
                        false
                    })*
                    _ => {
                        warn!("Unknown option {}", s);
                        false
                    }
                }
            }

            /// Apply environment variables that start with `METASPACE_` and match an option
            /// (such as `METASPACE_MAX_METASPACE_SIZE`).
            pub fn read_env_var_settings(&mut self) {
                const PREFIX: &str = "METASPACE_";
                for (key, val) in std::env::vars() {
                    // strip the prefix, and get the lower case string
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { self.set_from_str(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
            }
        }
        impl Default for Options {
            /// Built-in defaults, overridden by environment variables.
            fn default() -> Self {
                let mut options = Options::builtin();
                options.read_env_var_settings();
                options
            }
        }
    ]
}

options! {
    /// Hard cap on committed metadata memory. Commits beyond this fail with `CommitLimitReached`.
    max_metaspace_size:             usize [always_valid] = usize::MAX,
    /// The initial GC threshold. Commits beyond the threshold fail with `GcThresholdReached`.
    metaspace_size:                 usize [|v: &usize| *v > 0] = DEFAULT_METASPACE_SIZE,
    /// The lower bound of a GC threshold increment.
    min_metaspace_expansion:        usize [|v: &usize| *v > 0] = DEFAULT_MIN_METASPACE_EXPANSION,
    /// The upper bound of a GC threshold increment for requests that fit into it.
    max_metaspace_expansion:        usize [|v: &usize| *v > 0] = DEFAULT_MAX_METASPACE_EXPANSION,
    /// Size of the fixed class space reservation.
    compressed_class_space_size:    usize [|v: &usize| *v >= MAX_CHUNK_BYTE_SIZE && raw_is_aligned(*v, MAX_CHUNK_BYTE_SIZE)] = DEFAULT_COMPRESSED_CLASS_SPACE_SIZE,
    /// Memory is committed and uncommitted in units of this size.
    commit_granule_size:            usize [is_valid_commit_granule] = DEFAULT_COMMIT_GRANULE_SIZE,
    /// Size of each new reservation of an expandable virtual space list.
    virtual_space_node_size:        usize [is_valid_node_size] = DEFAULT_VIRTUAL_SPACE_NODE_SIZE,
    /// Whether an arena may grow its current chunk by merging it with its free buddy.
    enlarge_chunks_in_place:        bool  [always_valid] = true,
    /// How many levels a chunk may grow in place for a single allocation.
    max_enlargement_levels:         u8    [|v: &u8| (*v as usize) <= HIGHEST_CHUNK_LEVEL as usize] = 1,
    /// Commit new chunks completely when they are handed out, instead of on demand.
    new_chunks_are_fully_committed: bool  [always_valid] = false,
    /// Uncommit free chunks of at least one granule when they are returned.
    uncommit_free_chunks:           bool  [always_valid] = true,
    /// Alignment (in words) of class-space metadata objects.
    klass_alignment_words:          usize [is_valid_klass_alignment] = 1,
    /// Size (in words) of the smallest class-space metadata object.
    min_klass_words:                usize [|v: &usize| *v > 0 && *v <= MIN_CHUNK_WORD_SIZE] = 32,
}
