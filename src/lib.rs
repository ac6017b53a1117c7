//! A class metadata allocator.
//!
//! Class loaders allocate metadata (class structures, method data, constant pools) from a [`Metaspace`]. The
//! memory is reserved from the OS in large nodes, carved into power-of-two chunks by a buddy allocator, and handed
//! to per-loader arenas that bump-allocate from them. When a loader goes away, all of its chunks go back to the
//! buddy allocator at once. Memory freed earlier, such as the old version of a redefined class, is kept in a free
//! block dictionary and reused by later allocations of the same loader.
//!
//! Class metadata and other metadata live in separate spaces: class metadata in a fixed reservation (the class
//! space), everything else in a space that grows on demand. Committed memory is bounded by a hard limit and by a
//! GC threshold that the runtime may raise (see [`ClassLoaderMetaspace::expand_and_allocate`]).
//!
//! The runtime usually goes through the functions in [`memory_manager`]:
//!
//! ```no_run
//! use metaspace::memory_manager;
//! use metaspace::{MetadataType, MetaspaceBuilder, MetaspaceType};
//!
//! let mut builder = MetaspaceBuilder::new();
//! memory_manager::process(&mut builder, "max_metaspace_size", "268435456");
//! let metaspace = memory_manager::metaspace_init(&builder).unwrap();
//! let loader = memory_manager::create_class_loader_metaspace(&metaspace, MetaspaceType::Standard);
//! let klass = memory_manager::allocate(&loader, 64, MetadataType::Class).unwrap();
//! memory_manager::deallocate(&loader, klass, 64, MetadataType::Class);
//! memory_manager::destroy_class_loader_metaspace(loader);
//! ```

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate static_assertions;

pub mod global;
pub mod memory_manager;
pub mod metaspace;
pub mod util;

pub use crate::global::{ClassLoaderMetaspace, Metaspace, MetaspaceBuilder};
pub use crate::metaspace::statistics::MetaspaceUsage;
pub use crate::metaspace::{AllocationError, MetadataType, MetaspaceType};
pub use crate::util::Address;
