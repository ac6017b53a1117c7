//! Runtime-to-metaspace interface.
//!
//! This module provides the API a managed runtime calls into. It is a thin layer over [`Metaspace`] and
//! [`ClassLoaderMetaspace`]; a runtime may as well use those types directly. A runtime that exposes the allocator
//! over FFI is expected to hold the returned `Arc<Metaspace>` and the per-loader handles itself.

use crate::global::{ClassLoaderMetaspace, Metaspace, MetaspaceBuilder};
use crate::metaspace::statistics::{ClmsStats, MetaspaceUsage};
use crate::metaspace::{AllocationError, MetadataType, MetaspaceType};
use crate::util::Address;
use std::sync::Arc;

/// Initialize a metaspace.
///
/// We expect a runtime to initialize the metaspace in the following steps:
///
/// 1. Create a [`MetaspaceBuilder`].
/// 2. Set options with [`process()`] or [`process_bulk()`].
/// 3. Call this function. It reserves the class space and returns the metaspace.
///
/// This function attempts to initialize a logger. A runtime that wants to use its own logger should initialize it
/// before calling this.
///
/// Arguments:
/// * `builder`: The builder with the options set.
pub fn metaspace_init(builder: &MetaspaceBuilder) -> Result<Arc<Metaspace>, AllocationError> {
    match crate::util::logger::try_init() {
        Ok(_) => debug!("Metaspace initialized the logger."),
        Err(_) => debug!(
            "Metaspace failed to initialize the logger. Possibly a logger has been initialized by user."
        ),
    }
    let metaspace = builder.build()?;
    info!("Initialized metaspace with {:?}", metaspace.settings());
    #[cfg(feature = "extreme_assertions")]
    warn!("The feature 'extreme_assertions' is enabled. The metaspace will run expensive run-time checks. Slow performance should be expected.");
    Ok(metaspace)
}

/// Set an option. Returns true if the option is processed successfully.
///
/// Arguments:
/// * `builder`: The builder.
/// * `name`: The name of the option.
/// * `value`: The value of the option (as a string).
pub fn process(builder: &mut MetaspaceBuilder, name: &str, value: &str) -> bool {
    builder.set_option(name, value)
}

/// Set multiple options. Returns true if all the options are processed successfully.
///
/// Arguments:
/// * `builder`: The builder.
/// * `options`: a string of key value pairs separated by white spaces, e.g. "max_metaspace_size=67108864 min_klass_words=16"
pub fn process_bulk(builder: &mut MetaspaceBuilder, options: &str) -> bool {
    builder.set_options_bulk_by_str(options)
}

/// Create the metaspace of a class loader. The loader's memory is given back when the returned handle is dropped.
pub fn create_class_loader_metaspace(
    metaspace: &Arc<Metaspace>,
    space_type: MetaspaceType,
) -> ClassLoaderMetaspace {
    metaspace.new_class_loader_metaspace(space_type)
}

/// Release the metaspace of a class loader, once the loader is unloaded.
pub fn destroy_class_loader_metaspace(clms: ClassLoaderMetaspace) {
    drop(clms);
}

/// Allocate metadata. On `GcThresholdReached`, the runtime should either collect metadata or call
/// [`expand_and_allocate`].
pub fn allocate(
    clms: &ClassLoaderMetaspace,
    word_size: usize,
    kind: MetadataType,
) -> Result<Address, AllocationError> {
    clms.allocate(word_size, kind)
}

/// Allocate metadata, raising the GC threshold if needed.
pub fn expand_and_allocate(
    clms: &ClassLoaderMetaspace,
    word_size: usize,
    kind: MetadataType,
) -> Result<Address, AllocationError> {
    clms.expand_and_allocate(word_size, kind)
}

/// Return metadata that is no longer needed, such as the old version of a redefined class. `word_size` must be
/// the size it was allocated with.
pub fn deallocate(clms: &ClassLoaderMetaspace, addr: Address, word_size: usize, kind: MetadataType) {
    clms.deallocate(addr, word_size, kind)
}

/// Uncommit the memory of all free chunks. A runtime calls this after unloading classes.
/// Returns the number of words uncommitted.
pub fn purge(metaspace: &Metaspace) -> usize {
    metaspace.purge()
}

/// Usage of one space, or of both if `kind` is `None`.
pub fn usage(metaspace: &Metaspace, kind: Option<MetadataType>) -> MetaspaceUsage {
    match kind {
        Some(kind) => metaspace.usage(kind),
        None => metaspace.total_usage(),
    }
}

/// Statistics of one class loader.
pub fn class_loader_stats(clms: &ClassLoaderMetaspace) -> ClmsStats {
    clms.stats()
}

/// The current GC threshold in bytes.
pub fn capacity_until_gc(metaspace: &Metaspace) -> usize {
    metaspace.gc().capacity_until_gc()
}

/// Lower the GC threshold by `bytes` (a multiple of the commit granule), after a collection freed metadata.
/// Returns the new threshold.
pub fn shrink_capacity_until_gc(metaspace: &Metaspace, bytes: usize) -> usize {
    let after = metaspace.gc().dec_capacity_until_gc(bytes);
    info!("Metaspace GC threshold decreased to {} bytes", after);
    after
}
