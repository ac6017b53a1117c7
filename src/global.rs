//! The metaspace instance and the per-loader handles that allocate from it.
//!
//! A [`Metaspace`] owns one non-class context (expandable) and one class context (a fixed reservation
//! standing in for the compressed class space), the commit limiter shared by both, and every loader's arenas.
//! All of that is guarded by a single lock. Only the GC threshold lives outside the lock.

use crate::metaspace::class_loader_metaspace::ClassLoaderMetaspaceImpl;
use crate::metaspace::commit_limiter::CommitLimiter;
use crate::metaspace::context::MetaspaceContext;
use crate::metaspace::free_blocks::ClassSpaceInfo;
use crate::metaspace::metaspace_gc::{IncCapacityError, MetaspaceGc};
use crate::metaspace::settings::Settings;
use crate::metaspace::statistics::{ChunkManagerStats, ClmsStats, Histogram, MetaspaceUsage};
use crate::metaspace::{AllocationError, MetadataType, MetaspaceType};
use crate::util::conversions::{bytes_to_words_down, words_to_bytes};
use crate::util::options::Options;
use crate::util::Address;
use enum_map::EnumMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Collects options and builds a [`Metaspace`].
pub struct MetaspaceBuilder {
    pub options: Options,
}

impl Default for MetaspaceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaspaceBuilder {
    /// Built-in defaults, overridden by `METASPACE_*` environment variables.
    pub fn new() -> Self {
        MetaspaceBuilder {
            options: Options::default(),
        }
    }

    /// Built-in defaults only.
    pub fn new_no_env_vars() -> Self {
        MetaspaceBuilder {
            options: Options::builtin(),
        }
    }

    /// Set an option. Returns true if the value was applied.
    pub fn set_option(&mut self, name: &str, val: &str) -> bool {
        self.options.set_from_str(name, val)
    }

    /// Set options from a string of whitespace separated `name=value` pairs, such as
    /// `"max_metaspace_size=67108864 uncommit_free_chunks=false"`. Returns true if all of them were applied.
    pub fn set_options_bulk_by_str(&mut self, options: &str) -> bool {
        let mut all_ok = true;
        for opt in options.split_ascii_whitespace() {
            let Some((name, val)) = opt.split_once('=') else {
                warn!("Malformed option {:?}, expected name=value", opt);
                all_ok = false;
                continue;
            };
            all_ok &= self.set_option(name, val);
        }
        all_ok
    }

    /// Reserve the class space and create the metaspace.
    pub fn build(&self) -> Result<Arc<Metaspace>, AllocationError> {
        Metaspace::new(self.options.clone()).map(Arc::new)
    }
}

/// Everything the metaspace lock guards.
struct MetaspaceState {
    limiter: CommitLimiter,
    contexts: EnumMap<MetadataType, MetaspaceContext>,
    /// Indexed by loader id. A slot is `None` once its loader is released.
    loaders: Vec<Option<ClassLoaderMetaspaceImpl>>,
    free_ids: Vec<usize>,
}

impl MetaspaceState {
    fn loader_mut(&mut self, id: usize) -> &mut ClassLoaderMetaspaceImpl {
        match self.loaders.get_mut(id) {
            Some(Some(loader)) => loader,
            _ => panic!("class loader metaspace {} does not exist", id),
        }
    }

    fn loader(&self, id: usize) -> &ClassLoaderMetaspaceImpl {
        match self.loaders.get(id) {
            Some(Some(loader)) => loader,
            _ => panic!("class loader metaspace {} does not exist", id),
        }
    }
}

pub struct Metaspace {
    options: Options,
    settings: Settings,
    gc: Arc<MetaspaceGc>,
    class_space: ClassSpaceInfo,
    state: Mutex<MetaspaceState>,
}

impl Metaspace {
    fn new(options: Options) -> Result<Self, AllocationError> {
        let settings = Settings::from_options(&options);
        let gc = Arc::new(MetaspaceGc::new(&options));
        let cap_words = bytes_to_words_down(options.max_metaspace_size);
        let limiter = CommitLimiter::with_gc_threshold(cap_words, gc.clone());

        let non_class = MetaspaceContext::new_expandable("non-class space", settings);
        let class = MetaspaceContext::reserve_fixed(
            "class space",
            options.compressed_class_space_size,
            settings,
        )?;
        let class_node = class.vsl().node(0);
        let class_space = ClassSpaceInfo {
            start: class_node.base(),
            end: class_node.end(),
            klass_alignment_words: options.klass_alignment_words,
            min_klass_words: options.min_klass_words,
        };
        info!(
            "Metaspace initialized: class space [{}, {}), GC threshold {} bytes",
            class_space.start,
            class_space.end,
            gc.capacity_until_gc()
        );

        Ok(Metaspace {
            options,
            settings,
            gc,
            class_space,
            state: Mutex::new(MetaspaceState {
                limiter,
                contexts: EnumMap::from_array([non_class, class]),
                loaders: vec![],
                free_ids: vec![],
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, MetaspaceState> {
        self.state.lock().unwrap()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn gc(&self) -> &MetaspaceGc {
        &self.gc
    }

    pub fn class_space(&self) -> ClassSpaceInfo {
        self.class_space
    }

    /// Create the metaspace of a new class loader.
    pub fn new_class_loader_metaspace(self: &Arc<Self>, space_type: MetaspaceType) -> ClassLoaderMetaspace {
        let loader = ClassLoaderMetaspaceImpl::new(space_type, self.class_space);
        let mut state = self.lock();
        let id = match state.free_ids.pop() {
            Some(id) => {
                debug_assert!(state.loaders[id].is_none());
                state.loaders[id] = Some(loader);
                id
            }
            None => {
                state.loaders.push(Some(loader));
                state.loaders.len() - 1
            }
        };
        ClassLoaderMetaspace {
            metaspace: self.clone(),
            id,
            space_type,
        }
    }

    fn release_loader(&self, id: usize) {
        let mut state = self.lock();
        let state = &mut *state;
        let Some(mut loader) = state.loaders.get_mut(id).and_then(Option::take) else {
            panic!("class loader metaspace {} released twice", id);
        };
        loader.release(&mut state.contexts, &mut state.limiter);
        state.free_ids.push(id);
    }

    /// Uncommit all free chunks of both spaces. Returns the number of words uncommitted.
    pub fn purge(&self) -> usize {
        let mut state = self.lock();
        let state = &mut *state;
        let mut uncommitted = 0;
        for (_, ctx) in state.contexts.iter_mut() {
            uncommitted += ctx.purge(&mut state.limiter);
        }
        info!("Purged metaspace: uncommitted {} words", uncommitted);
        uncommitted
    }

    pub fn usage(&self, kind: MetadataType) -> MetaspaceUsage {
        self.lock().contexts[kind].usage()
    }

    pub fn total_usage(&self) -> MetaspaceUsage {
        let state = self.lock();
        state
            .contexts
            .values()
            .map(MetaspaceContext::usage)
            .fold(MetaspaceUsage::default(), |a, b| a + b)
    }

    /// Words committed by both spaces, as the commit limiter sees them.
    pub fn committed_words(&self) -> usize {
        self.lock().limiter.committed_words()
    }

    /// Words that may still be committed before the limit or the GC threshold is hit.
    pub fn possible_expansion_words(&self) -> usize {
        self.lock().limiter.possible_expansion_words()
    }

    /// A snapshot of the allocation size histogram of one space.
    pub fn histogram(&self, kind: MetadataType) -> Histogram {
        self.lock().contexts[kind].histogram().clone()
    }

    /// The free chunks of one space, per level.
    pub fn chunk_manager_stats(&self, kind: MetadataType) -> ChunkManagerStats {
        self.lock().contexts[kind].chunk_manager().add_to_statistics()
    }

    /// Check the whole metaspace. Panics if anything is inconsistent.
    pub fn verify(&self) {
        let state = self.lock();
        for (_, ctx) in state.contexts.iter() {
            ctx.verify();
        }
        for loader in state.loaders.iter().flatten() {
            loader.verify(&state.contexts);
        }
        let committed: usize = state.contexts.values().map(|c| c.vsl().committed_words()).sum();
        assert_eq!(committed, state.limiter.committed_words());
    }
}

/// The metaspace of one class loader. Dropping it returns all of the loader's memory to the metaspace.
pub struct ClassLoaderMetaspace {
    metaspace: Arc<Metaspace>,
    id: usize,
    space_type: MetaspaceType,
}

impl ClassLoaderMetaspace {
    pub fn space_type(&self) -> MetaspaceType {
        self.space_type
    }

    pub fn metaspace(&self) -> &Arc<Metaspace> {
        &self.metaspace
    }

    /// Allocate `word_size` words of metadata. Fails if the commit limit or the GC threshold is hit, or if the
    /// class space is full.
    pub fn allocate(&self, word_size: usize, kind: MetadataType) -> Result<Address, AllocationError> {
        let mut state = self.metaspace.lock();
        let state = &mut *state;
        let loader = match state.loaders.get_mut(self.id) {
            Some(Some(loader)) => loader,
            _ => panic!("class loader metaspace {} does not exist", self.id),
        };
        loader.allocate(&mut state.contexts, &mut state.limiter, word_size, kind)
    }

    /// Like [`ClassLoaderMetaspace::allocate`], but raises the GC threshold if that is what stands in the way.
    ///
    /// The threshold is raised at most once. If another thread raced us to it, the allocation is retried and we
    /// try again.
    pub fn expand_and_allocate(
        &self,
        word_size: usize,
        kind: MetadataType,
    ) -> Result<Address, AllocationError> {
        let gc = &self.metaspace.gc;
        let delta = gc.delta_capacity_until_gc(words_to_bytes(word_size));
        loop {
            let inc = gc.inc_capacity_until_gc(delta);
            let res = self.allocate(word_size, kind);
            match inc {
                Ok(inc) => {
                    info!(
                        "Metaspace GC threshold increased from {} to {} bytes",
                        inc.before, inc.after
                    );
                    return res;
                }
                Err(IncCapacityError::AtMaximum) => return res,
                Err(IncCapacityError::Raced) => match res {
                    Err(e) if e.is_threshold_related() => {
                        trace!("Lost the race to raise the GC threshold, retrying");
                    }
                    res => return res,
                },
            }
        }
    }

    /// Give back a block allocated with `word_size`. It is reused by later allocations of this loader.
    pub fn deallocate(&self, addr: Address, word_size: usize, kind: MetadataType) {
        let mut state = self.metaspace.lock();
        state.loader_mut(self.id).deallocate(addr, word_size, kind);
    }

    /// Whether `addr` lies in one of this loader's chunks.
    pub fn contains(&self, addr: Address) -> bool {
        let state = self.metaspace.lock();
        state.loader(self.id).contains(&state.contexts, addr)
    }

    pub fn stats(&self) -> ClmsStats {
        let state = self.metaspace.lock();
        state.loader(self.id).add_to_statistics(&state.contexts)
    }

    pub fn verify(&self) {
        let state = self.metaspace.lock();
        state.loader(self.id).verify(&state.contexts);
    }
}

impl Drop for ClassLoaderMetaspace {
    fn drop(&mut self) {
        self.metaspace.release_loader(self.id);
    }
}
