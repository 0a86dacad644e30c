//! # Aligned resource bundle loading
//!
//! Materializes the model / lexical shortlist / vocabulary sources as
//! correctly aligned contiguous regions inside an engine instance's linear
//! memory, minimizing copies.
//!
//! ## Phase ordering
//!
//! Loading runs in five strict phases: size resolution, memory growth,
//! aligned allocation, view acquisition, fill. The ordering exists because of
//! the addressing hazard: an allocation can relocate previously allocated
//! regions, so memory is grown once up front and every allocation completes
//! before the first byte view is taken. Mixing the phases is the most likely
//! latent bug in this code; do not reorder them.

use tracing::debug;

use crate::errgroup::ErrorGroup;
use crate::error::{Error, Result};
use crate::engine::{MEMORY_PAGE_SIZE, TranslationEngine};
use crate::source::ResourceSource;

/// Data to load into a translator.
#[derive(Debug, Default)]
pub struct FilesBundle {
    /// Model weights. Required by [`crate::Translator`].
    pub model: Option<ResourceSource>,
    /// Lexical shortlist. Required by [`crate::Translator`].
    pub lexical_shortlist: Option<ResourceSource>,
    /// Vocabulary shared by source and target languages. Required by
    /// [`crate::Translator`].
    pub vocabulary: Option<ResourceSource>,
}

pub(crate) const MODEL_INDEX: usize = 0;
pub(crate) const SHORTLIST_INDEX: usize = 1;
pub(crate) const VOCABULARY_INDEX: usize = 2;

/// Alignment the engine requires for each bundle entry, by index.
pub(crate) const ALIGNMENTS: [u32; 3] = [256, 64, 64];

/// The aligned regions of a fully loaded bundle, bound to one instance.
///
/// Immutable once filled, for the remaining life of the translator that owns
/// the instance.
pub(crate) struct LoadedBundle<E: TranslationEngine> {
    regions: [Option<E::Region>; 3],
}

impl<E: TranslationEngine> std::fmt::Debug for LoadedBundle<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedBundle").finish_non_exhaustive()
    }
}

impl<E: TranslationEngine> LoadedBundle<E> {
    pub(crate) fn model(&self) -> Result<&E::Region> {
        self.regions[MODEL_INDEX].as_ref().ok_or(Error::MissingModel)
    }

    pub(crate) fn shortlist(&self) -> Result<&E::Region> {
        self.regions[SHORTLIST_INDEX]
            .as_ref()
            .ok_or(Error::MissingShortlist)
    }

    pub(crate) fn vocabulary(&self) -> Result<&E::Region> {
        self.regions[VOCABULARY_INDEX]
            .as_ref()
            .ok_or(Error::MissingVocabulary)
    }
}

/// Loads the bundle into the instance's linear memory.
///
/// Empty entries are skipped; sizing runs one task per non-empty source under
/// an [`ErrorGroup`] so every faulty source is reported, not just the first.
pub(crate) async fn load_bundle<E: TranslationEngine>(
    engine: &E,
    instance: &mut E::Instance,
    bundle: FilesBundle,
) -> Result<LoadedBundle<E>> {
    let sources = [bundle.model, bundle.lexical_shortlist, bundle.vocabulary];

    // Phase 1: resolve sizes concurrently. A streaming source comes back
    // buffered, so its bytes are not read twice.
    let mut group: ErrorGroup<(usize, u32, ResourceSource)> = ErrorGroup::new();
    for (index, source) in sources.into_iter().enumerate() {
        let Some(mut source) = source else { continue };
        group.spawn(async move {
            let size = source.resolve_size()?;
            Ok((index, size, source))
        });
    }
    let mut entries: [Option<(u32, ResourceSource)>; 3] = [None, None, None];
    for (index, size, source) in group.wait().await? {
        entries[index] = Some((size, source));
    }

    // Phase 2: grow memory once, before any allocation. Allocation that
    // triggers growth on its own could relocate earlier regions.
    let total: u64 = entries
        .iter()
        .flatten()
        .map(|(size, _)| u64::from(*size))
        .sum();
    let available = engine.memory_size(instance);
    if available < total {
        let deficit = total - available;
        let pages = deficit.div_ceil(u64::from(MEMORY_PAGE_SIZE)) as u32;
        debug!(total, available, pages, "growing instance memory");
        engine.grow_memory(instance, pages)?;
    }

    // Phase 3: allocate every region in fixed index order. No view may be
    // taken until all allocations exist.
    let mut regions: [Option<E::Region>; 3] = [None, None, None];
    for (index, entry) in entries.iter().enumerate() {
        if let Some((size, _)) = entry {
            regions[index] = Some(engine.allocate_aligned(instance, *size, ALIGNMENTS[index])?);
        }
    }

    // Phases 4 and 5: take each view and copy the source in. The view
    // borrows the instance, so nothing can allocate while it lives; the
    // invariant that matters is that all allocations are already done.
    for (entry, region) in entries.iter_mut().zip(regions.iter()) {
        let Some((size, source)) = entry.take() else {
            continue;
        };
        let Some(region) = region else { continue };
        let view = engine.byte_view_mut(instance, region)?;
        source.fill(view, size)?;
    }

    Ok(LoadedBundle { regions })
}
