//! # Engine capability seam
//!
//! The embedded translation engine is an opaque, sandboxed capability: it
//! accepts a configuration blob plus three binary resources and offers a
//! synchronous batch-translate. This module defines the trait any concrete
//! binding must satisfy; pool, translator and loader logic never depend on a
//! specific binding mechanism.
//!
//! ## Addressing hazard
//!
//! A byte view into an allocated region is only valid until the next
//! allocation inside the same instance, which may relocate earlier regions.
//! The loader in [`crate::bundle`] encodes the safe ordering; bindings only
//! have to honor the individual operations.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

#[cfg(test)]
pub(crate) mod mock;

/// Size of one linear-memory page, a fixed power of two.
pub const MEMORY_PAGE_SIZE: u32 = 65536;

/// Capability object standing in for the embedded translation engine.
///
/// One [`Instance`](TranslationEngine::Instance) is one isolated execution of
/// the engine with its own growable linear memory. Exclusive access is
/// expressed through `&mut` receivers: holding a byte view borrows the
/// instance, so no allocation can invalidate it while it lives.
#[async_trait]
pub trait TranslationEngine: Send + Sync + 'static {
    /// A compiled engine module, shareable across instances.
    type Module: Clone + Send + Sync + 'static;
    /// Process-wide compilation cache, explicitly passed rather than global
    /// so multiple pools stay independent.
    type ModuleCache: Clone + Send + Sync + 'static;
    /// One sandboxed execution of the engine.
    type Instance: Send + 'static;
    /// An allocated, aligned sub-range of an instance's linear memory.
    type Region: Send + Sync + 'static;
    /// The engine's translation service object (owns the response cache).
    type Service: Send + 'static;
    /// The engine's translation model object (bound to filled regions).
    type Model: Send + 'static;

    /// Creates a fresh compilation cache.
    fn new_module_cache(&self) -> Self::ModuleCache;

    /// Compiles the engine module image, consulting the cache if given.
    fn compile(&self, image: &[u8], cache: Option<&Self::ModuleCache>) -> Result<Self::Module>;

    /// Instantiates a compiled module with a fresh linear memory.
    fn instantiate(&self, module: &Self::Module) -> Result<Self::Instance>;

    /// Current size of the instance's linear memory in bytes.
    fn memory_size(&self, instance: &Self::Instance) -> u64;

    /// Grows the instance's linear memory by whole pages.
    fn grow_memory(&self, instance: &mut Self::Instance, pages: u32) -> Result<()>;

    /// Allocates `size` bytes at the given power-of-two alignment.
    fn allocate_aligned(
        &self,
        instance: &mut Self::Instance,
        size: u32,
        alignment: u32,
    ) -> Result<Self::Region>;

    /// Mutable byte view over an allocated region.
    ///
    /// The borrow ties the view's lifetime to the instance, so callers must
    /// finish writing before performing another allocation.
    fn byte_view_mut<'a>(
        &self,
        instance: &'a mut Self::Instance,
        region: &Self::Region,
    ) -> Result<&'a mut [u8]>;

    /// Creates the translation service. `cache_size` bounds the engine's
    /// response cache; 0 disables caching.
    fn new_service(&self, instance: &mut Self::Instance, cache_size: u32) -> Result<Self::Service>;

    /// Creates the translation model from the serialized options blob and
    /// the filled model, shortlist and vocabulary regions.
    fn new_model(
        &self,
        instance: &mut Self::Instance,
        options: &str,
        model: &Self::Region,
        shortlist: &Self::Region,
        vocabularies: &[&Self::Region],
    ) -> Result<Self::Model>;

    /// Translates a batch of texts. Output order matches input order 1:1.
    async fn translate(
        &self,
        instance: &mut Self::Instance,
        service: &Self::Service,
        model: &Self::Model,
        texts: &[String],
        options: &[ResponseOptions],
    ) -> Result<Vec<String>>;

    /// Deletes the model object.
    fn delete_model(&self, instance: &mut Self::Instance, model: &mut Self::Model) -> Result<()>;

    /// Deletes the service object.
    fn delete_service(
        &self,
        instance: &mut Self::Instance,
        service: &mut Self::Service,
    ) -> Result<()>;

    /// Releases the instance and its linear memory.
    fn release(&self, instance: Self::Instance) -> Result<()>;
}

/// Per-request options handed to the engine's translate call.
///
/// Quality scores and alignment info are features this crate does not
/// surface, so callers of the engine disable them to save work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseOptions {
    /// Ask the engine to score translation quality.
    pub quality_scores: bool,
    /// Ask the engine for source/target alignment info.
    pub alignment: bool,
    /// Strip markup from the input and restore it in the output.
    pub html: bool,
}

/// Engine options serialized into the configuration blob handed to
/// [`TranslationEngine::new_model`].
///
/// Keys and defaults mirror the decoder options of the embedded engine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineOptions {
    pub beam_size: u32,
    pub normalize: f64,
    pub word_penalty: u32,
    pub alignment: String,
    pub max_length_break: u32,
    pub mini_batch_words: u32,
    /// Workspace memory in MB.
    pub workspace: u32,
    pub max_length_factor: f64,
    pub skip_cost: bool,
    pub gemm_precision: String,
    pub tied_embedding_all: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            beam_size: 1,
            normalize: 1.0,
            word_penalty: 0,
            alignment: "soft".to_string(),
            max_length_break: 128,
            mini_batch_words: 1024,
            workspace: 128,
            max_length_factor: 2.0,
            skip_cost: true,
            gemm_precision: "int8shiftAll".to_string(),
            tied_embedding_all: true,
        }
    }
}
