//! In-memory engine binding used by the crate's tests.
//!
//! The mock keeps a plain `Vec<u8>` as linear memory with a bump allocator on
//! top, and "translates" by lexicon lookup (falling back to reversing the
//! text). It also enforces the addressing hazard the real engine has: an
//! allocation after any byte view has been taken is rejected, so tests catch
//! phase-ordering mistakes in the loader.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};

use super::{MEMORY_PAGE_SIZE, ResponseOptions, TranslationEngine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MockOp {
    Grow { pages: u32 },
    Allocate { size: u32, alignment: u32 },
    View,
}

pub(crate) struct MockEngine {
    lexicon: HashMap<String, String>,
    return_empty: bool,
    compiles: Arc<AtomicUsize>,
    live_instances: Arc<AtomicUsize>,
}

impl MockEngine {
    pub(crate) fn new() -> Self {
        Self {
            lexicon: HashMap::new(),
            return_empty: false,
            compiles: Arc::new(AtomicUsize::new(0)),
            live_instances: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// An engine that misbehaves by returning zero outputs for any batch.
    pub(crate) fn returning_empty() -> Self {
        let mut engine = Self::new();
        engine.return_empty = true;
        engine
    }

    pub(crate) fn with_lexicon<const N: usize>(entries: [(&str, &str); N]) -> Self {
        let mut engine = Self::new();
        engine.lexicon = entries
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        engine
    }

    /// Number of actual (cache-missing) compilations performed.
    pub(crate) fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    /// Number of instantiated-but-not-released instances.
    pub(crate) fn live_instances(&self) -> usize {
        self.live_instances.load(Ordering::SeqCst)
    }

    fn translate_one(&self, text: &str) -> String {
        match self.lexicon.get(text) {
            Some(translated) => translated.clone(),
            None => text.chars().rev().collect(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct MockModule {
    image: Bytes,
}

#[derive(Clone, Default)]
pub(crate) struct MockModuleCache {
    modules: Arc<Mutex<HashMap<Vec<u8>, MockModule>>>,
}

pub(crate) struct MockInstance {
    memory: Vec<u8>,
    cursor: u32,
    views_taken: usize,
    pub(crate) ops: Vec<MockOp>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct MockRegion {
    offset: usize,
    len: usize,
}

pub(crate) struct MockService {
    cache_size: u32,
    deleted: bool,
}

pub(crate) struct MockModel {
    pub(crate) options: String,
    pub(crate) model_data: Vec<u8>,
    pub(crate) shortlist_data: Vec<u8>,
    pub(crate) vocabulary_data: Vec<u8>,
    deleted: bool,
}

fn region_bytes(memory: &[u8], region: &MockRegion) -> Result<Vec<u8>> {
    memory
        .get(region.offset..region.offset + region.len)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| Error::Engine("region out of bounds".to_string()))
}

#[async_trait]
impl TranslationEngine for MockEngine {
    type Module = MockModule;
    type ModuleCache = MockModuleCache;
    type Instance = MockInstance;
    type Region = MockRegion;
    type Service = MockService;
    type Model = MockModel;

    fn new_module_cache(&self) -> Self::ModuleCache {
        MockModuleCache::default()
    }

    fn compile(&self, image: &[u8], cache: Option<&Self::ModuleCache>) -> Result<Self::Module> {
        if image.is_empty() {
            return Err(Error::Engine("empty module image".to_string()));
        }
        if let Some(cache) = cache {
            let mut modules = cache
                .modules
                .lock()
                .map_err(|_| Error::Engine("module cache poisoned".to_string()))?;
            if let Some(module) = modules.get(image) {
                return Ok(module.clone());
            }
            self.compiles.fetch_add(1, Ordering::SeqCst);
            let module = MockModule {
                image: Bytes::copy_from_slice(image),
            };
            modules.insert(image.to_vec(), module.clone());
            return Ok(module);
        }
        self.compiles.fetch_add(1, Ordering::SeqCst);
        Ok(MockModule {
            image: Bytes::copy_from_slice(image),
        })
    }

    fn instantiate(&self, _module: &Self::Module) -> Result<Self::Instance> {
        self.live_instances.fetch_add(1, Ordering::SeqCst);
        Ok(MockInstance {
            memory: Vec::new(),
            cursor: 0,
            views_taken: 0,
            ops: Vec::new(),
        })
    }

    fn memory_size(&self, instance: &Self::Instance) -> u64 {
        instance.memory.len() as u64
    }

    fn grow_memory(&self, instance: &mut Self::Instance, pages: u32) -> Result<()> {
        instance.ops.push(MockOp::Grow { pages });
        let new_len = instance.memory.len() + pages as usize * MEMORY_PAGE_SIZE as usize;
        instance.memory.resize(new_len, 0);
        Ok(())
    }

    fn allocate_aligned(
        &self,
        instance: &mut Self::Instance,
        size: u32,
        alignment: u32,
    ) -> Result<Self::Region> {
        if !alignment.is_power_of_two() {
            return Err(Error::Engine(format!("alignment {alignment} not a power of two")));
        }
        if instance.views_taken > 0 {
            return Err(Error::Engine(
                "allocation would invalidate outstanding byte views".to_string(),
            ));
        }
        instance.ops.push(MockOp::Allocate { size, alignment });

        let offset = instance.cursor.next_multiple_of(alignment);
        let end = offset as u64 + u64::from(size);
        if end > instance.memory.len() as u64 {
            return Err(Error::Engine("out of linear memory".to_string()));
        }
        instance.cursor = end as u32;
        Ok(MockRegion {
            offset: offset as usize,
            len: size as usize,
        })
    }

    fn byte_view_mut<'a>(
        &self,
        instance: &'a mut Self::Instance,
        region: &Self::Region,
    ) -> Result<&'a mut [u8]> {
        instance.ops.push(MockOp::View);
        instance.views_taken += 1;
        instance
            .memory
            .get_mut(region.offset..region.offset + region.len)
            .ok_or_else(|| Error::Engine("region out of bounds".to_string()))
    }

    fn new_service(&self, _instance: &mut Self::Instance, cache_size: u32) -> Result<Self::Service> {
        Ok(MockService {
            cache_size,
            deleted: false,
        })
    }

    fn new_model(
        &self,
        instance: &mut Self::Instance,
        options: &str,
        model: &Self::Region,
        shortlist: &Self::Region,
        vocabularies: &[&Self::Region],
    ) -> Result<Self::Model> {
        let parsed: serde_json::Value = serde_json::from_str(options)
            .map_err(|err| Error::Engine(format!("bad options blob: {err}")))?;
        if parsed.get("beam-size").is_none() {
            return Err(Error::Engine("options blob missing beam-size".to_string()));
        }
        let model_data = region_bytes(&instance.memory, model)?;
        if model_data.is_empty() {
            return Err(Error::Engine("empty model data".to_string()));
        }
        let shortlist_data = region_bytes(&instance.memory, shortlist)?;
        let [vocabulary] = vocabularies else {
            return Err(Error::Engine(format!(
                "expected exactly 1 vocabulary, got {}",
                vocabularies.len()
            )));
        };
        Ok(MockModel {
            options: options.to_string(),
            model_data,
            shortlist_data,
            vocabulary_data: region_bytes(&instance.memory, *vocabulary)?,
            deleted: false,
        })
    }

    async fn translate(
        &self,
        _instance: &mut Self::Instance,
        service: &Self::Service,
        model: &Self::Model,
        texts: &[String],
        options: &[ResponseOptions],
    ) -> Result<Vec<String>> {
        if service.deleted || model.deleted {
            return Err(Error::Engine("use after delete".to_string()));
        }
        if texts.len() != options.len() {
            return Err(Error::Engine("texts/options length mismatch".to_string()));
        }
        for opts in options {
            if opts.quality_scores || opts.alignment {
                return Err(Error::Engine(
                    "quality estimation is not supported".to_string(),
                ));
            }
        }
        let _ = service.cache_size;
        if self.return_empty {
            return Ok(Vec::new());
        }
        Ok(texts.iter().map(|text| self.translate_one(text)).collect())
    }

    fn delete_model(&self, _instance: &mut Self::Instance, model: &mut Self::Model) -> Result<()> {
        if model.deleted {
            return Err(Error::Engine("model already deleted".to_string()));
        }
        model.deleted = true;
        Ok(())
    }

    fn delete_service(
        &self,
        _instance: &mut Self::Instance,
        service: &mut Self::Service,
    ) -> Result<()> {
        if service.deleted {
            return Err(Error::Engine("service already deleted".to_string()));
        }
        service.deleted = true;
        Ok(())
    }

    fn release(&self, instance: Self::Instance) -> Result<()> {
        self.live_instances.fetch_sub(1, Ordering::SeqCst);
        drop(instance);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_compile_cache_dedupes_by_image() {
        let engine = MockEngine::new();
        let cache = engine.new_module_cache();

        let first = engine.compile(b"mod", Some(&cache)).unwrap();
        let second = engine.compile(b"mod", Some(&cache)).unwrap();

        assert_eq!(engine.compile_count(), 1);
        assert_eq!(first.image, second.image);
    }

    #[tokio::test]
    async fn test_allocate_requires_grown_memory() {
        let engine = MockEngine::new();
        let module = engine.compile(b"mod", None).unwrap();
        let mut instance = engine.instantiate(&module).unwrap();

        // Fresh instance has no memory; allocation must fail until grown.
        let err = engine.allocate_aligned(&mut instance, 16, 8).unwrap_err();
        assert!(matches!(err, Error::Engine(_)));

        engine.grow_memory(&mut instance, 1).unwrap();
        let region = engine.allocate_aligned(&mut instance, 16, 8).unwrap();
        assert_eq!(region.len, 16);

        engine.release(instance).unwrap();
        assert_eq!(engine.live_instances(), 0);
    }

    #[tokio::test]
    async fn test_allocation_after_view_is_rejected() {
        let engine = MockEngine::new();
        let module = engine.compile(b"mod", None).unwrap();
        let mut instance = engine.instantiate(&module).unwrap();
        engine.grow_memory(&mut instance, 1).unwrap();

        let region = engine.allocate_aligned(&mut instance, 16, 8).unwrap();
        let _ = engine.byte_view_mut(&mut instance, &region).unwrap();

        let err = engine.allocate_aligned(&mut instance, 16, 8).unwrap_err();
        assert!(matches!(err, Error::Engine(_)));
    }
}
