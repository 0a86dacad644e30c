//! # Translator
//!
//! A single translation worker: one engine instance, its loaded resource
//! bundle, and the engine's service and model objects. Stateless between
//! calls apart from the engine's internal response cache.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::bundle::{FilesBundle, load_bundle};
use crate::engine::{EngineOptions, ResponseOptions, TranslationEngine};
use crate::error::{Error, Result};

/// Construction configuration for a [`Translator`].
pub struct Config<E: TranslationEngine> {
    /// The engine module image to compile.
    pub module: Bytes,

    /// Shared compilation cache. [`crate::Pool`] injects one automatically so
    /// its workers compile the module once; explicit rather than global state
    /// so multiple pools in one process stay independent.
    pub module_cache: Option<E::ModuleCache>,

    /// Bound on the engine's response cache, in cached entries. 0 disables
    /// caching. Eviction policy is the engine's own.
    pub cache_size: u32,

    /// Data to load into the translator. All three entries are required.
    pub bundle: FilesBundle,

    /// Decoder options serialized into the engine's configuration blob.
    pub options: EngineOptions,
}

impl<E: TranslationEngine> Config<E> {
    /// Creates a configuration with default options and no module cache.
    pub fn new(module: Bytes, bundle: FilesBundle) -> Self {
        Self {
            module,
            module_cache: None,
            cache_size: 0,
            bundle,
            options: EngineOptions::default(),
        }
    }

    /// Checks that every required resource is present, reporting all missing
    /// ones at once.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.bundle.model.is_none() {
            missing.push(Error::MissingModel);
        }
        if self.bundle.vocabulary.is_none() {
            missing.push(Error::MissingVocabulary);
        }
        if self.bundle.lexical_shortlist.is_none() {
            missing.push(Error::MissingShortlist);
        }
        match Error::join(missing) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

/// Options for a single translation request.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslationOptions {
    /// Strip HTML tags from the text and reinsert them in the output.
    pub html: bool,
}

/// One text to translate, with its options.
#[derive(Debug, Clone, Default)]
pub struct TranslationRequest {
    /// Text to be translated.
    pub text: String,
    /// Options for translation.
    pub options: TranslationOptions,
}

impl TranslationRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: TranslationOptions::default(),
        }
    }
}

/// A translation worker owning exactly one engine instance.
///
/// Constructed by compiling and instantiating the engine module, loading the
/// resource bundle into aligned memory, then creating the engine's service
/// and model objects. A construction failure releases the instance and
/// leaves nothing usable; partial resources are not retried.
pub struct Translator<E: TranslationEngine> {
    engine: Arc<E>,
    instance: E::Instance,
    service: E::Service,
    model: E::Model,
}

impl<E: TranslationEngine> std::fmt::Debug for Translator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator").finish_non_exhaustive()
    }
}

impl<E: TranslationEngine> Translator<E> {
    /// Compiles the engine module and builds the service and model objects
    /// backing this worker.
    pub async fn new(engine: Arc<E>, cfg: Config<E>) -> Result<Self> {
        cfg.validate()?;
        let Config {
            module,
            module_cache,
            cache_size,
            bundle,
            options,
        } = cfg;

        let compiled = engine.compile(&module, module_cache.as_ref())?;
        let mut instance = engine.instantiate(&compiled)?;

        let (service, model) =
            match setup(engine.as_ref(), &mut instance, bundle, cache_size, &options).await {
                Ok(parts) => parts,
                Err(err) => {
                    // The sandbox is unusable; give its memory back. The
                    // original failure is the one worth reporting.
                    if let Err(release_err) = engine.release(instance) {
                        debug!(%release_err, "failed to release instance after setup error");
                    }
                    return Err(err);
                }
            };

        Ok(Self {
            engine,
            instance,
            service,
            model,
        })
    }

    /// Translates a batch of requests into the model's target language.
    ///
    /// Output order matches input order one-to-one.
    pub async fn translate_multiple(
        &mut self,
        requests: &[TranslationRequest],
    ) -> Result<Vec<String>> {
        let texts: Vec<String> = requests.iter().map(|r| r.text.clone()).collect();
        let options: Vec<ResponseOptions> = requests
            .iter()
            .map(|r| ResponseOptions {
                // Quality scores and alignment info are not surfaced by this
                // crate, so they are disabled to save engine work.
                quality_scores: false,
                alignment: false,
                html: r.options.html,
            })
            .collect();
        self.engine
            .translate(&mut self.instance, &self.service, &self.model, &texts, &options)
            .await
    }

    /// Translates a single request; convenience form of
    /// [`Translator::translate_multiple`].
    pub async fn translate(&mut self, request: TranslationRequest) -> Result<String> {
        let mut outputs = self
            .translate_multiple(std::slice::from_ref(&request))
            .await?;
        if outputs.is_empty() {
            return Err(Error::EmptyResponse);
        }
        Ok(outputs.swap_remove(0))
    }

    /// Deletes the engine objects and releases the instance.
    ///
    /// The first failing step's error is returned and the instance must be
    /// treated as partially torn down; do not rebuild on top of it.
    pub fn close(self) -> Result<()> {
        let Self {
            engine,
            mut instance,
            mut service,
            mut model,
        } = self;
        engine.delete_model(&mut instance, &mut model)?;
        engine.delete_service(&mut instance, &mut service)?;
        engine.release(instance)
    }
}

async fn setup<E: TranslationEngine>(
    engine: &E,
    instance: &mut E::Instance,
    bundle: FilesBundle,
    cache_size: u32,
    options: &EngineOptions,
) -> Result<(E::Service, E::Model)> {
    let loaded = load_bundle(engine, instance, bundle).await?;
    let service = engine.new_service(instance, cache_size)?;
    let blob = serde_json::to_string(options)?;
    let model = engine.new_model(
        instance,
        &blob,
        loaded.model()?,
        loaded.shortlist()?,
        &[loaded.vocabulary()?],
    )?;
    Ok((service, model))
}
