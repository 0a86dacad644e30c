//! # Tsuyaku
//!
//! A pooled runtime for embedded, sandboxed translation engines: many
//! concurrent callers translate text without serializing on a single engine
//! instance.
//!
//! ## Overview
//!
//! The engine itself is an opaque external capability. It accepts a
//! configuration blob plus three binary resources (model weights, a lexical
//! shortlist, a vocabulary) and exposes a synchronous "translate a batch of
//! strings" operation. Everything in this crate is the machinery *around*
//! that black box:
//!
//! - A **bounded worker pool** that creates several independent engine
//!   instances, routes requests to whichever instance is free, and shuts
//!   them all down cleanly while aggregating failures.
//! - An **aligned resource loader** that sizes three byte sources, grows the
//!   engine's linear memory to fit them, and copies each into a correctly
//!   aligned region in a strictly ordered sequence, because views into the
//!   memory are invalidated by later allocations.
//! - A **joined-error task group** that always waits for every task and
//!   merges every failure, rather than racing to the first error.
//!
//! ## Architecture
//!
//! ### Engine capability
//!
//! The [`TranslationEngine`] trait is the seam between this crate and any
//! concrete engine binding. Pool, translator and loader logic depend only on
//! this trait, so the binding mechanism never leaks into the core.
//!
//! ### Workers and dispatch
//!
//! A [`Pool`] reads the three resources once into shared immutable buffers,
//! builds its [`Translator`] workers concurrently, and runs one dispatch
//! loop per worker against a shared request queue. Each loop owns exactly
//! one translator, so no two concurrent calls ever touch the same engine
//! instance — mutual exclusion is structural, not lock-based.
//!
//! ### Errors
//!
//! Concurrent phases report every fault, not just the first: see
//! [`ErrorGroup`] and [`Error::contains`] for matching individual sentinels
//! inside a merged error.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tsuyaku::{Config, FilesBundle, Pool, PoolConfig, TranslationRequest};
//!
//! async fn example(engine: Arc<impl tsuyaku::TranslationEngine>) -> tsuyaku::Result<()> {
//!     let bundle = FilesBundle {
//!         model: Some(std::fs::File::open("model.bin")?.into()),
//!         lexical_shortlist: Some(std::fs::File::open("lex.bin")?.into()),
//!         vocabulary: Some(std::fs::File::open("vocab.spm")?.into()),
//!     };
//!     let pool = Pool::new(engine, PoolConfig {
//!         config: Config::new(module_image(), bundle),
//!         pool_size: 3,
//!     }).await?;
//!
//!     let output = pool.translate(TranslationRequest::new("Hello World")).await?;
//!     pool.close(Duration::from_secs(10)).await?;
//!     Ok(())
//! }
//! ```

mod bundle;
mod errgroup;
mod error;
mod pool;
mod source;
mod translator;

pub mod engine;

pub use bundle::FilesBundle;
pub use engine::{EngineOptions, MEMORY_PAGE_SIZE, ResponseOptions, TranslationEngine};
pub use errgroup::ErrorGroup;
pub use error::{Error, Result};
pub use pool::{Pool, PoolConfig};
pub use source::{ReadSeek, ResourceSource};
pub use translator::{Config, TranslationOptions, TranslationRequest, Translator};
