//! # Translator pool
//!
//! Runs several independent [`Translator`] workers behind one request queue
//! so concurrent callers never serialize on a single engine instance.
//!
//! ## Concurrency model
//!
//! Each dispatch loop owns exactly one translator and serves it
//! synchronously, so mutual exclusion per engine instance is structural, not
//! lock-based. The resource bytes are read once and shared read-only across
//! all workers; the closed flag is the only mutable shared state and
//! transitions exactly once.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::bundle::FilesBundle;
use crate::errgroup::ErrorGroup;
use crate::error::{Error, Result};
use crate::engine::TranslationEngine;
use crate::source::ResourceSource;
use crate::translator::{Config, TranslationRequest, Translator};

/// Construction configuration for a [`Pool`].
pub struct PoolConfig<E: TranslationEngine> {
    /// Per-worker translator configuration.
    pub config: Config<E>,
    /// Number of workers; must be at least 1 and is immutable afterwards.
    pub pool_size: usize,
}

impl<E: TranslationEngine> PoolConfig<E> {
    /// Validates the pool size together with the worker configuration,
    /// reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.pool_size == 0 {
            errors.push(Error::ZeroPoolSize);
        }
        if let Err(err) = self.config.validate() {
            errors.push(err);
        }
        match Error::join(errors) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

/// An envelope pairing a caller's batch with its single-use reply slot.
struct WorkRequest {
    id: Uuid,
    requests: Vec<TranslationRequest>,
    reply: oneshot::Sender<Result<Vec<String>>>,
}

/// A fixed-size pool of [`Translator`] workers sharing one request queue.
///
/// Requests are handed to whichever worker is free; within one batch the
/// output order matches the input order, across batches there is no ordering
/// guarantee. Dropping a `translate` future before it completes abandons the
/// request: if it was not yet delivered to a worker, it never executes.
pub struct Pool {
    queue: mpsc::Sender<WorkRequest>,
    closed: watch::Sender<bool>,
    workers: Mutex<Option<ErrorGroup<()>>>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").finish_non_exhaustive()
    }
}

impl Pool {
    /// Builds `pool_size` translators concurrently and starts one dispatch
    /// loop per translator.
    ///
    /// The three resources are read exactly once into shared buffers, so a
    /// streaming source is not consumed N times. If any worker fails to
    /// build, the merged error is returned and no pool exists.
    pub async fn new<E: TranslationEngine>(
        engine: Arc<E>,
        cfg: PoolConfig<E>,
    ) -> Result<Self> {
        cfg.validate()?;
        let PoolConfig {
            mut config,
            pool_size,
        } = cfg;

        if config.module_cache.is_none() {
            // One cache across workers avoids recompiling the module N times.
            config.module_cache = Some(engine.new_module_cache());
        }

        let model = read_required(&mut config.bundle.model, Error::MissingModel)?;
        let shortlist =
            read_required(&mut config.bundle.lexical_shortlist, Error::MissingShortlist)?;
        let vocabulary = read_required(&mut config.bundle.vocabulary, Error::MissingVocabulary)?;

        info!(pool_size, "building translator pool");
        let mut builders: ErrorGroup<Translator<E>> = ErrorGroup::new();
        for worker in 0..pool_size {
            let engine = engine.clone();
            let worker_cfg = Config {
                module: config.module.clone(),
                module_cache: config.module_cache.clone(),
                cache_size: config.cache_size,
                bundle: FilesBundle {
                    model: Some(ResourceSource::Bytes(model.clone())),
                    lexical_shortlist: Some(ResourceSource::Bytes(shortlist.clone())),
                    vocabulary: Some(ResourceSource::Bytes(vocabulary.clone())),
                },
                options: config.options.clone(),
            };
            builders.spawn(async move {
                debug!(worker, "building translator");
                Translator::new(engine, worker_cfg).await
            });
        }
        let translators = builders.wait().await?;

        let (queue_tx, queue_rx) = mpsc::channel(1);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let (closed_tx, closed_rx) = watch::channel(false);

        let mut workers: ErrorGroup<()> = ErrorGroup::new();
        for translator in translators {
            workers.spawn(run_worker(translator, queue_rx.clone(), closed_rx.clone()));
        }

        Ok(Self {
            queue: queue_tx,
            closed: closed_tx,
            workers: Mutex::new(Some(workers)),
        })
    }

    /// Hands the batch to any free worker and waits for its reply.
    ///
    /// Both the handoff and the reply wait race against pool shutdown;
    /// losing either race yields [`Error::PoolClosed`]. A request is either
    /// delivered to exactly one worker or fails before delivery, never
    /// silently dropped.
    pub async fn translate_multiple(
        &self,
        requests: Vec<TranslationRequest>,
    ) -> Result<Vec<String>> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(Error::PoolClosed);
        }

        let id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        let work = WorkRequest {
            id,
            requests,
            reply: reply_tx,
        };

        tokio::select! {
            _ = closed.changed() => return Err(Error::PoolClosed),
            sent = self.queue.send(work) => {
                if sent.is_err() {
                    return Err(Error::PoolClosed);
                }
            }
        }
        debug!(%id, "request handed to the pool");

        tokio::select! {
            _ = closed.changed() => Err(Error::PoolClosed),
            reply = reply_rx => match reply {
                Ok(result) => result,
                // The serving worker went away before replying.
                Err(_) => Err(Error::PoolClosed),
            },
        }
    }

    /// Translates a single request; convenience form of
    /// [`Pool::translate_multiple`].
    pub async fn translate(&self, request: TranslationRequest) -> Result<String> {
        let mut outputs = self.translate_multiple(vec![request]).await?;
        if outputs.is_empty() {
            return Err(Error::EmptyResponse);
        }
        Ok(outputs.swap_remove(0))
    }

    /// Shuts the pool down and waits for every worker to close, bounded by
    /// `deadline`.
    ///
    /// The closed flag transitions once; calling `close` again is safe and
    /// returns immediately. Workers finish any request already in flight,
    /// close their translators, and their failures are merged. On deadline
    /// the shutdown keeps running in the background and
    /// [`Error::DeadlineExceeded`] is returned.
    pub async fn close(&self, deadline: Duration) -> Result<()> {
        self.closed.send_replace(true);

        let workers = self.workers.lock().await.take();
        let Some(workers) = workers else {
            return Ok(());
        };

        info!("closing translator pool");
        let shutdown = tokio::spawn(workers.wait());
        match tokio::time::timeout(deadline, shutdown).await {
            Err(_) => Err(Error::DeadlineExceeded),
            Ok(Err(join_err)) => Err(Error::Task(join_err.to_string())),
            Ok(Ok(result)) => result.map(|_| ()),
        }
    }
}

fn read_required(source: &mut Option<ResourceSource>, missing: Error) -> Result<Bytes> {
    match source.as_mut() {
        Some(source) => source.read_all(),
        None => Err(missing),
    }
}

/// One dispatch loop: serves the shared queue with its own translator until
/// shutdown, then closes the translator.
async fn run_worker<E: TranslationEngine>(
    mut translator: Translator<E>,
    queue: Arc<Mutex<mpsc::Receiver<WorkRequest>>>,
    mut closed: watch::Receiver<bool>,
) -> Result<()> {
    loop {
        let work = tokio::select! {
            _ = closed.changed() => None,
            work = next_request(&queue) => work,
        };
        let Some(work) = work else {
            return translator.close();
        };

        let result = translator.translate_multiple(&work.requests).await;
        if work.reply.send(result).is_err() {
            // The caller stopped waiting; the orphaned reply is discarded.
            debug!(id = %work.id, "dropping reply for abandoned request");
        }
    }
}

async fn next_request(queue: &Mutex<mpsc::Receiver<WorkRequest>>) -> Option<WorkRequest> {
    queue.lock().await.recv().await
}
