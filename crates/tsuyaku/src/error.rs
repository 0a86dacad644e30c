//! Error types shared across the crate.
//!
//! Concurrent phases (resource sizing, worker construction, shutdown) report
//! *every* fault they observed, not just the first one. [`Error::join`] builds
//! the composite and [`Error::contains`] lets callers match an individual
//! sentinel inside it.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unified error type for pool, translator and resource loading failures.
#[derive(Debug, Error)]
pub enum Error {
    /// The model resource was not provided in the configuration.
    #[error("model is required")]
    MissingModel,

    /// The vocabulary resource was not provided in the configuration.
    #[error("vocabulary is required")]
    MissingVocabulary,

    /// The lexical shortlist resource was not provided in the configuration.
    #[error("lexical shortlist is required")]
    MissingShortlist,

    /// Pool was configured with zero workers.
    #[error("zero pool size")]
    ZeroPoolSize,

    /// The pool has been closed and no longer accepts requests.
    #[error("pool closed")]
    PoolClosed,

    /// A bounded wait elapsed before the operation finished.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A resource is larger than the engine's 32-bit address space can hold.
    #[error("file with size {size} too large")]
    FileTooLarge { size: u64 },

    /// Fewer bytes reached an aligned region than its resolved size requires.
    #[error("only wrote {written}/{expected} bytes")]
    ShortWrite { written: u64, expected: u64 },

    /// The engine returned no outputs for a non-empty batch.
    #[error("expected translated texts to have at least 1 element")]
    EmptyResponse,

    /// Failure reported by the engine binding.
    #[error("engine: {0}")]
    Engine(String),

    /// Reading or seeking a resource source failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Engine options could not be serialized to the engine's config format.
    #[error("failed to serialize engine options: {0}")]
    Options(#[from] serde_json::Error),

    /// A grouped task failed to join, usually because it panicked.
    #[error("task failed: {0}")]
    Task(String),

    /// Composite of every failure observed across a group of tasks.
    #[error("{}", format_joined(.0))]
    Joined(Vec<Error>),
}

impl Error {
    /// Merges a set of errors into a single value.
    ///
    /// Returns `None` for an empty set, the error itself for a single entry,
    /// and [`Error::Joined`] otherwise. Nested composites are flattened so
    /// [`Error::contains`] always sees leaves.
    pub fn join(errors: Vec<Error>) -> Option<Error> {
        let mut leaves = Vec::with_capacity(errors.len());
        for err in errors {
            match err {
                Error::Joined(inner) => leaves.extend(inner),
                other => leaves.push(other),
            }
        }
        match leaves.len() {
            0 => None,
            1 => leaves.pop(),
            _ => Some(Error::Joined(leaves)),
        }
    }

    /// Reports whether this error, or any leaf of a composite, matches the
    /// predicate.
    ///
    /// ```
    /// use tsuyaku::Error;
    ///
    /// let err = Error::join(vec![Error::MissingModel, Error::MissingVocabulary]).unwrap();
    /// assert!(err.contains(|e| matches!(e, Error::MissingModel)));
    /// assert!(!err.contains(|e| matches!(e, Error::PoolClosed)));
    /// ```
    pub fn contains(&self, pred: impl Fn(&Error) -> bool) -> bool {
        self.iter().any(pred)
    }

    /// Iterates over the leaves of this error. A non-composite error yields
    /// itself exactly once.
    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        match self {
            Error::Joined(errors) => errors.iter(),
            other => std::slice::from_ref(other).iter(),
        }
    }
}

fn format_joined(errors: &[Error]) -> String {
    let parts: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    parts.join("\n")
}
