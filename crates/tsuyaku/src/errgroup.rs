//! # ErrorGroup
//!
//! A task group that always waits for every spawned task and merges every
//! failure, unlike fail-fast groups that cancel siblings on the first error.
//!
//! ## Usage Context
//!
//! Resource loading and worker startup run several independent fallible tasks
//! at once. Operators need the complete failure picture in one error (say,
//! two corrupt files), so the group never races to the first failure: it
//! joins all of them with [`Error::join`].

use tokio::task::JoinSet;

use crate::error::{Error, Result};

/// Runs independent fallible tasks and merges their failures on [`wait`].
///
/// Tasks produce `Result<T, Error>`; successful outputs are collected in
/// completion order, which is unspecified. Tasks must not depend on each
/// other's completion order.
///
/// [`wait`]: ErrorGroup::wait
pub struct ErrorGroup<T = ()> {
    tasks: JoinSet<Result<T>>,
}

impl<T: Send + 'static> ErrorGroup<T> {
    /// Creates an empty group.
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
        }
    }

    /// Schedules a task on the runtime. Its error, if any, becomes part of
    /// the merged error returned by [`ErrorGroup::wait`].
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    /// Waits for every spawned task to complete.
    ///
    /// Returns the successful outputs in completion order if all tasks
    /// succeeded, otherwise a single error joining every observed failure.
    /// A panicked task surfaces as [`Error::Task`] rather than being dropped.
    pub async fn wait(mut self) -> Result<Vec<T>> {
        let mut outputs = Vec::new();
        let mut errors = Vec::new();

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Ok(output)) => outputs.push(output),
                Ok(Err(err)) => errors.push(err),
                Err(join_err) => errors.push(Error::Task(join_err.to_string())),
            }
        }

        match Error::join(errors) {
            None => Ok(outputs),
            Some(err) => Err(err),
        }
    }
}

impl<T: Send + 'static> Default for ErrorGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}
