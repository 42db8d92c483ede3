//! Finalizers and the LIFO cleanup chain.

use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use tracing::warn;

use crate::core::Outcome;
use crate::errors::{Cause, Failure};
use crate::job::Cx;
use crate::runtime::slot::JobRecord;
use crate::runtime::Runtime;

type SyncAction = Box<dyn FnOnce() -> anyhow::Result<()>>;
type AsyncAction = Box<dyn FnOnce() -> LocalBoxFuture<'static, anyhow::Result<()>>>;
type NestedBody = Box<dyn FnOnce(Cx) -> LocalBoxFuture<'static, anyhow::Result<()>>>;

/// A cleanup action registered on a job with [`Cx::on_end`].
///
/// All three kinds are awaited uniformly; a failure or panic in any of them
/// is aggregated into the owning job's settlement.
pub enum Finalizer {
    /// A plain closure.
    Sync(SyncAction),
    /// A closure returning a future.
    Async(AsyncAction),
    /// A coroutine run as a child job of the owner.
    Nested {
        /// Name of the finalizer job.
        name: String,
        /// The coroutine.
        body: NestedBody,
    },
}

impl Finalizer {
    /// Wraps a closure.
    pub fn sync<F>(action: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + 'static,
    {
        Self::Sync(Box::new(action))
    }

    /// Wraps a closure returning a future.
    pub fn future<F, Fut>(action: F) -> Self
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        Self::Async(Box::new(move || action().boxed_local()))
    }

    /// Wraps a coroutine to run as a child job.
    pub fn job<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        Self::Nested {
            name: name.into(),
            body: Box::new(move |cx| body(cx).boxed_local()),
        }
    }

    /// Short label used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sync(_) => "sync",
            Self::Async(_) => "async",
            Self::Nested { .. } => "nested",
        }
    }
}

impl fmt::Debug for Finalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nested { name, .. } => f.debug_struct("Nested").field("name", name).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// Runs `finalizers` last-registered-first and collects their failures.
///
/// Runs as the owner's task, so nested finalizer jobs become the owner's
/// children and the owner cannot settle before them.
pub(crate) async fn run_finalizers(
    rt: Runtime,
    owner: Rc<JobRecord>,
    finalizers: Vec<Finalizer>,
) -> Vec<Failure> {
    let mut failures = Vec::new();

    for finalizer in finalizers.into_iter().rev() {
        let kind = finalizer.kind();
        let result = match finalizer {
            Finalizer::Sync(action) => match catch_unwind(AssertUnwindSafe(action)) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(Failure::from_error(owner.name.as_str(), err)),
                Err(payload) => Err(Failure::panic(owner.name.as_str(), payload)),
            },
            Finalizer::Async(action) => match catch_unwind(AssertUnwindSafe(action)) {
                Ok(fut) => match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(err)) => Err(Failure::from_error(owner.name.as_str(), err)),
                    Err(payload) => Err(Failure::panic(owner.name.as_str(), payload)),
                },
                Err(payload) => Err(Failure::panic(owner.name.as_str(), payload)),
            },
            Finalizer::Nested { name, body } => {
                let job = rt.spawn_finalizer(owner.id, name, body);
                match job.outcome().await {
                    Outcome::Success(()) | Outcome::Cancelled { .. } => Ok(()),
                    Outcome::TimedOut { job } => Err(Failure::child(
                        owner.name.as_str(),
                        Failure::new(job, Cause::TimedOut),
                    )),
                    Outcome::Failed(failure) => Err(Failure::child(owner.name.as_str(), failure)),
                }
            }
        };

        if let Err(failure) = result {
            warn!(job = %owner.name, kind, error = %failure, "finalizer failed");
            failures.push(failure);
        }
    }

    failures
}
