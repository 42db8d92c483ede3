//! The per-job context handed to every coroutine.

use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use super::Job;
use crate::cancellation::Finalizer;
use crate::channel::Channel;
use crate::core::{JobId, JobState};
use crate::errors::RuntimeError;
use crate::runtime::slot::{CleanupPhase, JobRecord};
use crate::runtime::Runtime;
use crate::time::{Sleep, YieldNow};

/// Context of a running job: spawning children, sleeping, registering
/// finalizers and creating channels all go through it.
#[derive(Clone)]
pub struct Cx {
    rt: Runtime,
    record: Rc<JobRecord>,
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("job", &self.record.name)
            .field("id", &self.record.id)
            .finish()
    }
}

impl Cx {
    pub(crate) fn new(rt: Runtime, record: Rc<JobRecord>) -> Self {
        Self { rt, record }
    }

    /// This job's id.
    #[must_use]
    pub fn id(&self) -> JobId {
        self.record.id
    }

    /// This job's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.record.name
    }

    /// The owning runtime.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    /// Current runtime clock reading.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.rt.now()
    }

    /// True once this job is being cancelled.
    #[must_use]
    pub fn is_cancelling(&self) -> bool {
        self.record.state.get() == JobState::Cancelling
    }

    /// Spawns a child of this job and runs it to its first suspension.
    pub fn spawn<T, F, Fut>(&self, name: impl Into<String>, body: F) -> Job<T>
    where
        T: 'static,
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
    {
        let parent = if self.rt.job_state(self.record.id).is_some() {
            Some(self.record.id)
        } else {
            self.rt.current_job()
        };
        self.rt.spawn_under(parent, name.into(), body)
    }

    /// Suspends this job for `duration`.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        self.sleep_until(self.rt.now().saturating_add(duration))
    }

    /// Suspends this job until the clock reads `deadline`.
    pub fn sleep_until(&self, deadline: Duration) -> Sleep {
        Sleep::until(self.rt.clone(), deadline)
    }

    /// Re-queues this job behind everything already ready.
    pub fn yield_now(&self) -> YieldNow {
        YieldNow::new()
    }

    /// Creates a channel.
    #[must_use]
    pub fn channel<T: 'static>(&self, capacity: usize) -> Channel<T> {
        self.rt.channel(capacity)
    }

    /// Registers a finalizer. Finalizers run last-registered-first when the
    /// job settles, whether it completed, failed or was cancelled.
    pub fn on_end(&self, finalizer: Finalizer) -> Result<(), RuntimeError> {
        let rejected = {
            let mut core = self.rt.core_mut();
            match core.jobs.get_mut(&self.record.id) {
                Some(slot) if slot.cleanup == CleanupPhase::NotStarted => {
                    slot.finalizers.push(finalizer);
                    None
                }
                _ => Some(finalizer),
            }
        };
        match rejected {
            None => Ok(()),
            Some(finalizer) => {
                drop(finalizer);
                Err(RuntimeError::NotAccepting {
                    job: self.record.name.clone(),
                })
            }
        }
    }

    /// Registers a closure finalizer.
    pub fn defer<F>(&self, action: F) -> Result<(), RuntimeError>
    where
        F: FnOnce() -> anyhow::Result<()> + 'static,
    {
        self.on_end(Finalizer::sync(action))
    }

    /// Registers a finalizer that returns a future.
    pub fn defer_async<F, Fut>(&self, action: F) -> Result<(), RuntimeError>
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.on_end(Finalizer::future(action))
    }

    /// Registers a coroutine finalizer, run as a child job named `name`.
    pub fn defer_job<F, Fut>(&self, name: impl Into<String>, body: F) -> Result<(), RuntimeError>
    where
        F: FnOnce(Cx) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.on_end(Finalizer::job(name, body))
    }

    /// Takes ownership of `job`, making it a child of this job.
    pub fn adopt<T: 'static>(&self, job: &Job<T>) -> Result<(), RuntimeError> {
        self.rt.reparent(job.id(), Some(self.record.id))
    }
}
