//! The runtime context object.
//!
//! A [`Runtime`] owns every piece of scheduler state: the arena of live jobs
//! (indexed by [`JobId`], parent/child links are plain ids), the run stack
//! of jobs currently being polled, the ready queue drained by the
//! trampoline, the timer wheel and the clock. It is a cheap `Rc` handle;
//! clones share state. Nothing here is process-global.

mod builder;
mod config;
mod driver;
mod ready;
mod scheduler;
mod settle;
pub(crate) mod slot;

#[cfg(test)]
mod runtime_tests;

pub use builder::RuntimeBuilder;
pub use config::{RuntimeConfig, CANCEL_GRACE_ENV, CLOCK_ENV};

use std::cell::{Cell, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use crate::channel::Channel;
use crate::core::{JobId, JobState};
use crate::events::EventSink;
use crate::time::{Clock, TimerHandle, TimerWheel};
use crate::utils::iso_timestamp;
use ready::ReadyQueue;
use slot::{JobRecord, JobSlot};

pub(crate) struct Core {
    pub(crate) jobs: HashMap<JobId, JobSlot>,
    pub(crate) run_stack: Vec<JobId>,
    next_id: u64,
}

impl Core {
    fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            run_stack: Vec::new(),
            next_id: 1,
        }
    }

    fn next_id(&mut self) -> JobId {
        let id = JobId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Children a cancellation sweep reaches: everything but nested finalizers.
    pub(crate) fn cancellable_children(&self, id: JobId) -> Vec<JobId> {
        self.jobs.get(&id).map_or_else(Vec::new, |slot| {
            slot.children
                .iter()
                .copied()
                .filter(|child| self.jobs.get(child).map_or(false, |c| !c.finalizer))
                .collect()
        })
    }
}

pub(crate) struct Inner {
    pub(crate) core: RefCell<Core>,
    pub(crate) ready: Arc<ReadyQueue>,
    pub(crate) timers: TimerWheel,
    pub(crate) clock: Clock,
    pub(crate) config: RuntimeConfig,
    pub(crate) sink: Arc<dyn EventSink>,
    /// Nesting depth of `step` calls on the native stack.
    pub(crate) depth: Cell<usize>,
    pub(crate) draining: Cell<bool>,
}

/// Handle to a single-threaded structured-concurrency runtime.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<Inner>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("clock", &self.inner.config.clock)
            .field("now", &self.now())
            .field("jobs", &self.job_count())
            .field("ready", &self.inner.ready.len())
            .field("timers", &self.inner.timers.len())
            .finish()
    }
}

impl Runtime {
    /// Creates a runtime with the default configuration (wall clock).
    #[must_use]
    pub fn new() -> Self {
        RuntimeBuilder::new().build()
    }

    /// Creates a runtime on a virtual clock, for deterministic tests.
    #[must_use]
    pub fn lab() -> Self {
        RuntimeBuilder::new().config(RuntimeConfig::lab()).build()
    }

    /// Creates a runtime from a configuration.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        RuntimeBuilder::new().config(config).build()
    }

    /// Returns a builder.
    #[must_use]
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub(crate) fn from_parts(config: RuntimeConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            inner: Rc::new(Inner {
                core: RefCell::new(Core::new()),
                ready: Arc::new(ReadyQueue::new()),
                timers: TimerWheel::new(),
                clock: Clock::new(config.clock),
                config,
                sink,
                depth: Cell::new(0),
                draining: Cell::new(false),
            }),
        }
    }

    /// The configuration this runtime was built with.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Time elapsed on the runtime clock since creation.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.inner.clock.now()
    }

    /// Schedules `callback` to run once `delay` has elapsed.
    ///
    /// Callbacks run on the driver, outside any job; to affect a job they
    /// should wake it rather than mutate it.
    pub fn schedule_after<F>(&self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce() + 'static,
    {
        self.schedule_at(self.now().saturating_add(delay), callback)
    }

    /// Schedules `callback` at an absolute clock reading.
    pub fn schedule_at<F>(&self, deadline: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce() + 'static,
    {
        self.inner.timers.schedule_at(deadline, callback)
    }

    /// Creates a channel. Capacity 0 is a pure rendezvous.
    #[must_use]
    pub fn channel<T: 'static>(&self, capacity: usize) -> Channel<T> {
        Channel::new(self.clone(), capacity)
    }

    /// The job currently being polled, if any.
    #[must_use]
    pub fn current_job(&self) -> Option<JobId> {
        self.inner.core.borrow().run_stack.last().copied()
    }

    /// Number of jobs that have not settled yet.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.inner.core.borrow().jobs.len()
    }

    /// The state of a live job; `None` once it settled.
    #[must_use]
    pub fn job_state(&self, id: JobId) -> Option<JobState> {
        self.inner.core.borrow().jobs.get(&id).map(JobSlot::state)
    }

    /// Parent of a live job.
    #[must_use]
    pub fn parent_of(&self, id: JobId) -> Option<JobId> {
        self.inner.core.borrow().jobs.get(&id).and_then(|s| s.parent)
    }

    /// Live children of a job, in creation order.
    #[must_use]
    pub fn children_of(&self, id: JobId) -> Vec<JobId> {
        self.inner
            .core
            .borrow()
            .jobs
            .get(&id)
            .map(|s| s.children.clone())
            .unwrap_or_default()
    }

    /// Number of pending timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.len()
    }

    pub(crate) fn core_mut(&self) -> RefMut<'_, Core> {
        self.inner.core.borrow_mut()
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn record_of(&self, id: JobId) -> Option<Rc<JobRecord>> {
        self.inner
            .core
            .borrow()
            .jobs
            .get(&id)
            .map(|s| Rc::clone(&s.record))
    }

    /// Name of the job on top of the run stack, or `"runtime"`.
    pub(crate) fn caller_name(&self) -> String {
        let core = self.inner.core.borrow();
        core.run_stack
            .last()
            .and_then(|id| core.jobs.get(id))
            .map_or_else(|| "runtime".to_string(), |s| s.record.name.clone())
    }

    pub(crate) fn emit(&self, event_type: &str, record: &JobRecord, extra: Option<serde_json::Value>) {
        let mut payload = serde_json::json!({
            "job": record.name,
            "id": record.id.as_u64(),
            "instance": record.instance.to_string(),
            "at": iso_timestamp(),
        });
        if let (Some(serde_json::Value::Object(extra)), Some(obj)) = (extra, payload.as_object_mut()) {
            obj.extend(extra);
        }
        self.inner.sink.try_emit(event_type, Some(payload));
    }
}
