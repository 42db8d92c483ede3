//! Per-job bookkeeping held in the runtime arena.

use futures::future::LocalBoxFuture;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::task::Waker;
use std::time::Duration;
use uuid::Uuid;

use crate::cancellation::Finalizer;
use crate::core::{JobId, JobState, Settlement};
use crate::errors::{Cause, Failure};
use crate::time::TimerHandle;
use crate::utils::generate_uuid_v7;

pub(crate) type BodyFuture = LocalBoxFuture<'static, anyhow::Result<()>>;
pub(crate) type CleanupFuture = LocalBoxFuture<'static, Vec<Failure>>;

/// The future currently owned by a job: its body, or its finalizer chain.
pub(crate) enum Task {
    Body(BodyFuture),
    Cleanup(CleanupFuture),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CleanupPhase {
    NotStarted,
    Running,
    Finished,
}

pub(crate) struct CancelState {
    pub(crate) by: String,
    pub(crate) deadline_timer: Option<TimerHandle>,
}

/// The part of a job that outlives its arena slot: identity, state and
/// the settled outcome. Shared with every handle.
#[derive(Debug)]
pub(crate) struct JobRecord {
    pub(crate) id: JobId,
    pub(crate) name: String,
    pub(crate) instance: Uuid,
    pub(crate) state: Cell<JobState>,
    pub(crate) settlement: RefCell<Option<Settlement>>,
    pub(crate) waiters: RefCell<Vec<Waker>>,
    /// Set once some job has taken a `join()`/`outcome()` on this one; an
    /// observed failure is the awaiter's to handle and does not cascade.
    pub(crate) observed: Cell<bool>,
    /// Channel operations this job is parked on. At most one.
    pub(crate) channel_waits: Cell<usize>,
}

impl JobRecord {
    pub(crate) fn new(id: JobId, name: String) -> Self {
        Self {
            id,
            name,
            instance: generate_uuid_v7(),
            state: Cell::new(JobState::Running),
            settlement: RefCell::new(None),
            waiters: RefCell::new(Vec::new()),
            observed: Cell::new(false),
            channel_waits: Cell::new(0),
        }
    }

    pub(crate) fn settlement(&self) -> Option<Settlement> {
        self.settlement.borrow().clone()
    }

    pub(crate) fn register_waiter(&self, waker: &Waker) {
        let mut waiters = self.waiters.borrow_mut();
        if !waiters.iter().any(|w| w.will_wake(waker)) {
            waiters.push(waker.clone());
        }
    }

    /// Marks the job done and wakes everyone waiting on it.
    pub(crate) fn settle(&self, settlement: Settlement) {
        self.state.set(JobState::Done);
        *self.settlement.borrow_mut() = Some(settlement);
        let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
        for waker in waiters {
            waker.wake();
        }
    }
}

pub(crate) struct JobSlot {
    pub(crate) record: Rc<JobRecord>,
    pub(crate) waker: Waker,
    pub(crate) parent: Option<JobId>,
    pub(crate) children: Vec<JobId>,
    /// Set on nested finalizer jobs.
    pub(crate) finalizer: bool,
    pub(crate) finalizers: Vec<Finalizer>,
    /// `None` while the task is being polled, or once there is none left.
    pub(crate) task: Option<Task>,
    pub(crate) body_live: bool,
    pub(crate) cleanup: CleanupPhase,
    /// The body's result, or the escalated failure of a child.
    pub(crate) pending: Option<Settlement>,
    pub(crate) nested: Vec<Failure>,
    pub(crate) cancel: Option<CancelState>,
    pub(crate) deadline: Option<Duration>,
    pub(crate) timeout: Option<TimerHandle>,
    pub(crate) timed_out: bool,
    /// Child failures that arrived while this job was on the run stack.
    pub(crate) deferred: Vec<(Rc<JobRecord>, Failure)>,
}

impl JobSlot {
    pub(crate) fn new(record: Rc<JobRecord>, waker: Waker, parent: Option<JobId>) -> Self {
        Self {
            record,
            waker,
            parent,
            children: Vec::new(),
            finalizer: false,
            finalizers: Vec::new(),
            task: None,
            body_live: false,
            cleanup: CleanupPhase::NotStarted,
            pending: None,
            nested: Vec::new(),
            cancel: None,
            deadline: None,
            timeout: None,
            timed_out: false,
            deferred: Vec::new(),
        }
    }

    pub(crate) fn state(&self) -> JobState {
        self.record.state.get()
    }

    /// Computes the terminal settlement.
    ///
    /// A failure always wins. Otherwise a cancelled job settles with the
    /// cancellation marker (or the timeout marker), overwriting a plain
    /// success. Aggregated errors turn any non-failure into a failure.
    pub(crate) fn take_settlement(&mut self) -> Settlement {
        let name = self.record.name.clone();
        let base = match (self.pending.take(), &self.cancel) {
            (Some(Settlement::Failed(failure)), _) => Settlement::Failed(failure),
            (_, Some(_)) if self.timed_out => Settlement::TimedOut { job: name.clone() },
            (_, Some(cancel)) => Settlement::Cancelled {
                by: cancel.by.clone(),
            },
            (Some(other), None) => other,
            (None, None) => Settlement::Cancelled {
                by: "runtime".to_string(),
            },
        };

        if self.nested.is_empty() {
            return base;
        }
        let nested = std::mem::take(&mut self.nested);
        let failure = match base {
            Settlement::Failed(failure) => failure.with_nested(nested),
            Settlement::Success => Failure::new(
                name,
                Cause::Finalizers {
                    count: nested.len(),
                },
            )
            .with_nested(nested),
            Settlement::Cancelled { by } => {
                Failure::new(name, Cause::Cancelled { by }).with_nested(nested)
            }
            Settlement::TimedOut { .. } => Failure::new(name, Cause::TimedOut).with_nested(nested),
        };
        Settlement::Failed(failure)
    }
}
