//! The trampoline: spawning, stepping and draining jobs.
//!
//! `step` polls one job's task once with that job pushed on the run stack.
//! Wakers never poll directly; they enqueue the job id, and the outermost
//! caller drains the queue in FIFO order. Nested `step`s only happen
//! through `spawn`, which runs the new job up to its first suspension
//! before returning to the spawner.

use futures::FutureExt;
use std::cell::RefCell;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::task::{Context, Poll};
use tracing::{debug, trace};

use super::slot::{BodyFuture, CleanupFuture, CleanupPhase, JobRecord, JobSlot, Task};
use super::Runtime;
use crate::core::{JobId, JobState, Settlement};
use crate::errors::{AggregateFailure, Cause, Failure};
use crate::job::{Cx, Job};

/// What one poll produced.
enum Polled {
    BodyPending(BodyFuture),
    BodyDone(Settlement),
    CleanupPending(CleanupFuture),
    CleanupDone(Vec<Failure>),
}

impl Runtime {
    /// Spawns a job and runs it to its first suspension point.
    ///
    /// If another job is being polled, the new job becomes its child.
    pub fn spawn<T, F, Fut>(&self, name: impl Into<String>, body: F) -> Job<T>
    where
        T: 'static,
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
    {
        let parent = self.current_job();
        self.spawn_under(parent, name.into(), body)
    }

    pub(crate) fn spawn_under<T, F, Fut>(&self, parent: Option<JobId>, name: String, body: F) -> Job<T>
    where
        T: 'static,
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
    {
        self.spawn_job(parent, name, false, body)
    }

    /// Spawns a nested finalizer of `owner`. Cancellation sweeps over the
    /// owner's children pass it by; only a deadline can abandon it.
    pub(crate) fn spawn_finalizer<F, Fut>(&self, owner: JobId, name: String, body: F) -> Job<()>
    where
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.spawn_job(Some(owner), name, true, body)
    }

    fn spawn_job<T, F, Fut>(&self, parent: Option<JobId>, name: String, finalizer: bool, body: F) -> Job<T>
    where
        T: 'static,
        F: FnOnce(Cx) -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
    {
        let record = self.register(parent, name, finalizer);
        let value = Rc::new(RefCell::new(None));

        let cx = Cx::new(self.clone(), Rc::clone(&record));
        let task: BodyFuture = match catch_unwind(AssertUnwindSafe(|| body(cx))) {
            Ok(fut) => {
                let cell = Rc::clone(&value);
                async move {
                    let out = fut.await?;
                    *cell.borrow_mut() = Some(out);
                    Ok::<(), anyhow::Error>(())
                }
                .boxed_local()
            }
            Err(payload) => {
                let cause = Cause::Panic(crate::errors::panic_message(payload.as_ref()));
                async move { Err::<(), anyhow::Error>(AggregateFailure::new(cause, Vec::new()).into()) }
                    .boxed_local()
            }
        };

        if let Some(slot) = self.core_mut().jobs.get_mut(&record.id) {
            slot.task = Some(Task::Body(task));
            slot.body_live = true;
        }

        self.step(record.id);
        self.flush();
        Job::new(self.clone(), record, value)
    }

    fn register(&self, parent: Option<JobId>, name: String, finalizer: bool) -> Rc<JobRecord> {
        let record = {
            let mut core = self.core_mut();
            let id = core.next_id();
            let record = Rc::new(JobRecord::new(id, name));
            let waker = self.inner.ready.waker_for(id);
            let mut slot = JobSlot::new(Rc::clone(&record), waker, None);
            slot.finalizer = finalizer;
            if let Some(parent_slot) = parent.and_then(|p| core.jobs.get_mut(&p)) {
                parent_slot.children.push(id);
                slot.parent = parent;
                slot.deadline = parent_slot.deadline;
            }
            core.jobs.insert(id, slot);
            record
        };

        debug!(job = %record.name, id = %record.id, parent = ?parent, "job spawned");
        self.emit(
            "job.spawned",
            &record,
            Some(serde_json::json!({ "parent": parent.map(JobId::as_u64) })),
        );
        record
    }

    /// Polls the job's current task once.
    pub(crate) fn step(&self, id: JobId) {
        let (task, waker, name) = {
            let mut core = self.core_mut();
            let Some(slot) = core.jobs.get_mut(&id) else {
                return;
            };
            let Some(task) = slot.task.take() else {
                return;
            };
            if matches!(task, Task::Body(_)) {
                slot.record.state.set(JobState::Running);
            }
            let found = (task, slot.waker.clone(), slot.record.name.clone());
            core.run_stack.push(id);
            found
        };

        trace!(job = %name, id = %id, "step");
        let depth = self.inner.depth.get();
        self.inner.depth.set(depth + 1);

        let mut cx = Context::from_waker(&waker);
        let polled = match task {
            Task::Body(mut fut) => match catch_unwind(AssertUnwindSafe(|| fut.as_mut().poll(&mut cx))) {
                Ok(Poll::Pending) => Polled::BodyPending(fut),
                Ok(Poll::Ready(Ok(()))) => Polled::BodyDone(Settlement::Success),
                Ok(Poll::Ready(Err(err))) => {
                    Polled::BodyDone(Settlement::Failed(Failure::from_error(name, err)))
                }
                Err(payload) => {
                    drop(fut);
                    Polled::BodyDone(Settlement::Failed(Failure::panic(name, payload)))
                }
            },
            Task::Cleanup(mut fut) => match catch_unwind(AssertUnwindSafe(|| fut.as_mut().poll(&mut cx))) {
                Ok(Poll::Pending) => Polled::CleanupPending(fut),
                Ok(Poll::Ready(failures)) => Polled::CleanupDone(failures),
                Err(payload) => {
                    drop(fut);
                    Polled::CleanupDone(vec![Failure::panic(name, payload)])
                }
            },
        };

        self.inner.depth.set(depth);
        self.core_mut().run_stack.pop();
        self.end_step(id, polled);
    }

    fn end_step(&self, id: JobId, polled: Polled) {
        self.flush_deferred(id);

        match polled {
            Polled::BodyPending(fut) => {
                let stale = {
                    let mut core = self.core_mut();
                    match core.jobs.get_mut(&id) {
                        Some(slot) if slot.body_live && slot.state() != JobState::Cancelling => {
                            slot.record.state.set(JobState::Parked);
                            slot.task = Some(Task::Body(fut));
                            None
                        }
                        Some(slot) => {
                            slot.body_live = false;
                            Some(fut)
                        }
                        None => Some(fut),
                    }
                };
                if let Some(fut) = stale {
                    drop(fut);
                    self.try_settle(id);
                }
            }
            Polled::BodyDone(settlement) => self.on_body_done(id, settlement),
            Polled::CleanupPending(fut) => {
                let stale = {
                    let mut core = self.core_mut();
                    match core.jobs.get_mut(&id) {
                        Some(slot) if slot.cleanup == CleanupPhase::Running => {
                            slot.task = Some(Task::Cleanup(fut));
                            None
                        }
                        _ => Some(fut),
                    }
                };
                drop(stale);
            }
            Polled::CleanupDone(failures) => {
                if let Some(slot) = self.core_mut().jobs.get_mut(&id) {
                    slot.nested.extend(failures);
                    slot.cleanup = CleanupPhase::Finished;
                }
                self.try_settle(id);
            }
        }
    }

    /// Escalates child failures that arrived while `id` was being polled
    /// and that nobody took a join or outcome on in the meantime.
    fn flush_deferred(&self, id: JobId) {
        let deferred = match self.core_mut().jobs.get_mut(&id) {
            Some(slot) => std::mem::take(&mut slot.deferred),
            None => return,
        };
        for (record, failure) in deferred {
            if !record.observed.get() {
                self.escalate(id, failure);
            }
        }
    }

    /// Drains the ready queue unless a drain is already in progress further
    /// up the native stack.
    pub(crate) fn flush(&self) {
        if self.inner.depth.get() > 0 || self.inner.draining.get() {
            return;
        }
        self.drain();
    }

    /// Resumes ready jobs in FIFO order, up to the drain budget.
    pub(crate) fn drain(&self) -> usize {
        self.inner.draining.set(true);
        let budget = self.inner.config.drain_budget.max(1);
        let mut steps = 0;
        while steps < budget {
            let Some(id) = self.inner.ready.pop() else {
                break;
            };
            self.step(id);
            steps += 1;
        }
        self.inner.draining.set(false);
        steps
    }
}
