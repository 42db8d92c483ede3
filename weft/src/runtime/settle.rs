//! Settlement: the structured-concurrency rules that take a job to `Done`.
//!
//! A job settles only when its body is gone, its finalizers have finished
//! and it has no live children. Finalizers start as soon as the job is
//! cancelling, or once the body returned and the last child settled.

use futures::FutureExt;
use std::rc::Rc;
use tracing::{debug, warn};

use super::slot::{CleanupPhase, JobRecord, Task};
use super::Runtime;
use crate::cancellation::run_finalizers;
use crate::core::{JobId, JobState, Settlement};
use crate::errors::{Failure, RuntimeError};

enum Next {
    Wait,
    Cleanup(Vec<crate::cancellation::Finalizer>, Rc<JobRecord>),
    Finalize,
}

impl Runtime {
    pub(crate) fn on_body_done(&self, id: JobId, settlement: Settlement) {
        let failed = {
            let mut core = self.core_mut();
            let Some(slot) = core.jobs.get_mut(&id) else {
                return;
            };
            slot.body_live = false;
            let failed = settlement.is_failure();
            match (&slot.pending, settlement) {
                (Some(Settlement::Failed(_)), Settlement::Failed(failure)) => slot.nested.push(failure),
                (Some(Settlement::Failed(_)), _) => {}
                (_, settlement) => slot.pending = Some(settlement),
            }
            if !failed && slot.state() != JobState::Cancelling {
                slot.record.state.set(JobState::WaitingChildren);
            }
            failed.then(|| slot.record.name.clone())
        };

        if let Some(name) = failed {
            debug!(job = %name, id = %id, "job body failed; cancelling its children");
            self.begin_cancel(id, name, self.default_deadline());
        }
        self.try_settle(id);
    }

    /// Advances a job toward `Done` as far as its current state allows.
    pub(crate) fn try_settle(&self, id: JobId) {
        let next = {
            let mut core = self.core_mut();
            let Some(slot) = core.jobs.get_mut(&id) else {
                return;
            };
            if slot.body_live {
                Next::Wait
            } else {
                match slot.cleanup {
                    CleanupPhase::NotStarted if slot.cancel.is_some() || slot.children.is_empty() => {
                        slot.cleanup = CleanupPhase::Running;
                        Next::Cleanup(std::mem::take(&mut slot.finalizers), Rc::clone(&slot.record))
                    }
                    CleanupPhase::Finished if slot.children.is_empty() => Next::Finalize,
                    _ => Next::Wait,
                }
            }
        };

        match next {
            Next::Wait => {}
            Next::Cleanup(finalizers, record) if finalizers.is_empty() => {
                drop(record);
                if let Some(slot) = self.core_mut().jobs.get_mut(&id) {
                    slot.cleanup = CleanupPhase::Finished;
                }
                self.try_settle(id);
            }
            Next::Cleanup(finalizers, record) => {
                debug!(job = %record.name, id = %id, count = finalizers.len(), "running finalizers");
                let cleanup = run_finalizers(self.clone(), record, finalizers);
                if let Some(slot) = self.core_mut().jobs.get_mut(&id) {
                    slot.task = Some(Task::Cleanup(cleanup.boxed_local()));
                }
                self.inner.ready.push(id);
            }
            Next::Finalize => self.finalize(id),
        }
    }

    /// Removes the job from the arena, detaches it from its parent and
    /// publishes its settlement.
    pub(crate) fn finalize(&self, id: JobId) {
        let (slot, settlement) = {
            let mut core = self.core_mut();
            let Some(mut slot) = core.jobs.remove(&id) else {
                return;
            };
            if let Some(parent) = slot.parent.and_then(|p| core.jobs.get_mut(&p)) {
                parent.children.retain(|c| *c != id);
            }
            let settlement = slot.take_settlement();
            (slot, settlement)
        };

        if let Some(timer) = &slot.timeout {
            timer.cancel();
        }
        if let Some(timer) = slot.cancel.as_ref().and_then(|c| c.deadline_timer.as_ref()) {
            timer.cancel();
        }
        let record = Rc::clone(&slot.record);
        let parent = slot.parent;
        drop(slot);

        debug!(job = %record.name, id = %id, outcome = settlement.kind(), "job settled");
        let mut extra = serde_json::json!({
            "outcome": settlement.kind(),
            "parent": parent.map(JobId::as_u64),
        });
        let failure = settlement.as_failure();
        if let (Some(failure), Some(obj)) = (&failure, extra.as_object_mut()) {
            obj.insert("error".to_string(), serde_json::json!(failure.to_dict()));
        }
        self.emit("job.settled", &record, Some(extra));
        record.settle(settlement);

        match (parent, failure) {
            (Some(parent), failure) => self.child_settled(parent, record, failure),
            (None, Some(failure)) => {
                if !record.observed.get() && self.inner.config.warn_unobserved_failures {
                    warn!(
                        job = %record.name,
                        origin = %failure.root().job,
                        error = %failure,
                        "root job failed and nobody observed it"
                    );
                }
            }
            (None, None) => {}
        }
    }

    fn child_settled(&self, parent: JobId, child: Rc<JobRecord>, failure: Option<Failure>) {
        if let Some(failure) = failure {
            let escalate_now = {
                let mut core = self.core_mut();
                let on_stack = core.run_stack.contains(&parent);
                match core.jobs.get_mut(&parent) {
                    Some(slot) if on_stack => {
                        slot.deferred.push((child, failure));
                        None
                    }
                    Some(_) if !child.observed.get() => Some(failure),
                    _ => None,
                }
            };
            if let Some(failure) = escalate_now {
                self.escalate(parent, failure);
            }
        }
        self.try_settle(parent);
    }

    /// Fails `parent` with a child's failure and cancels its other children.
    /// While `parent` is already cancelling, the failure is only recorded.
    pub(crate) fn escalate(&self, parent: JobId, failure: Failure) {
        let name = {
            let mut core = self.core_mut();
            let Some(slot) = core.jobs.get_mut(&parent) else {
                return;
            };
            let name = slot.record.name.clone();
            debug!(job = %name, child = %failure.job, "child failure escalated");
            if slot.cancel.is_some() || matches!(slot.pending, Some(Settlement::Failed(_))) {
                slot.nested.push(failure);
                return;
            }
            slot.pending = Some(Settlement::Failed(Failure::child(name.clone(), failure)));
            name
        };
        self.begin_cancel(parent, name, self.default_deadline());
    }

    /// Moves a live job under `new_parent` (or makes it a root).
    ///
    /// Settled jobs are left alone. A job moved under a cancelling parent is
    /// cancelled too.
    pub fn reparent(&self, job: JobId, new_parent: Option<JobId>) -> Result<(), RuntimeError> {
        let (old_parent, cancel_by, record) = {
            let mut core = self.core_mut();
            let Some(slot) = core.jobs.get(&job) else {
                return Ok(());
            };
            let record = Rc::clone(&slot.record);
            let old_parent = slot.parent;
            if old_parent == new_parent {
                return Ok(());
            }

            let mut cancel_by = None;
            let mut inherited = None;
            if let Some(np) = new_parent {
                let mut cursor = Some(np);
                while let Some(current) = cursor {
                    if current == job {
                        let parent = core.jobs.get(&np).map_or_else(String::new, |s| s.record.name.clone());
                        return Err(RuntimeError::WouldCycle {
                            job: record.name.clone(),
                            parent,
                        });
                    }
                    cursor = core.jobs.get(&current).and_then(|s| s.parent);
                }
                let Some(parent_slot) = core.jobs.get_mut(&np) else {
                    return Err(RuntimeError::Settled(np));
                };
                parent_slot.children.push(job);
                inherited = parent_slot.deadline;
                if let Some(cancel) = &parent_slot.cancel {
                    cancel_by = Some(cancel.by.clone());
                }
            }
            if let Some(old) = old_parent.and_then(|p| core.jobs.get_mut(&p)) {
                old.children.retain(|c| *c != job);
            }
            if let Some(slot) = core.jobs.get_mut(&job) {
                slot.parent = new_parent;
                slot.deadline = match (slot.deadline, inherited) {
                    (Some(own), Some(theirs)) => Some(own.min(theirs)),
                    (own, theirs) => own.or(theirs),
                };
            }
            (old_parent, cancel_by, record)
        };

        debug!(job = %record.name, from = ?old_parent, to = ?new_parent, "job reparented");
        self.emit(
            "job.reparented",
            &record,
            Some(serde_json::json!({
                "from": old_parent.map(JobId::as_u64),
                "to": new_parent.map(JobId::as_u64),
            })),
        );

        if let Some(by) = cancel_by {
            let deadline = self.inner.core.borrow().jobs.get(&job).and_then(|s| s.deadline);
            self.begin_cancel(job, by, deadline);
        }
        if let Some(old) = old_parent {
            self.try_settle(old);
        }
        self.flush();
        Ok(())
    }
}
