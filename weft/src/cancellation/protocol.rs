//! Cancellation, timeouts and hard cancel.

use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, warn};

use super::Cancellation;
use crate::core::{JobId, JobState};
use crate::runtime::slot::{CancelState, CleanupPhase, JobRecord, Task};
use crate::runtime::Runtime;
use crate::time::TimerHandle;

enum Plan {
    Skip,
    Tighten(Vec<JobId>, Duration),
    Start {
        record: Rc<JobRecord>,
        children: Vec<JobId>,
        body: Option<Task>,
        timeout: Option<TimerHandle>,
    },
}

impl Runtime {
    /// Deadline for cancellations that do not name one.
    pub(crate) fn default_deadline(&self) -> Option<Duration> {
        self.inner
            .config
            .cancel_grace()
            .map(|grace| self.now().saturating_add(grace))
    }

    /// Requests cancellation of a job on behalf of the current caller.
    pub(crate) fn request_cancel(&self, record: &Rc<JobRecord>, grace: Option<Duration>) -> Cancellation {
        record.observed.set(true);
        if record.state.get() != JobState::Done {
            let deadline = match grace {
                Some(grace) => Some(self.now().saturating_add(grace)),
                None => self.default_deadline(),
            };
            self.begin_cancel(record.id, self.caller_name(), deadline);
            self.flush();
        }
        Cancellation::new(self.clone(), Rc::clone(record))
    }

    /// Moves a job (and its subtree) into `Cancelling`.
    ///
    /// Idempotent: a job already cancelling only has its deadline tightened.
    /// Running nested finalizers are left alone; the deadline still bounds
    /// them through `force`.
    pub(crate) fn begin_cancel(&self, id: JobId, by: String, deadline: Option<Duration>) {
        let plan = {
            let mut core = self.core_mut();
            let children = core.cancellable_children(id);
            let Some(slot) = core.jobs.get_mut(&id) else {
                return;
            };
            if slot.cancel.is_some() {
                match deadline {
                    Some(d) if slot.deadline.map_or(true, |current| d < current) => Plan::Tighten(children, d),
                    _ => Plan::Skip,
                }
            } else {
                slot.record.state.set(JobState::Cancelling);
                slot.cancel = Some(CancelState {
                    by: by.clone(),
                    deadline_timer: None,
                });
                let body = if matches!(slot.task, Some(Task::Body(_))) {
                    slot.body_live = false;
                    slot.task.take()
                } else {
                    None
                };
                Plan::Start {
                    record: Rc::clone(&slot.record),
                    children,
                    body,
                    timeout: slot.timeout.take(),
                }
            }
        };

        match plan {
            Plan::Skip => {}
            Plan::Tighten(children, deadline) => {
                for child in children {
                    self.begin_cancel(child, by.clone(), Some(deadline));
                }
                self.arm_deadline(id, deadline);
            }
            Plan::Start {
                record,
                children,
                body,
                timeout,
            } => {
                if let Some(timer) = timeout {
                    timer.cancel();
                }
                drop(body);
                debug!(job = %record.name, id = %id, by = %by, "job cancelling");
                self.emit(
                    "job.cancelling",
                    &record,
                    Some(serde_json::json!({ "by": by, "deadline_ms": deadline.map(|d| d.as_secs_f64() * 1000.0) })),
                );
                for child in children {
                    self.begin_cancel(child, by.clone(), deadline);
                }
                if let Some(deadline) = deadline {
                    self.arm_deadline(id, deadline);
                }
                self.try_settle(id);
            }
        }
    }

    fn arm_deadline(&self, id: JobId, deadline: Duration) {
        let weak = self.downgrade();
        let timer = self.schedule_at(deadline, move || {
            if let Some(rt) = Runtime::upgrade(&weak) {
                rt.hard_cancel(id);
            }
        });
        let previous = {
            let mut core = self.core_mut();
            match core.jobs.get_mut(&id) {
                Some(slot) => {
                    slot.deadline = Some(deadline);
                    slot.cancel
                        .as_mut()
                        .and_then(|cancel| cancel.deadline_timer.replace(timer))
                }
                None => Some(timer),
            }
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    /// Deadline expiry: settles the job's whole live subtree now.
    pub(crate) fn hard_cancel(&self, id: JobId) {
        let Some(record) = self.record_of(id) else {
            return;
        };
        warn!(job = %record.name, id = %id, "cancellation deadline elapsed; forcing settlement");
        self.emit("job.hard_cancelled", &record, None);
        self.force(id, "runtime");
        self.flush();
    }

    /// Settles a job bottom-up without running anything further. Pending
    /// finalizers and in-flight cleanup are discarded.
    pub(crate) fn force(&self, id: JobId, by: &str) {
        let (children, task, finalizers) = {
            let mut core = self.core_mut();
            let Some(slot) = core.jobs.get_mut(&id) else {
                return;
            };
            if slot.cancel.is_none() {
                slot.cancel = Some(CancelState {
                    by: by.to_string(),
                    deadline_timer: None,
                });
            }
            slot.record.state.set(JobState::Cancelling);
            slot.body_live = false;
            slot.cleanup = CleanupPhase::Finished;
            (
                slot.children.clone(),
                slot.task.take(),
                std::mem::take(&mut slot.finalizers),
            )
        };
        drop(task);
        drop(finalizers);

        for child in children {
            self.force(child, by);
        }
        self.finalize(id);
    }

    /// Arms a timeout on a live job. Re-arming replaces the previous one.
    pub(crate) fn arm_timeout(&self, id: JobId, after: Duration) {
        let weak = self.downgrade();
        let timer = self.schedule_after(after, move || {
            if let Some(rt) = Runtime::upgrade(&weak) {
                rt.on_timeout(id);
            }
        });
        let previous = {
            let mut core = self.core_mut();
            match core.jobs.get_mut(&id) {
                Some(slot) if slot.cancel.is_none() => slot.timeout.replace(timer),
                _ => Some(timer),
            }
        };
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    fn on_timeout(&self, id: JobId) {
        let record = {
            let mut core = self.core_mut();
            let Some(slot) = core.jobs.get_mut(&id) else {
                return;
            };
            if slot.cancel.is_some() {
                return;
            }
            slot.timed_out = true;
            slot.timeout = None;
            Rc::clone(&slot.record)
        };
        debug!(job = %record.name, id = %id, "job timed out");
        self.emit("job.timed_out", &record, None);
        self.begin_cancel(id, record.name.clone(), self.default_deadline());
        self.flush();
    }
}
