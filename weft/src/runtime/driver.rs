//! Drivers: the host-loop side of the runtime.
//!
//! Nothing runs unless a driver (or a top-level `spawn`/`cancel`) pumps
//! the ready queue. On a virtual clock the drivers jump time straight to
//! the next timer; on a wall clock they sleep until it, waking early when a
//! foreign waker enqueues a job.

use std::time::Duration;
use tracing::{debug, trace};

use super::Runtime;
use crate::core::{JobId, Outcome};
use crate::errors::{RuntimeError, WeftError};
use crate::job::Job;

impl Runtime {
    fn ensure_outside_jobs(&self) -> Result<(), RuntimeError> {
        if self.inner.depth.get() > 0 || self.inner.draining.get() {
            return Err(RuntimeError::Reentrant);
        }
        Ok(())
    }

    /// Resumes ready jobs until none are left. Returns the number of steps.
    pub fn run_until_stalled(&self) -> Result<usize, RuntimeError> {
        self.ensure_outside_jobs()?;
        let mut total = 0;
        loop {
            total += self.drain();
            if self.inner.ready.is_empty() {
                return Ok(total);
            }
        }
    }

    /// Fires every timer due at the current clock reading, then drains.
    pub fn fire_due_timers(&self) -> Result<usize, RuntimeError> {
        self.ensure_outside_jobs()?;
        let fired = self.inner.timers.fire_due(self.now());
        self.run_until_stalled()?;
        Ok(fired)
    }

    /// Moves a virtual clock forward by `by`, firing timers in deadline
    /// order and draining after each one.
    pub fn advance(&self, by: Duration) -> Result<(), RuntimeError> {
        self.ensure_outside_jobs()?;
        if !self.inner.clock.is_virtual() {
            return Err(RuntimeError::WallClock);
        }
        let target = self.now().saturating_add(by);
        self.run_until_stalled()?;
        while let Some(next) = self.inner.timers.next_deadline() {
            if next > target {
                break;
            }
            self.jump_to(next)?;
        }
        self.inner.clock.advance_to(target);
        Ok(())
    }

    /// Runs a virtual-clock runtime until no ready work and no timers are
    /// left. Returns the final clock reading.
    pub fn run(&self) -> Result<Duration, RuntimeError> {
        self.ensure_outside_jobs()?;
        if !self.inner.clock.is_virtual() {
            return Err(RuntimeError::WallClock);
        }
        self.run_until_stalled()?;
        while let Some(next) = self.inner.timers.next_deadline() {
            self.jump_to(next)?;
        }
        Ok(self.now())
    }

    fn jump_to(&self, deadline: Duration) -> Result<(), RuntimeError> {
        self.inner.clock.advance_to(deadline);
        let fired = self.inner.timers.fire_due(self.now());
        trace!(now = ?self.now(), fired, "timers fired");
        self.run_until_stalled()?;
        Ok(())
    }

    /// Drives the runtime until `job` settles and returns its outcome.
    ///
    /// On a virtual clock this never sleeps, and fails with
    /// [`RuntimeError::Stalled`] when the job can no longer make progress.
    /// On a wall clock it runs a current-thread tokio runtime so jobs may
    /// await tokio futures.
    pub fn block_on<T: 'static>(&self, job: &Job<T>) -> Result<Outcome<T>, WeftError> {
        self.ensure_outside_jobs()?;
        job.record().observed.set(true);

        if self.inner.clock.is_virtual() {
            loop {
                self.run_until_stalled()?;
                if let Some(outcome) = job.take_outcome() {
                    return Ok(outcome);
                }
                match self.inner.timers.next_deadline() {
                    Some(next) => self.jump_to(next)?,
                    None => return Err(self.stalled(job.id(), job.name()).into()),
                }
            }
        }

        let host = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(host.block_on(self.drive(job))?)
    }

    /// Drives the runtime from inside an existing tokio runtime until `job`
    /// settles.
    pub async fn drive<T: 'static>(&self, job: &Job<T>) -> Result<Outcome<T>, RuntimeError> {
        job.record().observed.set(true);
        loop {
            self.run_until_stalled()?;
            if let Some(outcome) = job.take_outcome() {
                return Ok(outcome);
            }

            let now = self.now();
            match self.inner.timers.next_deadline() {
                Some(next) if next <= now => {}
                Some(next) if self.inner.clock.is_virtual() => self.inner.clock.advance_to(next),
                Some(next) => {
                    tokio::select! {
                        () = tokio::time::sleep(next - now) => {}
                        () = self.inner.ready.notify().notified() => {}
                    }
                }
                None if self.inner.clock.is_virtual() => {
                    return Err(self.stalled(job.id(), job.name()));
                }
                None => self.inner.ready.notify().notified().await,
            }
            self.inner.timers.fire_due(self.now());
        }
    }

    fn stalled(&self, id: JobId, name: &str) -> RuntimeError {
        debug!(job = %name, id = %id, "job stalled");
        RuntimeError::Stalled {
            job: name.to_string(),
        }
    }

    /// Forces every live job to settle and drops all pending timers.
    ///
    /// Jobs hold handles to the runtime, so a runtime with live jobs is
    /// only reclaimed after `shutdown`.
    pub fn shutdown(&self) {
        let roots: Vec<JobId> = self
            .inner
            .core
            .borrow()
            .jobs
            .iter()
            .filter(|(_, slot)| slot.parent.is_none())
            .map(|(id, _)| *id)
            .collect();
        debug!(roots = roots.len(), "runtime shutting down");
        for root in roots {
            self.force(root, "runtime");
        }
        self.inner.ready.clear();
        self.inner.timers.clear();
    }
}
