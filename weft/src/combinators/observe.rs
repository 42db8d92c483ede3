use crate::channel::Channel;
use crate::core::Outcome;
use crate::errors::RuntimeError;
use crate::job::{Cx, Job};

/// Completions arrive as `(member index, outcome)` in settlement order.
pub(crate) type Completions<T> = Channel<(usize, Outcome<T>)>;

/// Adopts `jobs` under the current combinator job and spawns one watcher
/// child per member.
pub(crate) fn watch<T: 'static>(cx: &Cx, jobs: &[Job<T>]) -> Result<Completions<T>, RuntimeError> {
    let completions = cx.channel(jobs.len());
    for (index, job) in jobs.iter().enumerate() {
        cx.adopt(job)?;
        let settled = job.outcome();
        let tx = completions.clone();
        cx.spawn(format!("{}/{}", cx.name(), job.name()), move |_| async move {
            let outcome = settled.await;
            tx.put((index, outcome)).await?;
            Ok(())
        });
    }
    Ok(completions)
}

/// Cancels every member except `keep`.
pub(crate) fn cancel_others<T: 'static>(jobs: &[Job<T>], keep: usize) {
    for (index, job) in jobs.iter().enumerate() {
        if index != keep && !job.is_done() {
            drop(job.cancel());
        }
    }
}
