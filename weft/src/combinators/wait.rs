use crate::errors::{AggregateFailure, Cause};
use crate::job::Job;
use crate::runtime::Runtime;

use super::observe::watch;

/// Waits for every job.
///
/// Succeeds with the values in input order. If any member did not succeed,
/// fails once all have settled: the first failure observed is the cause and
/// the rest are nested. An empty input succeeds immediately.
pub fn wait_all<T: 'static>(rt: &Runtime, jobs: Vec<Job<T>>) -> Job<Vec<T>> {
    rt.spawn("wait_all", move |cx| async move {
        let completions = watch(&cx, &jobs)?;
        let mut values: Vec<Option<T>> = jobs.iter().map(|_| None).collect();
        let mut failures = Vec::new();

        for _ in 0..jobs.len() {
            let (index, outcome) = completions.rec().await?;
            match outcome.into_result(jobs[index].name()) {
                Ok(value) => values[index] = Some(value),
                Err(failure) => failures.push(failure),
            }
        }

        if failures.is_empty() {
            return Ok(values.into_iter().flatten().collect());
        }
        let first = failures.remove(0);
        Err(AggregateFailure::new(Cause::Child(Box::new(first)), failures).into())
    })
}

/// Waits for every job, failing on the first failure.
///
/// The remaining members are cancelled as the combinator fails.
pub fn wait_all_or_fail<T: 'static>(rt: &Runtime, jobs: Vec<Job<T>>) -> Job<Vec<T>> {
    rt.spawn("wait_all_or_fail", move |cx| async move {
        let completions = watch(&cx, &jobs)?;
        let mut values: Vec<Option<T>> = jobs.iter().map(|_| None).collect();

        for _ in 0..jobs.len() {
            let (index, outcome) = completions.rec().await?;
            match outcome.into_result(jobs[index].name()) {
                Ok(value) => values[index] = Some(value),
                Err(failure) => return Err(failure.into()),
            }
        }

        Ok(values.into_iter().flatten().collect())
    })
}
