use crate::core::Outcome;
use crate::errors::{AggregateFailure, Cause};
use crate::job::Job;
use crate::runtime::Runtime;

use super::observe::{cancel_others, watch};

/// Resolves with the outcome of whichever job settles first, whatever it
/// is, and cancels the rest.
pub fn first<T: 'static>(rt: &Runtime, jobs: Vec<Job<T>>) -> Job<Outcome<T>> {
    rt.spawn("first", move |cx| async move {
        if jobs.is_empty() {
            anyhow::bail!("no jobs to race");
        }
        let completions = watch(&cx, &jobs)?;
        let (winner, outcome) = completions.rec().await?;
        cancel_others(&jobs, winner);
        Ok(outcome)
    })
}

/// Resolves with the first successful job's value and cancels the rest.
///
/// Failed or cancelled members are skipped. If none succeeds the combinator
/// fails with [`Cause::AllFailed`], every member failure nested.
pub fn first_success<T: 'static>(rt: &Runtime, jobs: Vec<Job<T>>) -> Job<T> {
    rt.spawn("first_success", move |cx| async move {
        if jobs.is_empty() {
            anyhow::bail!("no jobs to race");
        }
        let completions = watch(&cx, &jobs)?;
        let mut failures = Vec::new();

        for _ in 0..jobs.len() {
            let (index, outcome) = completions.rec().await?;
            match outcome.into_result(jobs[index].name()) {
                Ok(value) => {
                    cancel_others(&jobs, index);
                    return Ok(value);
                }
                Err(failure) => failures.push(failure),
            }
        }

        Err(AggregateFailure::new(Cause::AllFailed { count: jobs.len() }, failures).into())
    })
}
