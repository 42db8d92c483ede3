//! Combinator tests.

use pretty_assertions::assert_eq;
use std::time::Duration;

use super::{first, first_success, wait_all, wait_all_or_fail};
use crate::core::Outcome;
use crate::errors::Cause;
use crate::job::Job;
use crate::runtime::Runtime;
use crate::testing::{assert_cancelled_by, assert_failed, assert_failed_with_origin, assert_succeeded};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn after(rt: &Runtime, name: &str, delay: u64, value: u32) -> Job<u32> {
    rt.spawn(name, move |cx| async move {
        cx.sleep(ms(delay)).await;
        Ok(value)
    })
}

fn failing_after(rt: &Runtime, name: &str, delay: u64) -> Job<u32> {
    let message = format!("{name} broke");
    rt.spawn(name, move |cx| async move {
        cx.sleep(ms(delay)).await;
        Err::<u32, _>(anyhow::anyhow!(message))
    })
}

#[test]
fn test_wait_all_keeps_input_order() {
    let rt = Runtime::lab();
    let jobs = vec![after(&rt, "a", 30, 1), after(&rt, "b", 10, 2), after(&rt, "c", 20, 3)];

    let all = wait_all(&rt, jobs);

    assert_eq!(assert_succeeded(rt.block_on(&all).unwrap()), vec![1, 2, 3]);
    assert_eq!(rt.now(), ms(30));
}

#[test]
fn test_wait_all_empty_succeeds_immediately() {
    let rt = Runtime::lab();
    let all = wait_all::<u32>(&rt, Vec::new());

    assert!(all.is_done());
    assert_eq!(all.result().unwrap().success(), Some(Vec::new()));
}

#[test]
fn test_wait_all_waits_for_everyone_before_failing() {
    let rt = Runtime::lab();
    let jobs = vec![
        failing_after(&rt, "a", 10),
        after(&rt, "b", 20, 2),
        failing_after(&rt, "c", 30),
    ];
    let b = jobs[1].clone();

    let all = wait_all(&rt, jobs);
    let failure = assert_failed_with_origin(rt.block_on(&all).unwrap(), "a");

    assert_eq!(rt.now(), ms(30));
    assert_eq!(failure.job, "wait_all");
    assert_eq!(failure.chain(), vec!["wait_all", "a"]);
    assert_eq!(failure.nested.len(), 1);
    assert_eq!(failure.nested[0].job, "c");
    assert!(b.is_done());
    assert!(!b.failed());
}

#[test]
fn test_wait_all_or_fail_cancels_the_rest() {
    let rt = Runtime::lab();
    let slow = after(&rt, "slow", 100, 1);
    let jobs = vec![slow.clone(), failing_after(&rt, "bad", 10)];

    let all = wait_all_or_fail(&rt, jobs);
    let failure = assert_failed_with_origin(rt.block_on(&all).unwrap(), "bad");

    assert_eq!(failure.chain(), vec!["wait_all_or_fail", "bad"]);
    assert_eq!(rt.now(), ms(10));
    assert_cancelled_by(&slow.result().unwrap(), "wait_all_or_fail");
    assert_eq!(rt.job_count(), 0);
}

#[test]
fn test_wait_all_or_fail_success() {
    let rt = Runtime::lab();
    let jobs = vec![after(&rt, "a", 5, 10), after(&rt, "b", 1, 20)];

    let all = wait_all_or_fail(&rt, jobs);
    assert_eq!(assert_succeeded(rt.block_on(&all).unwrap()), vec![10, 20]);
}

#[test]
fn test_first_returns_earliest_outcome() {
    let rt = Runtime::lab();
    let slow = after(&rt, "slow", 30, 1);
    let race = first(&rt, vec![slow.clone(), after(&rt, "fast", 10, 2)]);

    let winner = assert_succeeded(rt.block_on(&race).unwrap());
    assert_eq!(winner.success(), Some(2));
    assert_eq!(rt.now(), ms(10));
    assert_cancelled_by(&slow.result().unwrap(), "first");
}

#[test]
fn test_first_reports_failure_without_failing() {
    let rt = Runtime::lab();
    let race = first(&rt, vec![after(&rt, "slow", 30, 1), failing_after(&rt, "bad", 10)]);

    let winner = assert_succeeded(rt.block_on(&race).unwrap());
    let failure = assert_failed(winner);
    assert_eq!(failure.job, "bad");
}

#[test]
fn test_first_success_skips_failures() {
    let rt = Runtime::lab();
    let slow = after(&rt, "slow", 50, 3);
    let jobs = vec![failing_after(&rt, "fast", 10), after(&rt, "mid", 20, 2), slow.clone()];

    let race = first_success(&rt, jobs);

    assert_eq!(assert_succeeded(rt.block_on(&race).unwrap()), 2);
    assert_eq!(rt.now(), ms(20));
    assert_cancelled_by(&slow.result().unwrap(), "first_success");
}

#[test]
fn test_first_success_all_failed() {
    let rt = Runtime::lab();
    let jobs = vec![failing_after(&rt, "x", 10), failing_after(&rt, "y", 5)];

    let race = first_success(&rt, jobs);
    let failure = assert_failed(rt.block_on(&race).unwrap());

    assert!(matches!(failure.cause, Cause::AllFailed { count: 2 }));
    let origins: Vec<&str> = failure.nested.iter().map(|f| f.job.as_str()).collect();
    assert_eq!(origins, vec!["y", "x"]);
}

#[test]
fn test_racing_nothing_fails() {
    let rt = Runtime::lab();

    let race = first::<u32>(&rt, Vec::new());
    let failure = assert_failed(race.result().unwrap());
    assert!(failure.to_string().contains("no jobs to race"));

    let race = first_success::<u32>(&rt, Vec::new());
    assert!(race.failed());
}

#[test]
fn test_combinator_owns_its_members() {
    let rt = Runtime::lab();
    let a = after(&rt, "a", 100, 1);
    let b = after(&rt, "b", 100, 2);

    let all = wait_all(&rt, vec![a.clone(), b.clone()]);
    assert_eq!(rt.parent_of(a.id()), Some(all.id()));
    assert_eq!(rt.parent_of(b.id()), Some(all.id()));

    assert_cancelled_by(&all.cancel().outcome().unwrap(), "runtime");
    assert_cancelled_by(&a.result().unwrap(), "runtime");
    assert_cancelled_by(&b.result().unwrap(), "runtime");
    assert_eq!(rt.job_count(), 0);
}

#[test]
fn test_member_failure_reaches_caller_through_combinator() {
    let rt = Runtime::lab();

    let root = rt.spawn("root", |cx| async move {
        let jobs = vec![
            cx.spawn("ok", |cx| async move {
                cx.sleep(ms(50)).await;
                Ok(1)
            }),
            cx.spawn("bad", |cx| async move {
                cx.sleep(ms(10)).await;
                Err::<u32, _>(anyhow::anyhow!("bad row"))
            }),
        ];
        let values = wait_all_or_fail(cx.runtime(), jobs).join().await?;
        Ok(values)
    });

    let failure = assert_failed_with_origin(rt.block_on(&root).unwrap(), "bad");
    assert_eq!(failure.chain(), vec!["root", "wait_all_or_fail", "bad"]);
    assert_eq!(rt.now(), ms(10));
}

#[test]
fn test_first_success_value_matches_outcome() {
    let rt = Runtime::lab();
    let race = first_success(&rt, vec![after(&rt, "only", 1, 9)]);

    rt.run().unwrap();
    assert!(matches!(race.take_outcome(), Some(Outcome::Success(9))));
}
