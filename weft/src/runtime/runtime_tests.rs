//! Scheduler, settlement and driver tests.

use pretty_assertions::assert_eq;
use std::time::Duration;

use crate::core::{JobState, Outcome};
use crate::errors::{Cause, RuntimeError, WeftError};
use crate::runtime::Runtime;
use crate::testing::{assert_failed_with_origin, assert_succeeded, lab_runtime, Recorder};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[test]
fn test_spawn_runs_to_first_suspension() {
    let rt = Runtime::lab();
    let log = Recorder::new();

    let job = rt.spawn("worker", {
        let log = log.clone();
        |cx| async move {
            log.record("before");
            cx.sleep(ms(10)).await;
            log.record("after");
            Ok(1)
        }
    });

    assert_eq!(log.entries(), vec!["before"]);
    assert_eq!(job.state(), JobState::Parked);

    rt.advance(ms(10)).unwrap();
    assert_eq!(log.entries(), vec!["before", "after"]);
    assert_eq!(job.result().unwrap().success(), Some(1));
}

#[test]
fn test_child_linked_to_spawning_job() {
    let rt = Runtime::lab();

    let parent = rt.spawn("parent", |cx| async move {
        cx.spawn("child", |cx| async move {
            cx.sleep(ms(5)).await;
            Ok(())
        });
        cx.sleep(ms(1)).await;
        Ok(())
    });

    let children = rt.children_of(parent.id());
    assert_eq!(children.len(), 1);
    assert_eq!(rt.parent_of(children[0]), Some(parent.id()));
    assert_eq!(rt.job_count(), 2);
}

#[test]
fn test_parent_waits_for_children() {
    let (rt, sink) = lab_runtime();

    let parent = rt.spawn("parent", |cx| async move {
        cx.spawn("child", |cx| async move {
            cx.sleep(ms(20)).await;
            Ok(())
        });
        Ok("parent done")
    });

    assert_eq!(parent.state(), JobState::WaitingChildren);
    assert!(!parent.is_done());

    let outcome = rt.block_on(&parent).unwrap();
    assert_eq!(assert_succeeded(outcome), "parent done");
    assert_eq!(rt.now(), ms(20));
    assert_eq!(sink.jobs_for("job.spawned"), vec!["parent", "child"]);
    assert_eq!(sink.jobs_for("job.settled"), vec!["child", "parent"]);
}

#[test]
fn test_children_settle_before_parent_in_deep_tree() {
    let (rt, sink) = lab_runtime();

    let root = rt.spawn("root", |cx| async move {
        for branch in 0..2u64 {
            cx.spawn(format!("branch{branch}"), move |cx| async move {
                cx.spawn(format!("leaf{branch}"), move |cx| async move {
                    cx.sleep(ms(10 * (branch + 1))).await;
                    Ok(())
                });
                Ok(())
            });
        }
        Ok(())
    });

    rt.block_on(&root).unwrap();
    let settled = sink.jobs_for("job.settled");
    let position = |name: &str| settled.iter().position(|n| n == name).unwrap();

    assert_eq!(settled.len(), 5);
    assert!(position("leaf0") < position("branch0"));
    assert!(position("leaf1") < position("branch1"));
    assert!(position("branch0") < position("root"));
    assert!(position("branch1") < position("root"));
}

#[test]
fn test_ready_jobs_resume_in_fifo_order() {
    let rt = Runtime::lab();
    let log = Recorder::new();

    let root = rt.spawn("root", {
        let log = log.clone();
        |cx| async move {
            for name in ["a", "b"] {
                let log = log.clone();
                cx.spawn(name, move |cx| async move {
                    for round in 0..2 {
                        log.record(format!("{name}{round}"));
                        cx.yield_now().await;
                    }
                    Ok(())
                });
            }
            Ok(())
        }
    });

    rt.run_until_stalled().unwrap();
    assert!(root.is_done());
    assert_eq!(log.entries(), vec!["a0", "b0", "a1", "b1"]);
}

#[test]
fn test_long_chain_of_ready_jobs_does_not_recurse() {
    let rt = Runtime::lab();
    let chan = rt.channel::<u32>(0);

    let consumer = rt.spawn("consumer", {
        let chan = chan.clone();
        |_| async move {
            let mut total = 0;
            for _ in 0..10_000 {
                total += chan.rec().await?;
            }
            Ok(total)
        }
    });
    let producer = rt.spawn("producer", move |_| async move {
        for _ in 0..10_000 {
            chan.put(1).await?;
        }
        Ok(())
    });

    rt.run_until_stalled().unwrap();
    assert!(producer.is_done());
    assert_eq!(consumer.result().unwrap().success(), Some(10_000));
}

#[test]
fn test_join_propagates_failure_with_caller_attribution() {
    let rt = Runtime::lab();

    let root = rt.spawn("root", |cx| async move {
        let child = cx.spawn("child", |cx| async move {
            cx.sleep(ms(5)).await;
            Err::<u8, _>(anyhow::anyhow!("disk full"))
        });
        let value = child.join().await?;
        Ok(value)
    });

    let failure = assert_failed_with_origin(rt.block_on(&root).unwrap(), "child");
    assert_eq!(failure.job, "root");
    assert_eq!(failure.chain(), vec!["root", "child"]);
    assert!(failure.to_string().contains("disk full"));
}

#[test]
fn test_outcome_does_not_fail_caller() {
    let rt = Runtime::lab();

    let root = rt.spawn("root", |cx| async move {
        let child = cx.spawn("child", |_| async { Err::<u8, _>(anyhow::anyhow!("bad")) });
        let outcome = child.outcome().await;
        Ok(outcome.kind())
    });

    assert_eq!(rt.block_on(&root).unwrap().success(), Some("failed"));
}

#[test]
fn test_unobserved_child_failure_fails_parent() {
    let rt = Runtime::lab();
    let log = Recorder::new();

    let root = rt.spawn("root", {
        let log = log.clone();
        |cx| async move {
            cx.spawn("bad", |_| async { Err::<(), _>(anyhow::anyhow!("sync failure")) });
            cx.sleep(ms(10)).await;
            log.record("root continued");
            Ok(())
        }
    });

    assert!(root.is_done());
    assert!(root.failed());
    assert!(log.entries().is_empty());
    let failure = root.failure().unwrap();
    assert_eq!(failure.chain(), vec!["root", "bad"]);
}

#[test]
fn test_panicking_job_settles_with_panic_cause() {
    let rt = Runtime::lab();

    let job = rt.spawn("p", |_| async {
        if always() {
            panic!("kaboom");
        }
        Ok(1)
    });

    let failure = job.failure().unwrap();
    assert!(failure.is_panic());
    assert!(matches!(failure.cause, Cause::Panic(ref msg) if msg == "kaboom"));
}

fn always() -> bool {
    true
}

#[test]
fn test_block_on_stalled_job() {
    let rt = Runtime::lab();
    let chan = rt.channel::<u8>(0);

    let job = rt.spawn("waiter", move |_| async move { Ok(chan.rec().await?) });

    let err = rt.block_on(&job).unwrap_err();
    assert!(matches!(
        err,
        WeftError::Runtime(RuntimeError::Stalled { ref job }) if job == "waiter"
    ));
}

#[test]
fn test_drivers_refuse_reentry() {
    let rt = Runtime::lab();

    let job = rt.spawn("inner", |cx| async move { Ok(cx.runtime().run_until_stalled()) });

    assert_eq!(job.result().unwrap().success(), Some(Err(RuntimeError::Reentrant)));
}

#[test]
fn test_advance_rejected_on_wall_clock() {
    let rt = Runtime::new();
    assert_eq!(rt.advance(ms(1)), Err(RuntimeError::WallClock));
}

#[test]
fn test_advance_fires_timers_in_order() {
    let rt = Runtime::lab();
    let log = Recorder::new();

    for (name, delay) in [("late", 30), ("early", 10), ("middle", 20)] {
        let log = log.clone();
        rt.schedule_after(ms(delay), move || log.record(name));
    }

    rt.advance(ms(25)).unwrap();
    assert_eq!(log.entries(), vec!["early", "middle"]);
    assert_eq!(rt.pending_timers(), 1);
    assert_eq!(rt.now(), ms(25));

    assert_eq!(rt.run().unwrap(), ms(30));
    assert_eq!(log.entries(), vec!["early", "middle", "late"]);
}

#[test]
fn test_fire_due_timers_only_fires_due() {
    let rt = Runtime::lab();
    let log = Recorder::new();

    for (name, delay) in [("now", 0), ("later", 5)] {
        let log = log.clone();
        rt.schedule_after(ms(delay), move || log.record(name));
    }

    assert_eq!(rt.fire_due_timers(), Ok(1));
    assert_eq!(log.entries(), vec!["now"]);
    assert_eq!(rt.pending_timers(), 1);
}

#[test]
fn test_schedule_after_handle_cancels() {
    let rt = Runtime::lab();
    let log = Recorder::new();

    let handle = rt.schedule_after(ms(5), {
        let log = log.clone();
        move || log.record("fired")
    });
    assert!(handle.is_pending());
    assert!(handle.cancel());

    rt.advance(ms(10)).unwrap();
    assert!(log.entries().is_empty());
}

#[test]
fn test_reparent_refuses_cycles() {
    let rt = Runtime::lab();

    let outer = rt.spawn("outer", |cx| async move {
        cx.spawn("inner", |cx| async move {
            cx.sleep(ms(10)).await;
            Ok(())
        });
        cx.sleep(ms(10)).await;
        Ok(())
    });
    let inner = rt.children_of(outer.id())[0];

    assert_eq!(
        rt.reparent(outer.id(), Some(inner)),
        Err(RuntimeError::WouldCycle {
            job: "outer".into(),
            parent: "inner".into(),
        })
    );
    assert!(matches!(
        rt.reparent(outer.id(), Some(outer.id())),
        Err(RuntimeError::WouldCycle { .. })
    ));

    rt.reparent(inner, None).unwrap();
    assert_eq!(rt.parent_of(inner), None);
    assert!(rt.children_of(outer.id()).is_empty());
}

#[test]
fn test_reparent_settled_job_is_noop() {
    let rt = Runtime::lab();
    let done = rt.spawn("done", |_| async { Ok(()) });
    let host = rt.spawn("host", |cx| async move {
        cx.sleep(ms(5)).await;
        Ok(())
    });

    assert!(rt.reparent(done.id(), Some(host.id())).is_ok());
    assert!(rt.children_of(host.id()).is_empty());
}

#[test]
fn test_events_carry_job_identity() {
    let (rt, sink) = lab_runtime();
    let job = rt.spawn("evented", |_| async { Ok(()) });

    let settled = sink.events_of_type("job.settled");
    assert_eq!(settled.len(), 1);
    let payload = settled[0].1.as_ref().unwrap();
    assert_eq!(payload["job"], "evented");
    assert_eq!(payload["id"], job.id().as_u64());
    assert_eq!(payload["instance"], job.instance().to_string());
    assert_eq!(payload["outcome"], "success");
    assert!(payload["at"].as_str().unwrap().contains('T'));
}

#[test]
fn test_shutdown_settles_everything() {
    let rt = Runtime::lab();
    let job = rt.spawn("forever", |cx| async move {
        cx.spawn("child", |cx| async move {
            cx.sleep(ms(1_000)).await;
            Ok(())
        });
        cx.sleep(ms(1_000)).await;
        Ok(())
    });

    rt.shutdown();
    assert_eq!(rt.job_count(), 0);
    assert_eq!(rt.pending_timers(), 0);
    assert!(matches!(job.take_outcome(), Some(Outcome::Cancelled { ref by }) if by == "runtime"));
}

#[test]
fn test_block_on_wall_clock() {
    let rt = Runtime::new();
    let job = rt.spawn("napper", |cx| async move {
        cx.sleep(ms(5)).await;
        Ok("rested")
    });

    assert_eq!(rt.block_on(&job).unwrap().success(), Some("rested"));
}

#[tokio::test]
async fn test_drive_awaits_tokio_futures() {
    let rt = Runtime::new();
    let job = rt.spawn("io", |_| async {
        tokio::time::sleep(ms(5)).await;
        Ok(7)
    });

    let outcome = rt.drive(&job).await.unwrap();
    assert_eq!(outcome.success(), Some(7));
}
