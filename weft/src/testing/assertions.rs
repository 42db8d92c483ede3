//! Assertions over job outcomes.

use std::fmt::Debug;

use crate::core::Outcome;
use crate::errors::Failure;

/// Asserts a success and returns the value.
#[track_caller]
pub fn assert_succeeded<T: Debug>(outcome: Outcome<T>) -> T {
    match outcome {
        Outcome::Success(value) => value,
        other => panic!("Expected success, got {other:?}"),
    }
}

/// Asserts a failure and returns it.
#[track_caller]
pub fn assert_failed<T: Debug>(outcome: Outcome<T>) -> Failure {
    match outcome {
        Outcome::Failed(failure) => failure,
        other => panic!("Expected failure, got {other:?}"),
    }
}

/// Asserts a failure whose causal chain ends in the job named `origin`.
#[track_caller]
pub fn assert_failed_with_origin<T: Debug>(outcome: Outcome<T>, origin: &str) -> Failure {
    let failure = assert_failed(outcome);
    assert_eq!(
        failure.root().job,
        origin,
        "Expected failure originating in '{}', chain was {:?}",
        origin,
        failure.chain()
    );
    failure
}

/// Asserts a cancellation.
#[track_caller]
pub fn assert_cancelled<T: Debug>(outcome: &Outcome<T>) {
    assert!(outcome.is_cancelled(), "Expected cancellation, got {outcome:?}");
}

/// Asserts a cancellation issued by the job named `by`.
#[track_caller]
pub fn assert_cancelled_by<T: Debug>(outcome: &Outcome<T>, by: &str) {
    match outcome {
        Outcome::Cancelled { by: actual } => assert_eq!(actual, by, "Cancelled by the wrong job"),
        other => panic!("Expected cancellation by '{by}', got {other:?}"),
    }
}

/// Asserts a timeout.
#[track_caller]
pub fn assert_timed_out<T: Debug>(outcome: &Outcome<T>) {
    assert!(outcome.is_timed_out(), "Expected timeout, got {outcome:?}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Cause;

    #[test]
    fn test_assert_succeeded_returns_value() {
        assert_eq!(assert_succeeded(Outcome::Success(3)), 3);
    }

    #[test]
    #[should_panic(expected = "Expected success")]
    fn test_assert_succeeded_panics_on_cancel() {
        assert_succeeded::<u8>(Outcome::Cancelled { by: "x".into() });
    }

    #[test]
    fn test_assert_failed_with_origin() {
        let failure = Failure::child("parent", Failure::new("leaf", Cause::TimedOut));
        let out: Outcome<()> = Outcome::Failed(failure);
        let failure = assert_failed_with_origin(out, "leaf");
        assert_eq!(failure.job, "parent");
    }

    #[test]
    fn test_assert_cancelled_by() {
        let out: Outcome<()> = Outcome::Cancelled { by: "root".into() };
        assert_cancelled(&out);
        assert_cancelled_by(&out, "root");
    }
}
