//! Settled outcomes.

use crate::errors::{Cause, Failure};

/// The terminal outcome of a job.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The coroutine returned a value.
    Success(T),
    /// The job was cancelled. Not a failure.
    Cancelled {
        /// Name of the cancelling job, or `"runtime"`.
        by: String,
    },
    /// The job exceeded its timeout.
    TimedOut {
        /// Name of the job that timed out.
        job: String,
    },
    /// The job failed.
    Failed(Failure),
}

impl<T> Outcome<T> {
    /// Returns true for [`Outcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true for [`Outcome::Cancelled`].
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns true for [`Outcome::TimedOut`].
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Returns true for failures, timeouts included.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::TimedOut { .. })
    }

    /// Returns the success value, if any.
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Maps the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Cancelled { by } => Outcome::Cancelled { by },
            Self::TimedOut { job } => Outcome::TimedOut { job },
            Self::Failed(failure) => Outcome::Failed(failure),
        }
    }

    /// Converts to a `Result`, turning every non-success into a failure
    /// attributed to `job`.
    pub fn into_result(self, job: &str) -> Result<T, Failure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Cancelled { by } => Err(Failure::new(job, Cause::Cancelled { by })),
            Self::TimedOut { job } => Err(Failure::new(job, Cause::TimedOut)),
            Self::Failed(failure) => Err(failure),
        }
    }

    /// Short label used in logs and events.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Cancelled { .. } => "cancelled",
            Self::TimedOut { .. } => "timed_out",
            Self::Failed(_) => "failed",
        }
    }
}

/// Type-erased outcome stored in the job record.
///
/// The success value itself lives in the typed handle's cell.
#[derive(Debug, Clone)]
pub(crate) enum Settlement {
    Success,
    Cancelled { by: String },
    TimedOut { job: String },
    Failed(Failure),
}

impl Settlement {
    pub(crate) fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::TimedOut { .. })
    }

    /// The failure to escalate to a parent, if this settlement is one.
    pub(crate) fn as_failure(&self) -> Option<Failure> {
        match self {
            Self::Failed(failure) => Some(failure.clone()),
            Self::TimedOut { job } => Some(Failure::new(job.clone(), Cause::TimedOut)),
            Self::Success | Self::Cancelled { .. } => None,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Cancelled { .. } => "cancelled",
            Self::TimedOut { .. } => "timed_out",
            Self::Failed(_) => "failed",
        }
    }

    /// Rebuilds a typed outcome from the erased settlement and the value cell.
    pub(crate) fn into_outcome<T>(self, job: &str, value: Option<T>) -> Outcome<T> {
        match (self, value) {
            (Self::Success, Some(value)) => Outcome::Success(value),
            (Self::Success, None) => Outcome::Failed(Failure::new(
                job,
                Cause::Error(std::sync::Arc::new(anyhow::anyhow!(
                    "success value already taken by another awaiter"
                ))),
            )),
            (Self::Cancelled { by }, _) => Outcome::Cancelled { by },
            (Self::TimedOut { job }, _) => Outcome::TimedOut { job },
            (Self::Failed(failure), _) => Outcome::Failed(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_predicates() {
        let ok: Outcome<u32> = Outcome::Success(1);
        let cancelled: Outcome<u32> = Outcome::Cancelled { by: "root".into() };
        let timed_out: Outcome<u32> = Outcome::TimedOut { job: "slow".into() };

        assert!(ok.is_success());
        assert!(!cancelled.is_failure());
        assert!(timed_out.is_failure());
        assert_eq!(ok.kind(), "success");
        assert_eq!(cancelled.kind(), "cancelled");
    }

    #[test]
    fn test_into_result_cancelled_becomes_failure() {
        let cancelled: Outcome<u32> = Outcome::Cancelled { by: "root".into() };
        let err = cancelled.into_result("worker").unwrap_err();

        assert_eq!(err.job, "worker");
        assert!(matches!(err.cause, Cause::Cancelled { ref by } if by == "root"));
    }

    #[test]
    fn test_map_preserves_kind() {
        let ok: Outcome<u32> = Outcome::Success(21);
        assert_eq!(ok.map(|v| v * 2).success(), Some(42));

        let timed_out: Outcome<u32> = Outcome::TimedOut { job: "j".into() };
        assert!(timed_out.map(|v| v + 1).is_timed_out());
    }

    #[test]
    fn test_settlement_as_failure() {
        assert!(Settlement::Success.as_failure().is_none());
        assert!(Settlement::Cancelled { by: "x".into() }.as_failure().is_none());

        let failure = Settlement::TimedOut { job: "slow".into() }.as_failure().unwrap();
        assert_eq!(failure.job, "slow");
        assert!(matches!(failure.cause, Cause::TimedOut));
    }

    #[test]
    fn test_settlement_into_outcome() {
        let outcome = Settlement::Success.into_outcome("j", Some("v"));
        assert_eq!(outcome.success(), Some("v"));

        let outcome: Outcome<&str> = Settlement::Success.into_outcome("j", None);
        assert!(outcome.is_failure());
    }
}
