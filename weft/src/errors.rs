//! Error types for the weft runtime.
//!
//! Job failures form a causal chain: a [`Failure`] is always attributed to
//! the job that settled with it, and when it crosses a `join()` boundary it is
//! re-wrapped with the awaiting job's name so the innermost origin survives as
//! the root of the chain.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::core::JobId;

/// The main error type for runtime-level operations.
#[derive(Debug, Error)]
pub enum WeftError {
    /// A job settled with a failure.
    #[error("{0}")]
    Failure(#[from] Failure),

    /// A channel operation failed.
    #[error("{0}")]
    Channel(#[from] ChannelError),

    /// The runtime refused an operation.
    #[error("{0}")]
    Runtime(#[from] RuntimeError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (host event loop construction).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A job failure, attributed to the job that settled with it.
#[derive(Debug, Clone, Error)]
#[error("job '{job}' failed: {cause}")]
pub struct Failure {
    /// Name of the job this failure is attributed to.
    pub job: String,
    /// What went wrong.
    #[source]
    pub cause: Cause,
    /// Failures observed after the first one (sibling failures during the
    /// cancellation sweep, finalizer failures).
    pub nested: Vec<Failure>,
}

/// The cause of a [`Failure`].
#[derive(Debug, Clone, Error)]
pub enum Cause {
    /// The coroutine returned an error.
    #[error("{0}")]
    Error(Arc<anyhow::Error>),

    /// The coroutine or a finalizer panicked.
    #[error("panicked: {0}")]
    Panic(String),

    /// A child (or awaited) job failed.
    #[error("{0}")]
    Child(Box<Failure>),

    /// The value of a cancelled job was awaited.
    #[error("cancelled by '{by}'")]
    Cancelled {
        /// Name of the cancelling job.
        by: String,
    },

    /// The job exceeded its timeout.
    #[error("timed out")]
    TimedOut,

    /// The body succeeded but finalizers failed.
    #[error("{count} finalizer(s) failed")]
    Finalizers {
        /// Number of failed finalizers.
        count: usize,
    },

    /// Every raced job failed.
    #[error("all {count} jobs failed")]
    AllFailed {
        /// Number of raced jobs.
        count: usize,
    },
}

impl Failure {
    /// Creates a failure with no nested errors.
    #[must_use]
    pub fn new(job: impl Into<String>, cause: Cause) -> Self {
        Self {
            job: job.into(),
            cause,
            nested: Vec::new(),
        }
    }

    /// Wraps `inner` as the cause of a failure attributed to `job`.
    #[must_use]
    pub fn child(job: impl Into<String>, inner: Failure) -> Self {
        Self::new(job, Cause::Child(Box::new(inner)))
    }

    /// Creates a failure from a caught panic payload.
    #[must_use]
    pub fn panic(job: impl Into<String>, payload: Box<dyn Any + Send>) -> Self {
        Self::new(job, Cause::Panic(panic_message(payload.as_ref())))
    }

    /// Normalizes an error returned by a coroutine into a failure of `job`.
    ///
    /// A [`Failure`] coming out of an awaited job is wrapped as a child
    /// failure; an [`AggregateFailure`] settles the job with exactly its
    /// cause and nested list; anything else becomes [`Cause::Error`].
    #[must_use]
    pub fn from_error(job: impl Into<String>, err: anyhow::Error) -> Self {
        let err = match err.downcast::<AggregateFailure>() {
            Ok(aggregate) => {
                return Self {
                    job: job.into(),
                    cause: aggregate.cause,
                    nested: aggregate.nested,
                }
            }
            Err(err) => err,
        };
        match err.downcast::<Failure>() {
            Ok(inner) => Self::child(job, inner),
            Err(err) => Self::new(job, Cause::Error(Arc::new(err))),
        }
    }

    /// Appends nested failures.
    #[must_use]
    pub fn with_nested(mut self, nested: impl IntoIterator<Item = Failure>) -> Self {
        self.nested.extend(nested);
        self
    }

    /// Walks the causal chain down to the innermost origin.
    #[must_use]
    pub fn root(&self) -> &Failure {
        let mut current = self;
        while let Cause::Child(inner) = &current.cause {
            current = inner;
        }
        current
    }

    /// Job names along the causal chain, outermost first.
    #[must_use]
    pub fn chain(&self) -> Vec<&str> {
        let mut names = vec![self.job.as_str()];
        let mut current = self;
        while let Cause::Child(inner) = &current.cause {
            names.push(inner.job.as_str());
            current = inner;
        }
        names
    }

    /// Returns true if the failure originated in a panic.
    #[must_use]
    pub fn is_panic(&self) -> bool {
        matches!(self.root().cause, Cause::Panic(_))
    }

    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("job".to_string(), serde_json::json!(self.job));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert("origin".to_string(), serde_json::json!(self.root().job));
        if !self.nested.is_empty() {
            map.insert(
                "nested".to_string(),
                serde_json::Value::Array(
                    self.nested
                        .iter()
                        .map(|f| serde_json::json!(f.to_string()))
                        .collect(),
                ),
            );
        }
        map
    }
}

/// Returned from a coroutine to settle its job with exactly this cause and
/// nested list, instead of the default child/error wrapping.
#[derive(Debug, Clone, Error)]
#[error("{cause}")]
pub struct AggregateFailure {
    /// The cause to settle with.
    pub cause: Cause,
    /// Nested failures to attach.
    pub nested: Vec<Failure>,
}

impl AggregateFailure {
    /// Creates an aggregate failure.
    #[must_use]
    pub fn new(cause: Cause, nested: Vec<Failure>) -> Self {
        Self { cause, nested }
    }
}

/// Errors returned by blocking channel operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The channel was closed.
    #[error("channel closed")]
    Closed,
}

/// Error returned by [`Channel::try_put`](crate::channel::Channel::try_put).
///
/// The rejected message is handed back.
pub enum TrySendError<T> {
    /// No receiver is waiting and the buffer is full.
    Full(T),
    /// The channel was closed.
    Closed(T),
}

impl<T> TrySendError<T> {
    /// Recovers the rejected message.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(msg) | Self::Closed(msg) => msg,
        }
    }
}

impl<T> fmt::Debug for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("channel full"),
            Self::Closed(_) => f.write_str("channel closed"),
        }
    }
}

impl<T> std::error::Error for TrySendError<T> {}

/// Error returned by [`Channel::try_rec`](crate::channel::Channel::try_rec).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryRecvError {
    /// Nothing buffered and no sender waiting.
    #[error("channel empty")]
    Empty,
    /// The channel was closed and drained.
    #[error("channel closed")]
    Closed,
}

/// Errors raised by the runtime itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Reparenting would make a job its own ancestor.
    #[error("reparenting '{job}' under '{parent}' would create a cycle")]
    WouldCycle {
        /// The job being moved.
        job: String,
        /// The requested new parent.
        parent: String,
    },

    /// The job has already settled.
    #[error("job {0} has already settled")]
    Settled(JobId),

    /// The job is past the point of accepting finalizers.
    #[error("job '{job}' no longer accepts finalizers")]
    NotAccepting {
        /// The job name.
        job: String,
    },

    /// No job is currently running.
    #[error("no job is currently running")]
    NoCurrentJob,

    /// The awaited job can never settle: no ready work and no timers.
    #[error("job '{job}' stalled: no ready work and no pending timers")]
    Stalled {
        /// The job name.
        job: String,
    },

    /// A driver was invoked from inside a running job.
    #[error("runtime driver invoked from inside a running job")]
    Reentrant,

    /// Virtual-time operation on a wall-clock runtime.
    #[error("cannot advance a wall-clock runtime")]
    WallClock,
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_from_plain_error() {
        let failure = Failure::from_error("worker", anyhow::anyhow!("boom"));

        assert_eq!(failure.job, "worker");
        assert!(matches!(failure.cause, Cause::Error(_)));
        assert_eq!(failure.to_string(), "job 'worker' failed: boom");
    }

    #[test]
    fn test_failure_from_child_failure_wraps() {
        let inner = Failure::from_error("child", anyhow::anyhow!("disk full"));
        let outer = Failure::from_error("parent", anyhow::Error::new(inner));

        assert_eq!(outer.chain(), vec!["parent", "child"]);
        assert_eq!(outer.root().job, "child");
        assert!(outer.to_string().contains("disk full"));
    }

    #[test]
    fn test_failure_from_aggregate_keeps_cause() {
        let a = Failure::new("a", Cause::TimedOut);
        let b = Failure::new("b", Cause::TimedOut);
        let aggregate = AggregateFailure::new(Cause::AllFailed { count: 2 }, vec![a, b]);

        let failure = Failure::from_error("race", anyhow::Error::new(aggregate));

        assert_eq!(failure.job, "race");
        assert!(matches!(failure.cause, Cause::AllFailed { count: 2 }));
        assert_eq!(failure.nested.len(), 2);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("kaboom");
        let failure = Failure::panic("p", payload);
        assert!(failure.is_panic());
        assert_eq!(failure.to_string(), "job 'p' failed: panicked: kaboom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }

    #[test]
    fn test_failure_to_dict() {
        let inner = Failure::new("leaf", Cause::TimedOut);
        let failure = Failure::child("top", inner)
            .with_nested(vec![Failure::new("sibling", Cause::Panic("x".into()))]);

        let dict = failure.to_dict();
        assert_eq!(dict.get("job").unwrap(), "top");
        assert_eq!(dict.get("origin").unwrap(), "leaf");
        assert!(dict.contains_key("nested"));
    }

    #[test]
    fn test_try_send_error_returns_message() {
        let err = TrySendError::Full(7);
        assert_eq!(err.to_string(), "channel full");
        assert_eq!(err.into_inner(), 7);
    }
}
