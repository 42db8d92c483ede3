//! Lifecycle event emission.
//!
//! The runtime reports job transitions through an [`EventSink`]. Event names:
//!
//! | event               | emitted when                                     |
//! |---------------------|--------------------------------------------------|
//! | `job.spawned`       | a job is created                                 |
//! | `job.cancelling`    | a job enters `Cancelling`                        |
//! | `job.timed_out`     | a job's timeout fires                            |
//! | `job.hard_cancelled`| a cancellation deadline forces a job to settle   |
//! | `job.reparented`    | a job is moved under a new parent                |
//! | `job.settled`       | a job reaches `Done`                             |

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Event sink selection for [`RuntimeConfig`](crate::runtime::RuntimeConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSinkKind {
    /// Discard events.
    #[default]
    None,
    /// Log events through `tracing` at debug level.
    Logging,
}

impl EventSinkKind {
    /// Builds the selected sink.
    #[must_use]
    pub fn build(self) -> Arc<dyn EventSink> {
        match self {
            Self::None => Arc::new(NoOpEventSink),
            Self::Logging => Arc::new(LoggingEventSink::debug()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_kind_serde() {
        let kind: EventSinkKind = serde_json::from_str("\"logging\"").unwrap();
        assert_eq!(kind, EventSinkKind::Logging);
        assert_eq!(serde_json::to_string(&EventSinkKind::None).unwrap(), "\"none\"");
    }

    #[test]
    fn test_build_does_not_panic() {
        EventSinkKind::None.build().try_emit("job.spawned", None);
        EventSinkKind::Logging
            .build()
            .try_emit("job.spawned", Some(serde_json::json!({"job": "a"})));
    }
}
