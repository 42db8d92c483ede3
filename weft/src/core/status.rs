//! Job lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle state of a job.
///
/// ```text
/// Running --suspend--> Parked --wake--> Running
/// Running --return, live children--> WaitingChildren --last child--> Done
/// Running|Parked|WaitingChildren --cancel / child failure--> Cancelling --> Done
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// The coroutine is being driven or is due to be.
    Running,
    /// Suspended until an external event resumes it.
    Parked,
    /// The coroutine returned; children or finalizers are still outstanding.
    WaitingChildren,
    /// Stopping: children are being cancelled and finalizers run.
    Cancelling,
    /// Settled. The outcome is immutable.
    Done,
}

impl Default for JobState {
    fn default() -> Self {
        Self::Running
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Parked => write!(f, "parked"),
            Self::WaitingChildren => write!(f, "waiting_children"),
            Self::Cancelling => write!(f, "cancelling"),
            Self::Done => write!(f, "done"),
        }
    }
}

impl JobState {
    /// Returns true once the job has settled.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true if the coroutine body may still run.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Parked)
    }
}
