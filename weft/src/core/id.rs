//! Arena handles for jobs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Arena index of a job inside one runtime.
///
/// Parent/child links are stored as `JobId`s, never as owning pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_display() {
        assert_eq!(JobId::new(7).to_string(), "job#7");
        assert_eq!(JobId::new(7).as_u64(), 7);
    }
}
