//! Fixtures for runtime tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::events::CollectingEventSink;
use crate::runtime::{Runtime, RuntimeConfig};

/// Builds a virtual-clock runtime wired to a collecting event sink.
#[must_use]
pub fn lab_runtime() -> (Runtime, Arc<CollectingEventSink>) {
    let sink = Arc::new(CollectingEventSink::new());
    let rt = Runtime::builder()
        .config(RuntimeConfig::lab())
        .event_sink(Arc::clone(&sink) as Arc<dyn crate::events::EventSink>)
        .build();
    (rt, sink)
}

/// Ordered log of side effects, shared between jobs.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    entries: Rc<RefCell<Vec<String>>>,
}

impl Recorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.borrow_mut().push(entry.into());
    }

    /// Returns every entry so far.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }

    /// True if `entry` was recorded.
    #[must_use]
    pub fn contains(&self, entry: &str) -> bool {
        self.entries.borrow().iter().any(|e| e == entry)
    }

    /// Number of times `entry` was recorded.
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.entries.borrow().iter().filter(|e| *e == entry).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_shares_entries() {
        let recorder = Recorder::new();
        let clone = recorder.clone();
        clone.record("a");
        recorder.record("b");
        clone.record("a");

        assert_eq!(recorder.entries(), vec!["a", "b", "a"]);
        assert_eq!(recorder.count("a"), 2);
        assert!(!recorder.contains("c"));
    }

    #[test]
    fn test_lab_runtime_is_virtual() {
        let (rt, sink) = lab_runtime();
        assert!(rt.advance(std::time::Duration::from_secs(1)).is_ok());
        assert_eq!(rt.now(), std::time::Duration::from_secs(1));
        assert!(sink.is_empty());
    }
}
