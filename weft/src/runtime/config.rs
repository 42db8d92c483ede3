//! Runtime configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::WeftError;
use crate::events::EventSinkKind;
use crate::time::ClockKind;

/// Environment variable selecting the clock (`virtual` or `wall`).
pub const CLOCK_ENV: &str = "WEFT_CLOCK";
/// Environment variable holding the default cancellation grace in ms.
pub const CANCEL_GRACE_ENV: &str = "WEFT_CANCEL_GRACE_MS";

/// Configuration for a [`Runtime`](super::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Time source.
    #[serde(default)]
    pub clock: ClockKind,
    /// Deadline applied to `cancel()` calls that do not pass one. `None`
    /// means cooperative cancellation waits as long as it takes.
    #[serde(default)]
    pub cancel_grace_ms: Option<u64>,
    /// Maximum number of steps one trampoline drain runs before returning
    /// control to its caller.
    #[serde(default = "default_drain_budget")]
    pub drain_budget: usize,
    /// Built-in event sink to install when none is given to the builder.
    #[serde(default)]
    pub events: EventSinkKind,
    /// Log root jobs that settle with a failure nobody observed.
    #[serde(default = "default_true")]
    pub warn_unobserved_failures: bool,
}

fn default_drain_budget() -> usize {
    100_000
}

fn default_true() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            clock: ClockKind::default(),
            cancel_grace_ms: None,
            drain_budget: default_drain_budget(),
            events: EventSinkKind::default(),
            warn_unobserved_failures: true,
        }
    }
}

impl RuntimeConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with a virtual clock, for deterministic tests.
    #[must_use]
    pub fn lab() -> Self {
        Self::default().with_clock(ClockKind::Virtual)
    }

    /// Reads `WEFT_CLOCK` and `WEFT_CANCEL_GRACE_MS` over the defaults.
    pub fn from_env() -> Result<Self, WeftError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WeftError> {
        let mut config = Self::default();
        if let Some(clock) = lookup(CLOCK_ENV) {
            config.clock = clock.parse().map_err(WeftError::Config)?;
        }
        if let Some(grace) = lookup(CANCEL_GRACE_ENV) {
            let ms = grace.trim().parse::<u64>().map_err(|e| {
                WeftError::Config(format!("{CANCEL_GRACE_ENV}={grace:?}: {e}"))
            })?;
            config.cancel_grace_ms = Some(ms);
        }
        Ok(config)
    }

    /// Sets the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: ClockKind) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the default cancellation grace period.
    #[must_use]
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace_ms = Some(u64::try_from(grace.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the drain budget. Zero is treated as one.
    #[must_use]
    pub fn with_drain_budget(mut self, budget: usize) -> Self {
        self.drain_budget = budget.max(1);
        self
    }

    /// Selects the built-in event sink.
    #[must_use]
    pub fn with_events(mut self, events: EventSinkKind) -> Self {
        self.events = events;
        self
    }

    /// Enables or disables the unobserved root failure warning.
    #[must_use]
    pub fn with_warn_unobserved_failures(mut self, warn: bool) -> Self {
        self.warn_unobserved_failures = warn;
        self
    }

    /// The default cancellation grace period, if any.
    #[must_use]
    pub fn cancel_grace(&self) -> Option<Duration> {
        self.cancel_grace_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.clock, ClockKind::Wall);
        assert_eq!(config.cancel_grace(), None);
        assert!(config.warn_unobserved_failures);
    }

    #[test]
    fn test_builder_methods() {
        let config = RuntimeConfig::lab()
            .with_cancel_grace(Duration::from_millis(250))
            .with_drain_budget(0)
            .with_events(EventSinkKind::Logging);

        assert_eq!(config.clock, ClockKind::Virtual);
        assert_eq!(config.cancel_grace_ms, Some(250));
        assert_eq!(config.drain_budget, 1);
        assert_eq!(config.events, EventSinkKind::Logging);
    }

    #[test]
    fn test_deserialize_with_missing_fields() {
        let config: RuntimeConfig = serde_json::from_str(r#"{"clock": "virtual"}"#).unwrap();
        assert_eq!(config, RuntimeConfig::lab());
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> =
            HashMap::from([(CLOCK_ENV, "virtual"), (CANCEL_GRACE_ENV, "40")]);
        let config = RuntimeConfig::from_lookup(|k| env.get(k).map(|v| (*v).to_string())).unwrap();

        assert_eq!(config.clock, ClockKind::Virtual);
        assert_eq!(config.cancel_grace(), Some(Duration::from_millis(40)));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = RuntimeConfig::from_lookup(|k| (k == CANCEL_GRACE_ENV).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, WeftError::Config(_)));
    }
}
