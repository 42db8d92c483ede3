//! Runtime builder.

use std::sync::Arc;

use super::{Runtime, RuntimeConfig};
use crate::events::EventSink;

/// Builds a [`Runtime`] from a configuration and an optional event sink.
#[derive(Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    sink: Option<Arc<dyn EventSink>>,
}

impl RuntimeBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses a virtual clock.
    #[must_use]
    pub fn virtual_clock(mut self) -> Self {
        self.config.clock = crate::time::ClockKind::Virtual;
        self
    }

    /// Installs an event sink, overriding `config.events`.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Builds the runtime.
    #[must_use]
    pub fn build(self) -> Runtime {
        let sink = self.sink.unwrap_or_else(|| self.config.events.build());
        Runtime::from_parts(self.config, sink)
    }
}

impl std::fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("config", &self.config)
            .field("custom_sink", &self.sink.is_some())
            .finish()
    }
}
