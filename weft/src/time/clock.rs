//! Virtual and wall clocks.

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Which time source a runtime uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockKind {
    /// Time only advances when a driver jumps it to the next timer.
    Virtual,
    /// Real elapsed time.
    Wall,
}

impl Default for ClockKind {
    fn default() -> Self {
        Self::Wall
    }
}

impl fmt::Display for ClockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Virtual => write!(f, "virtual"),
            Self::Wall => write!(f, "wall"),
        }
    }
}

impl FromStr for ClockKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "virtual" => Ok(Self::Virtual),
            "wall" => Ok(Self::Wall),
            other => Err(format!("unknown clock kind '{other}'")),
        }
    }
}

/// The runtime's time source.
#[derive(Debug)]
pub(crate) enum Clock {
    Virtual(Cell<Duration>),
    Wall(Instant),
}

impl Clock {
    pub(crate) fn new(kind: ClockKind) -> Self {
        match kind {
            ClockKind::Virtual => Self::Virtual(Cell::new(Duration::ZERO)),
            ClockKind::Wall => Self::Wall(Instant::now()),
        }
    }

    pub(crate) fn now(&self) -> Duration {
        match self {
            Self::Virtual(now) => now.get(),
            Self::Wall(epoch) => epoch.elapsed(),
        }
    }

    pub(crate) fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual(_))
    }

    /// Moves virtual time forward. Never goes backwards; no-op on a wall clock.
    pub(crate) fn advance_to(&self, target: Duration) {
        if let Self::Virtual(now) = self {
            if target > now.get() {
                now.set(target);
            }
        }
    }
}
