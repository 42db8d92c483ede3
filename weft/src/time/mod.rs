//! Time primitives: the host timer facility and sleeping.
//!
//! The runtime owns one [`TimerWheel`] and one clock. Timer callbacks never
//! touch job state directly; they wake jobs or call back into the runtime,
//! which funnels the work through the trampoline.
//!
//! Time is measured as a [`Duration`](std::time::Duration) since the runtime
//! was created. Under [`ClockKind::Virtual`] it only moves when a driver
//! advances it, which makes timer-heavy tests deterministic.

mod clock;
mod sleep;
mod wheel;

pub use clock::ClockKind;
pub(crate) use clock::Clock;
pub use sleep::{Sleep, YieldNow};
pub use wheel::{TimerHandle, TimerWheel};
