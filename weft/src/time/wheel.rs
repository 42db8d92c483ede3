//! Deadline-ordered timer registry.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

type Callback = Box<dyn FnOnce()>;
type Key = (Duration, u64);

#[derive(Default)]
struct WheelState {
    entries: BTreeMap<Key, Callback>,
    next_seq: u64,
}

/// The host timer facility: schedule a callback at a deadline, cancellable.
///
/// Timers with equal deadlines fire in registration order.
#[derive(Clone, Default)]
pub struct TimerWheel {
    state: Rc<RefCell<WheelState>>,
}

/// Handle to a scheduled timer.
///
/// Dropping the handle does not cancel the timer.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    key: Key,
    wheel: Weak<RefCell<WheelState>>,
}

impl TimerHandle {
    /// Cancels the timer. Returns true if it had not fired yet.
    pub fn cancel(&self) -> bool {
        let Some(state) = self.wheel.upgrade() else {
            return false;
        };
        let removed = state.borrow_mut().entries.remove(&self.key);
        removed.is_some()
    }

    /// Returns the absolute deadline.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.key.0
    }

    /// Returns true while the timer is still scheduled.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.wheel
            .upgrade()
            .map_or(false, |state| state.borrow().entries.contains_key(&self.key))
    }
}

impl TimerWheel {
    /// Creates an empty wheel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `callback` to run once `deadline` is reached.
    pub fn schedule_at<F>(&self, deadline: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce() + 'static,
    {
        let mut state = self.state.borrow_mut();
        let key = (deadline, state.next_seq);
        state.next_seq += 1;
        state.entries.insert(key, Box::new(callback));
        TimerHandle {
            key,
            wheel: Rc::downgrade(&self.state),
        }
    }

    /// Returns the earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.state
            .borrow()
            .entries
            .first_key_value()
            .map(|(key, _)| key.0)
    }

    /// Fires every timer due at `now`, including timers scheduled by the
    /// callbacks themselves. Returns the number fired.
    pub fn fire_due(&self, now: Duration) -> usize {
        let mut fired = 0;
        loop {
            let due = {
                let mut state = self.state.borrow_mut();
                match state.entries.first_key_value() {
                    Some((key, _)) if key.0 <= now => state.entries.pop_first(),
                    _ => None,
                }
            };
            match due {
                Some((_, callback)) => {
                    callback();
                    fired += 1;
                }
                None => break,
            }
        }
        fired
    }

    /// Returns the number of pending timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    /// Returns true if no timers are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().entries.is_empty()
    }

    /// Drops every pending timer without running it.
    pub fn clear(&self) {
        let entries = std::mem::take(&mut self.state.borrow_mut().entries);
        drop(entries);
    }
}

impl fmt::Debug for TimerWheel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerWheel")
            .field("pending", &self.len())
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_fires_in_deadline_then_registration_order() {
        let wheel = TimerWheel::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        for (label, at) in [("b", 20), ("a", 10), ("c", 20)] {
            let order = order.clone();
            wheel.schedule_at(ms(at), move || order.borrow_mut().push(label));
        }

        assert_eq!(wheel.next_deadline(), Some(ms(10)));
        assert_eq!(wheel.fire_due(ms(15)), 1);
        assert_eq!(wheel.fire_due(ms(20)), 2);
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
        assert!(wheel.is_empty());
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let wheel = TimerWheel::new();
        let fired = Rc::new(RefCell::new(false));
        let flag = fired.clone();

        let handle = wheel.schedule_at(ms(5), move || *flag.borrow_mut() = true);
        assert!(handle.is_pending());
        assert!(handle.cancel());
        assert!(!handle.cancel());

        wheel.fire_due(ms(100));
        assert!(!*fired.borrow());
    }

    #[test]
    fn test_callbacks_may_schedule_due_timers() {
        let wheel = TimerWheel::new();
        let count = Rc::new(RefCell::new(0));

        let inner_wheel = wheel.clone();
        let inner_count = count.clone();
        wheel.schedule_at(ms(1), move || {
            *inner_count.borrow_mut() += 1;
            let again = inner_count.clone();
            inner_wheel.schedule_at(ms(1), move || *again.borrow_mut() += 1);
        });

        assert_eq!(wheel.fire_due(ms(1)), 2);
        assert_eq!(*count.borrow(), 2);
    }
}
