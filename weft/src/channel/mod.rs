//! Rendezvous channels.
//!
//! A `Channel<T>` pairs parked senders with parked receivers in strict FIFO
//! order, optionally through a bounded buffer. With capacity 0 every `put`
//! waits for a matching `rec` (pure handshake).

mod ops;
mod state;


pub use ops::{Put, Rec};

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

use crate::core::JobId;
use crate::errors::{TryRecvError, TrySendError};
use crate::runtime::Runtime;
use state::ChannelState;

/// A rendezvous channel. Clones share the same queues.
pub struct Channel<T> {
    rt: Runtime,
    state: Rc<RefCell<ChannelState<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            rt: self.rt.clone(),
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Channel")
            .field("capacity", &state.capacity)
            .field("buffered", &state.buffer.len())
            .field("waiting_senders", &state.senders.len())
            .field("waiting_receivers", &state.receivers.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T: 'static> Channel<T> {
    pub(crate) fn new(rt: Runtime, capacity: usize) -> Self {
        Self {
            rt,
            state: Rc::new(RefCell::new(ChannelState::new(capacity))),
        }
    }

    /// Sends `msg`, waiting for a receiver or buffer space if needed.
    pub fn put(&self, msg: T) -> Put<T> {
        Put::new(self.clone(), msg)
    }

    /// Receives the next message, waiting for a sender if needed.
    pub fn rec(&self) -> Rec<T> {
        Rec::new(self.clone())
    }

    /// Sends without waiting.
    pub fn try_put(&self, msg: T) -> Result<(), TrySendError<T>> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(TrySendError::Closed(msg));
        }
        let msg = match state.deliver(msg) {
            Ok(waker) => {
                drop(state);
                waker.wake();
                self.rt.flush();
                return Ok(());
            }
            Err(msg) => msg,
        };
        if state.has_room() {
            state.buffer.push_back(msg);
            return Ok(());
        }
        Err(TrySendError::Full(msg))
    }

    /// Receives without waiting.
    pub fn try_rec(&self) -> Result<T, TryRecvError> {
        let mut state = self.state.borrow_mut();
        match state.take() {
            Some((msg, released)) => {
                drop(state);
                if let Some(waker) = released {
                    waker.wake();
                    self.rt.flush();
                }
                Ok(msg)
            }
            None if state.closed => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Closes the channel. Parked senders fail with
    /// [`ChannelError::Closed`](crate::errors::ChannelError::Closed); parked
    /// receivers too. Buffered messages can still be received.
    pub fn close(&self) {
        let wakers = {
            let mut state = self.state.borrow_mut();
            if state.closed {
                return;
            }
            state.close()
        };
        debug!(released = wakers.len(), "channel closed");
        for waker in wakers {
            waker.wake();
        }
        self.rt.flush();
    }

    /// True once closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    /// True while messages are buffered or anyone is parked on the channel.
    #[must_use]
    pub fn is_pending_work(&self) -> bool {
        let state = self.state.borrow();
        !state.buffer.is_empty() || !state.senders.is_empty() || !state.receivers.is_empty()
    }

    /// Number of buffered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().buffer.len()
    }

    /// True if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().buffer.is_empty()
    }

    /// Buffer capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.borrow().capacity
    }

    /// Number of parked senders.
    #[must_use]
    pub fn waiting_senders(&self) -> usize {
        self.state.borrow().senders.len()
    }

    /// Number of parked receivers.
    #[must_use]
    pub fn waiting_receivers(&self) -> usize {
        self.state.borrow().receivers.len()
    }

    /// Jobs currently parked on this channel, senders first.
    #[must_use]
    pub fn parked_jobs(&self) -> Vec<JobId> {
        let state = self.state.borrow();
        state
            .senders
            .iter()
            .filter_map(|s| s.job)
            .chain(state.receivers.iter().filter_map(|r| r.job))
            .collect()
    }
}
