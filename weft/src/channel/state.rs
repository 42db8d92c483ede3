//! Channel queues.
//!
//! At any time at most one of these holds: senders are parked (buffer full
//! or capacity 0, no receiver waiting), or receivers are parked (buffer
//! empty, no sender waiting).

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::task::Waker;

use crate::core::JobId;

/// What happened to a parked sender's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ticket {
    Waiting,
    Delivered,
    Closed,
}

/// What a parked receiver was handed.
#[derive(Debug)]
pub(crate) enum RecvSlot<T> {
    Waiting,
    Delivered(T),
    Closed,
}

pub(crate) struct ParkedSender<T> {
    pub(crate) key: u64,
    pub(crate) job: Option<JobId>,
    pub(crate) msg: T,
    pub(crate) waker: Waker,
    pub(crate) ticket: Rc<Cell<Ticket>>,
}

pub(crate) struct ParkedReceiver<T> {
    pub(crate) key: u64,
    pub(crate) job: Option<JobId>,
    pub(crate) waker: Waker,
    pub(crate) slot: Rc<RefCell<RecvSlot<T>>>,
}

pub(crate) struct ChannelState<T> {
    pub(crate) capacity: usize,
    pub(crate) buffer: VecDeque<T>,
    pub(crate) senders: VecDeque<ParkedSender<T>>,
    pub(crate) receivers: VecDeque<ParkedReceiver<T>>,
    pub(crate) closed: bool,
    next_key: u64,
}

impl<T> ChannelState<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: VecDeque::with_capacity(capacity),
            senders: VecDeque::new(),
            receivers: VecDeque::new(),
            closed: false,
            next_key: 0,
        }
    }

    pub(crate) fn next_key(&mut self) -> u64 {
        self.next_key += 1;
        self.next_key
    }

    pub(crate) fn has_room(&self) -> bool {
        self.buffer.len() < self.capacity
    }

    /// Hands `msg` to the first parked receiver, or gives it back.
    pub(crate) fn deliver(&mut self, msg: T) -> Result<Waker, T> {
        match self.receivers.pop_front() {
            Some(receiver) => {
                *receiver.slot.borrow_mut() = RecvSlot::Delivered(msg);
                Ok(receiver.waker)
            }
            None => Err(msg),
        }
    }

    /// Takes the next message: buffered first, then straight from a
    /// parked sender. Returns the sender's waker when one was released.
    ///
    /// The buffer can briefly exceed `capacity` when a dropped receiver
    /// hands its message back; parked senders stay parked until it drains.
    pub(crate) fn take(&mut self) -> Option<(T, Option<Waker>)> {
        if let Some(msg) = self.buffer.pop_front() {
            let released = if self.has_room() {
                self.senders.pop_front().map(|sender| {
                    self.buffer.push_back(sender.msg);
                    sender.ticket.set(Ticket::Delivered);
                    sender.waker
                })
            } else {
                None
            };
            return Some((msg, released));
        }
        self.senders.pop_front().map(|sender| {
            sender.ticket.set(Ticket::Delivered);
            (sender.msg, Some(sender.waker))
        })
    }

    pub(crate) fn remove_sender(&mut self, key: u64) -> Option<ParkedSender<T>> {
        let index = self.senders.iter().position(|s| s.key == key)?;
        self.senders.remove(index)
    }

    pub(crate) fn remove_receiver(&mut self, key: u64) -> Option<ParkedReceiver<T>> {
        let index = self.receivers.iter().position(|r| r.key == key)?;
        self.receivers.remove(index)
    }

    /// Marks the channel closed and returns the wakers of every released
    /// party. Receivers stay parked only while messages remain buffered,
    /// which cannot happen while receivers are parked.
    pub(crate) fn close(&mut self) -> Vec<Waker> {
        self.closed = true;
        let mut wakers = Vec::with_capacity(self.senders.len() + self.receivers.len());
        for sender in self.senders.drain(..) {
            sender.ticket.set(Ticket::Closed);
            wakers.push(sender.waker);
        }
        for receiver in self.receivers.drain(..) {
            *receiver.slot.borrow_mut() = RecvSlot::Closed;
            wakers.push(receiver.waker);
        }
        wakers
    }
}
