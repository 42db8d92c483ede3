//! Blocking channel operations as futures.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use super::state::{ParkedReceiver, ParkedSender, RecvSlot, Ticket};
use super::Channel;
use crate::errors::ChannelError;
use crate::runtime::slot::JobRecord;
use crate::runtime::Runtime;

/// Counts the calling job as parked on a channel until dropped.
struct ParkGuard(Option<Rc<JobRecord>>);

impl ParkGuard {
    fn enter(rt: &Runtime) -> Self {
        let record = rt.current_job().and_then(|id| rt.record_of(id));
        if let Some(record) = &record {
            let waits = record.channel_waits.get();
            debug_assert_eq!(waits, 0, "job '{}' is already parked on a channel", record.name);
            record.channel_waits.set(waits + 1);
        }
        Self(record)
    }
}

impl Drop for ParkGuard {
    fn drop(&mut self) {
        if let Some(record) = &self.0 {
            record.channel_waits.set(record.channel_waits.get().saturating_sub(1));
        }
    }
}

/// Future returned by [`Channel::put`].
///
/// Dropping it while parked withdraws the message.
#[must_use = "futures do nothing unless awaited"]
pub struct Put<T> {
    chan: Channel<T>,
    msg: Option<T>,
    parked: Option<(u64, Rc<Cell<Ticket>>, ParkGuard)>,
}

impl<T> Unpin for Put<T> {}

impl<T: 'static> Put<T> {
    pub(crate) fn new(chan: Channel<T>, msg: T) -> Self {
        Self {
            chan,
            msg: Some(msg),
            parked: None,
        }
    }
}

impl<T: 'static> Future for Put<T> {
    type Output = Result<(), ChannelError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        if let Some((key, ticket, _)) = &this.parked {
            return match ticket.get() {
                Ticket::Delivered => {
                    this.parked = None;
                    Poll::Ready(Ok(()))
                }
                Ticket::Closed => {
                    this.parked = None;
                    Poll::Ready(Err(ChannelError::Closed))
                }
                Ticket::Waiting => {
                    let mut state = this.chan.state.borrow_mut();
                    if let Some(sender) = state.senders.iter_mut().find(|s| s.key == *key) {
                        sender.waker.clone_from(cx.waker());
                    }
                    Poll::Pending
                }
            };
        }

        let Some(msg) = this.msg.take() else {
            return Poll::Ready(Ok(()));
        };

        let mut state = this.chan.state.borrow_mut();
        if state.closed {
            return Poll::Ready(Err(ChannelError::Closed));
        }
        let msg = match state.deliver(msg) {
            Ok(waker) => {
                drop(state);
                waker.wake();
                return Poll::Ready(Ok(()));
            }
            Err(msg) => msg,
        };
        if state.has_room() {
            state.buffer.push_back(msg);
            return Poll::Ready(Ok(()));
        }

        let guard = ParkGuard::enter(&this.chan.rt);
        let key = state.next_key();
        let ticket = Rc::new(Cell::new(Ticket::Waiting));
        state.senders.push_back(ParkedSender {
            key,
            job: this.chan.rt.current_job(),
            msg,
            waker: cx.waker().clone(),
            ticket: Rc::clone(&ticket),
        });
        drop(state);
        this.parked = Some((key, ticket, guard));
        Poll::Pending
    }
}

impl<T> Drop for Put<T> {
    fn drop(&mut self) {
        if let Some((key, ticket, _guard)) = self.parked.take() {
            if ticket.get() == Ticket::Waiting {
                let removed = self.chan.state.borrow_mut().remove_sender(key);
                drop(removed);
            }
        }
    }
}

/// Future returned by [`Channel::rec`].
///
/// Dropping it while parked leaves the queue; a message that was already
/// handed to it goes to the next receiver or back to the buffer head.
#[must_use = "futures do nothing unless awaited"]
pub struct Rec<T> {
    chan: Channel<T>,
    parked: Option<(u64, Rc<RefCell<RecvSlot<T>>>, ParkGuard)>,
}

impl<T> Unpin for Rec<T> {}

impl<T: 'static> Rec<T> {
    pub(crate) fn new(chan: Channel<T>) -> Self {
        Self { chan, parked: None }
    }
}

impl<T: 'static> Future for Rec<T> {
    type Output = Result<T, ChannelError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        if let Some((key, slot, _)) = &this.parked {
            let taken = std::mem::replace(&mut *slot.borrow_mut(), RecvSlot::Waiting);
            return match taken {
                RecvSlot::Delivered(msg) => {
                    this.parked = None;
                    Poll::Ready(Ok(msg))
                }
                RecvSlot::Closed => {
                    this.parked = None;
                    Poll::Ready(Err(ChannelError::Closed))
                }
                RecvSlot::Waiting => {
                    let mut state = this.chan.state.borrow_mut();
                    if let Some(receiver) = state.receivers.iter_mut().find(|r| r.key == *key) {
                        receiver.waker.clone_from(cx.waker());
                    }
                    Poll::Pending
                }
            };
        }

        let mut state = this.chan.state.borrow_mut();
        if let Some((msg, released)) = state.take() {
            drop(state);
            if let Some(waker) = released {
                waker.wake();
            }
            return Poll::Ready(Ok(msg));
        }
        if state.closed {
            return Poll::Ready(Err(ChannelError::Closed));
        }

        let guard = ParkGuard::enter(&this.chan.rt);
        let key = state.next_key();
        let slot = Rc::new(RefCell::new(RecvSlot::Waiting));
        state.receivers.push_back(ParkedReceiver {
            key,
            job: this.chan.rt.current_job(),
            waker: cx.waker().clone(),
            slot: Rc::clone(&slot),
        });
        drop(state);
        this.parked = Some((key, slot, guard));
        Poll::Pending
    }
}

impl<T> Drop for Rec<T> {
    fn drop(&mut self) {
        let Some((key, slot, _guard)) = self.parked.take() else {
            return;
        };
        let taken = std::mem::replace(&mut *slot.borrow_mut(), RecvSlot::Closed);
        let wake = {
            let mut state = self.chan.state.borrow_mut();
            match taken {
                RecvSlot::Waiting => {
                    let removed = state.remove_receiver(key);
                    drop(state);
                    drop(removed);
                    None
                }
                RecvSlot::Delivered(msg) => match state.deliver(msg) {
                    Ok(waker) => Some(waker),
                    Err(msg) => {
                        state.buffer.push_front(msg);
                        None
                    }
                },
                RecvSlot::Closed => None,
            }
        };
        if let Some(waker) = wake {
            waker.wake();
        }
    }
}
