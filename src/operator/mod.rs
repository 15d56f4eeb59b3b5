//! The cooperative single-threaded runtime contract shared by the three
//! window operators, plus the inbox/outbox adapters a host scheduler wires
//! them to.
//!
//! Each operator instance runs on one logical thread: the host invokes
//! [`WindowOperator::process_item`] / [`WindowOperator::process_watermark`]
//! and expects every call to return promptly. The only permitted suspension
//! point inside a call is "outbox full" (see [`Outbox::offer`]); operators
//! retain enough state to resume without re-emitting anything already sent.

pub mod frame;
pub mod session;
pub mod sliding;

use crate::item::Item;

/// Context handed to an operator at `init`. Currently empty: this crate does
/// not model host-side metadata (task index, parallelism) since nothing in
/// the windowing core depends on it, but the parameter is kept so a future
/// host need not change the trait.
#[derive(Debug, Clone, Default)]
pub struct Context;

/// A FIFO of items a `WindowOperator` reads from.
pub trait Inbox<T> {
    /// Look at the head item without consuming it.
    fn peek(&self) -> Option<&Item<T>>;
    /// Consume and return the head item.
    fn poll(&mut self) -> Option<Item<T>>;
    fn is_empty(&self) -> bool {
        self.peek().is_none()
    }
}

/// An accept-or-reject sink a `WindowOperator` writes emitted items to.
pub trait Outbox<T> {
    /// Try to hand `item` to the sink. Returns `false` when full; the caller
    /// must retry the same item on a later call.
    fn offer(&mut self, item: Item<T>) -> bool;
}

/// The runtime contract every window operator implements.
///
/// `init` is called exactly once, before any other method, and the operator
/// takes ownership of the outbox for the remainder of its lifetime: it is
/// not re-passed to `process_item` / `process_watermark` / `complete`.
pub trait WindowOperator<In, Out> {
    fn init(&mut self, outbox: Box<dyn Outbox<Out> + Send>, context: Context);

    /// Drain zero or more items from `inbox`. Returns `true` iff the inbox
    /// was fully consumed for this call (`false` means the outbox filled up
    /// mid-drain and the caller should invoke this again later).
    fn process_item(&mut self, ordinal: usize, inbox: &mut dyn Inbox<In>) -> bool;

    /// Returns `true` iff the watermark and everything it unblocks has been
    /// fully emitted.
    fn process_watermark(&mut self, watermark: crate::item::Timestamp) -> bool;

    /// Signal end-of-stream: emit remaining state as if an infinite
    /// watermark had arrived. Returns `true` once done.
    fn complete(&mut self) -> bool;
}

/// A [`flume`]-channel-backed [`Outbox`], for wiring an operator into a host
/// scheduler without requiring one to exist in this crate. Mirrors the
/// reference crate's use of `flume` for its own inter-block channels.
///
/// Holds no retry state of its own: a rejected `offer` is the caller's item
/// to retry (every `WindowOperator` impl in this crate keeps the rejected
/// item in its own pending queue and replays `offer` with it on the next
/// call), so each call here is an independent, stateless attempt.
pub struct ChannelOutbox<T> {
    sender: flume::Sender<Item<T>>,
    capacity: usize,
}

impl<T> ChannelOutbox<T> {
    pub fn new(sender: flume::Sender<Item<T>>, capacity: usize) -> Self {
        ChannelOutbox { sender, capacity }
    }
}

impl<T> Outbox<T> for ChannelOutbox<T> {
    fn offer(&mut self, item: Item<T>) -> bool {
        if self.sender.len() >= self.capacity {
            return false;
        }
        match self.sender.try_send(item) {
            Ok(()) => true,
            Err(flume::TrySendError::Full(_)) => false,
            Err(flume::TrySendError::Disconnected(_)) => false,
        }
    }
}

/// A `VecDeque`-backed [`Inbox`] for tests and simple in-process wiring.
/// Does not coalesce a trailing watermark away from `peek`, unlike hosts
/// that are free to do so per the runtime contract's documented convention.
pub struct VecDequeInbox<T> {
    items: std::collections::VecDeque<Item<T>>,
}

impl<T> VecDequeInbox<T> {
    pub fn new() -> Self {
        VecDequeInbox {
            items: std::collections::VecDeque::new(),
        }
    }

    pub fn push(&mut self, item: Item<T>) {
        self.items.push_back(item);
    }
}

impl<T> Default for VecDequeInbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Inbox<T> for VecDequeInbox<T> {
    fn peek(&self) -> Option<&Item<T>> {
        self.items.front()
    }

    fn poll(&mut self) -> Option<Item<T>> {
        self.items.pop_front()
    }
}
