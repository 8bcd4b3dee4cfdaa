//! Fixed-capacity FIFO hand-off between hardware threads and a consumer.
//!
//! [`BoundedChannel`] is the primitive both bridging directions are built on.
//! Many producers may [`put`](BoundedChannel::put); exactly one consumer at a
//! time calls [`get`](BoundedChannel::get) (the owner of the channel enforces
//! that). Closing the channel enqueues the reserved [`Slot::Close`] sentinel,
//! which a consumer observes after every item still queued and on every
//! subsequent `get`.
//!
//! Besides the hand-off itself the channel tracks *unfinished work*: every
//! accepted item stays unfinished until the consumer calls
//! [`task_done`](BoundedChannel::task_done) (or the item is discarded by
//! [`clear`](BoundedChannel::clear)). [`join`](BoundedChannel::join) waits for
//! that count to reach zero, which is how a request queue implements `drain`.
//!
//! A capacity of `0` turns the channel into a rendezvous: `put` returns only
//! once a consumer has taken the item, and `try_put` succeeds only if a
//! consumer is already waiting.
//!
//! # Examples
//!
//! ```
//! use autogate_bridge::channel::{BoundedChannel, Slot};
//!
//! let channel = BoundedChannel::new("distance", 2);
//! channel.put(12.5).unwrap();
//! channel.put(13.0).unwrap();
//! assert!(channel.try_put(13.5).is_err());
//!
//! channel.close();
//! assert_eq!(channel.get(), Slot::Item(12.5));
//! assert_eq!(channel.get(), Slot::Item(13.0));
//! assert_eq!(channel.get(), Slot::Close);
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use autogate_core::{Error, Result};
use parking_lot::{Condvar, Mutex};

/// What a consumer receives from [`BoundedChannel::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot<T> {
    /// A payload, in producer emission order.
    Item(T),

    /// The close sentinel. Nothing follows it.
    Close,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
    /// Accepted items not yet acknowledged with `task_done` or discarded.
    unfinished: usize,
    /// Consumers currently blocked in `get`.
    waiting_getters: usize,
    /// Items ever accepted; doubles as the rendezvous ticket counter.
    accepted: u64,
    /// Items ever removed, by `get` or `clear`.
    removed: u64,
    /// Rendezvous tickets whose `put` awaits the hand-off, flagged once
    /// `clear` dropped the item.
    handoffs: HashMap<u64, bool>,
}

struct Shared<T> {
    name: String,
    capacity: usize,
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    removed: Condvar,
    all_done: Condvar,
}

/// Thread-safe bounded FIFO with a close sentinel and work accounting.
///
/// Cloning is cheap and yields another handle to the same channel.
pub struct BoundedChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BoundedChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("BoundedChannel")
            .field("name", &self.shared.name)
            .field("capacity", &self.shared.capacity)
            .field("len", &state.items.len())
            .field("unfinished", &state.unfinished)
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T> BoundedChannel<T> {
    /// Create a channel holding at most `capacity` pending items.
    ///
    /// `name` identifies the channel in errors and logs.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                capacity,
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity.max(1)),
                    closed: false,
                    unfinished: 0,
                    waiting_getters: 0,
                    accepted: 0,
                    removed: 0,
                    handoffs: HashMap::new(),
                }),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                removed: Condvar::new(),
                all_done: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Configured capacity; `0` means rendezvous.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Items that fit in the buffer at once. A rendezvous channel parks one
    /// item while its producer waits for the hand-off.
    fn slots(&self) -> usize {
        self.shared.capacity.max(1)
    }

    /// Enqueue `item`, waiting for a free slot if the channel is full.
    ///
    /// On a rendezvous channel this also waits until a consumer took the item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the channel is (or becomes, while
    /// waiting for space or for the rendezvous hand-off) closed.
    pub fn put(&self, item: T) -> Result<()> {
        let mut state = self.shared.state.lock();
        while !state.closed && state.items.len() >= self.slots() {
            self.shared.not_full.wait(&mut state);
        }
        if state.closed {
            return Err(Error::closed(self.name()));
        }

        let ticket = self.accept(&mut state, item);

        if self.shared.capacity == 0 {
            state.handoffs.insert(ticket, false);
            while state.removed < ticket && !state.closed {
                self.shared.removed.wait(&mut state);
            }
            let discarded = state.handoffs.remove(&ticket).unwrap_or(false);
            if state.removed < ticket {
                // Closed before the hand-off; the parked item is ours.
                state.items.pop_back();
                state.removed += 1;
                state.unfinished -= 1;
                self.shared.not_full.notify_one();
                if state.unfinished == 0 {
                    self.shared.all_done.notify_all();
                }
                return Err(Error::closed(self.name()));
            }
            if discarded {
                return Err(Error::closed(self.name()));
            }
        }
        Ok(())
    }

    /// Enqueue `item` without waiting.
    ///
    /// # Errors
    ///
    /// - [`Error::QueueFull`] if no slot is free (for a rendezvous channel:
    ///   if no consumer is currently waiting).
    /// - [`Error::Closed`] if the channel is closed.
    pub fn try_put(&self, item: T) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(Error::closed(self.name()));
        }

        let has_room = if self.shared.capacity == 0 {
            state.waiting_getters > state.items.len()
        } else {
            state.items.len() < self.shared.capacity
        };
        if !has_room {
            return Err(Error::queue_full(self.name()));
        }

        self.accept(&mut state, item);
        Ok(())
    }

    fn accept(&self, state: &mut State<T>, item: T) -> u64 {
        state.items.push_back(item);
        state.unfinished += 1;
        state.accepted += 1;
        self.shared.not_empty.notify_one();
        state.accepted
    }

    /// Take the next item, waiting until one is available.
    ///
    /// Returns [`Slot::Close`] once the channel is closed and every item
    /// enqueued before the close has been taken.
    pub fn get(&self) -> Slot<T> {
        let mut state = self.shared.state.lock();
        state.waiting_getters += 1;
        let slot = loop {
            if let Some(slot) = self.take(&mut state) {
                break slot;
            }
            self.shared.not_empty.wait(&mut state);
        };
        state.waiting_getters -= 1;
        slot
    }

    /// Like [`get`](Self::get) but gives up after `timeout`, returning `None`.
    pub fn get_timeout(&self, timeout: Duration) -> Option<Slot<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        state.waiting_getters += 1;
        let slot = loop {
            if let Some(slot) = self.take(&mut state) {
                break Some(slot);
            }
            if self
                .shared
                .not_empty
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break self.take(&mut state);
            }
        };
        state.waiting_getters -= 1;
        slot
    }

    fn take(&self, state: &mut State<T>) -> Option<Slot<T>> {
        if let Some(item) = state.items.pop_front() {
            state.removed += 1;
            self.shared.not_full.notify_one();
            self.shared.removed.notify_all();
            return Some(Slot::Item(item));
        }
        state.closed.then_some(Slot::Close)
    }

    /// Discard every pending item without processing it.
    ///
    /// Discarded items count as finished. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut state = self.shared.state.lock();
        let dropped = state.items.len();
        if dropped == 0 {
            return 0;
        }

        state.items.clear();
        // Removal is FIFO, so the dropped tickets follow the last removed one.
        let first = state.removed + 1;
        for ticket in first..first + dropped as u64 {
            if let Some(discarded) = state.handoffs.get_mut(&ticket) {
                *discarded = true;
            }
        }
        state.removed += dropped as u64;
        state.unfinished -= dropped;
        self.shared.not_full.notify_all();
        self.shared.removed.notify_all();
        if state.unfinished == 0 {
            self.shared.all_done.notify_all();
        }
        dropped
    }

    /// Enqueue the close sentinel and reject further puts.
    ///
    /// Items already queued are still delivered before the sentinel; call
    /// [`clear`](Self::clear) afterwards to discard them. Closing twice is a no-op.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();
        self.shared.removed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Number of items waiting to be taken.
    pub fn len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state.lock().items.is_empty()
    }

    /// Accepted items not yet acknowledged, including the one being processed.
    pub fn unfinished(&self) -> usize {
        self.shared.state.lock().unfinished
    }

    /// Acknowledge that one previously taken item has been fully processed.
    pub fn task_done(&self) {
        let mut state = self.shared.state.lock();
        debug_assert!(state.unfinished > 0, "task_done called more times than items taken");
        state.unfinished = state.unfinished.saturating_sub(1);
        if state.unfinished == 0 {
            self.shared.all_done.notify_all();
        }
    }

    /// Wait until every accepted item has been acknowledged or discarded.
    pub fn join(&self) {
        let mut state = self.shared.state.lock();
        while state.unfinished > 0 {
            self.shared.all_done.wait(&mut state);
        }
    }

    /// Like [`join`](Self::join) but gives up after `timeout`.
    ///
    /// Returns `true` if all work finished in time.
    pub fn join_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.unfinished > 0 {
            if self
                .shared
                .all_done
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.unfinished == 0;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let channel = BoundedChannel::new("test", 4);
        for i in 0..4 {
            channel.put(i).unwrap();
        }
        for i in 0..4 {
            assert_eq!(channel.get(), Slot::Item(i));
        }
        assert!(channel.is_empty());
    }

    #[test]
    fn test_try_put_full() {
        let channel = BoundedChannel::new("buzzer", 2);
        channel.try_put(1).unwrap();
        channel.try_put(2).unwrap();

        let err = channel.try_put(3).unwrap_err();
        assert!(matches!(err, Error::QueueFull { .. }));
        assert_eq!(err.status_code(), 429);
        assert_eq!(channel.len(), 2);
    }

    #[test]
    fn test_close_sentinel_is_last() {
        let channel = BoundedChannel::new("test", 3);
        channel.put("a").unwrap();
        channel.put("b").unwrap();
        channel.close();

        assert_eq!(channel.get(), Slot::Item("a"));
        assert_eq!(channel.get(), Slot::Item("b"));
        assert_eq!(channel.get(), Slot::Close);
        assert_eq!(channel.get(), Slot::Close);
    }

    #[test]
    fn test_put_after_close() {
        let channel = BoundedChannel::new("test", 1);
        channel.close();
        assert!(matches!(channel.put(1), Err(Error::Closed(_))));
        assert!(matches!(channel.try_put(1), Err(Error::Closed(_))));
    }

    #[test]
    fn test_close_wakes_blocked_producer() {
        let channel = BoundedChannel::new("test", 1);
        channel.put(1).unwrap();

        let producer = {
            let channel = channel.clone();
            thread::spawn(move || channel.put(2))
        };
        thread::sleep(Duration::from_millis(50));
        channel.close();

        assert!(matches!(producer.join().unwrap(), Err(Error::Closed(_))));
    }

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let channel: BoundedChannel<u8> = BoundedChannel::new("test", 1);
        let consumer = {
            let channel = channel.clone();
            thread::spawn(move || channel.get())
        };
        thread::sleep(Duration::from_millis(50));
        channel.close();
        assert_eq!(consumer.join().unwrap(), Slot::Close);
    }

    #[test]
    fn test_clear_discards_and_finishes() {
        let channel = BoundedChannel::new("test", 3);
        channel.put(1).unwrap();
        channel.put(2).unwrap();
        assert_eq!(channel.unfinished(), 2);

        assert_eq!(channel.clear(), 2);
        assert!(channel.is_empty());
        assert_eq!(channel.unfinished(), 0);
        assert!(channel.join_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_join_waits_for_task_done() {
        let channel = BoundedChannel::new("test", 2);
        channel.put(1).unwrap();

        let consumer = {
            let channel = channel.clone();
            thread::spawn(move || {
                let slot = channel.get();
                thread::sleep(Duration::from_millis(50));
                channel.task_done();
                slot
            })
        };

        let started = Instant::now();
        channel.join();
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(consumer.join().unwrap(), Slot::Item(1));
    }

    #[test]
    fn test_join_timeout_expires() {
        let channel = BoundedChannel::new("test", 1);
        channel.put(1).unwrap();
        assert!(!channel.join_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_get_timeout() {
        let channel: BoundedChannel<u8> = BoundedChannel::new("test", 1);
        assert_eq!(channel.get_timeout(Duration::from_millis(10)), None);
        channel.put(7).unwrap();
        assert_eq!(channel.get_timeout(Duration::from_millis(10)), Some(Slot::Item(7)));
    }

    #[test]
    fn test_rendezvous_try_put_needs_waiting_consumer() {
        let channel = BoundedChannel::new("rendezvous", 0);
        assert!(matches!(channel.try_put(1), Err(Error::QueueFull { .. })));

        let consumer = {
            let channel = channel.clone();
            thread::spawn(move || channel.get())
        };
        // Wait for the consumer to park in `get`.
        let deadline = Instant::now() + Duration::from_secs(2);
        while channel.try_put(1).is_err() {
            assert!(Instant::now() < deadline, "consumer never started waiting");
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(consumer.join().unwrap(), Slot::Item(1));
    }

    #[test]
    fn test_rendezvous_put_waits_for_handoff() {
        let channel = BoundedChannel::new("rendezvous", 0);
        let producer = {
            let channel = channel.clone();
            thread::spawn(move || {
                let started = Instant::now();
                channel.put(42).unwrap();
                started.elapsed()
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(channel.get(), Slot::Item(42));
        assert!(producer.join().unwrap() >= Duration::from_millis(40));
    }

    #[test]
    fn test_rendezvous_put_fails_when_closed_before_handoff() {
        let channel = BoundedChannel::new("rendezvous", 0);
        let producer = {
            let channel = channel.clone();
            thread::spawn(move || channel.put(7))
        };
        while channel.len() == 0 {
            thread::yield_now();
        }

        channel.close();
        assert!(matches!(producer.join().unwrap(), Err(Error::Closed(_))));
        assert_eq!(channel.get(), Slot::Close);
        assert_eq!(channel.unfinished(), 0);
    }

    #[test]
    fn test_rendezvous_put_fails_when_discarded() {
        let channel = BoundedChannel::new("rendezvous", 0);
        let producer = {
            let channel = channel.clone();
            thread::spawn(move || channel.put(7))
        };
        while channel.len() == 0 {
            thread::yield_now();
        }

        channel.close();
        assert_eq!(channel.clear(), 1);
        assert!(matches!(producer.join().unwrap(), Err(Error::Closed(_))));
        assert_eq!(channel.unfinished(), 0);
    }

    #[test]
    fn test_slow_consumer_sees_every_item() {
        let channel = BoundedChannel::new("distance", 2);
        let producer = {
            let channel = channel.clone();
            thread::spawn(move || {
                for i in 0..5 {
                    channel.put(i).unwrap();
                }
                channel.close();
            })
        };

        let mut seen = Vec::new();
        while let Slot::Item(item) = channel.get() {
            thread::sleep(Duration::from_millis(10));
            seen.push(item);
        }
        producer.join().unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }
}
