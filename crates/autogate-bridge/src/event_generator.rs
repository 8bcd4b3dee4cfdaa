//! Single-consumer event streams over hardware-driven producers.
//!
//! An [`EventGenerator`] turns an [`EventSource`] (a driver that pushes events
//! from its own threads or interrupt callbacks) into a sequence a caller can
//! iterate, either blocking ([`attach`](EventGenerator::attach)) or from async
//! code ([`attach_async`](EventGenerator::attach_async)).
//!
//! # Lifecycle
//!
//! ```text
//!            attach()                    async stream closed
//!   ┌──────┐ setup(sink) ┌────────┐ inject sentinel ┌──────────┐
//!   │ Idle │────────────►│ Active │────────────────►│ Draining │
//!   └──────┘             └────────┘                 └──────────┘
//!      ▲                      │ close() / preempting attach()   │
//!      │                      │ sentinel seen / stream dropped  │ pump released
//!      └──────────────────────┴──────── cleanup() ◄─────────────┘
//! ```
//!
//! - At most one consumer is `Active`. A second `attach` first forces the
//!   current one back to `Idle`, and the old `cleanup()`
//!   has returned before the new `setup()` starts, so a hardware subscription
//!   is never installed twice.
//! - `cleanup()` runs exactly once per attach, on every exit path: the
//!   sentinel, dropping the stream early, a panic unwinding through the
//!   consumer, or preemption.
//! - Events buffered for a preempted consumer are discarded, never replayed
//!   to the next one. Each attach gets a fresh channel.
//! - `close()` and a preempting `attach()` run the old cleanup themselves,
//!   right after injecting the sentinel, so they return promptly even when
//!   called from the consumer's own thread. The consumer's stream then ends
//!   and its release is a no-op.
//! - A session already `Draining` (an async stream asked to close) is given
//!   up to the close timeout to release before its cleanup is run by the
//!   waiting side.
//!
//! # Examples
//!
//! ```
//! use autogate_bridge::event_generator::{EventGenerator, EventSink, EventSource};
//! use autogate_core::Result;
//!
//! struct Counter;
//!
//! impl EventSource for Counter {
//!     type Event = u32;
//!
//!     fn setup(&mut self, sink: EventSink<u32>) -> Result<()> {
//!         std::thread::spawn(move || {
//!             for i in 0..3 {
//!                 if sink.emit(i).is_err() {
//!                     break;
//!                 }
//!             }
//!             sink.finish();
//!         });
//!         Ok(())
//!     }
//!
//!     fn cleanup(&mut self) {}
//! }
//!
//! let generator = EventGenerator::builder("counter", Counter).capacity(1).build();
//! let events: Vec<u32> = generator.attach().unwrap().collect();
//! assert_eq!(events, vec![0, 1, 2]);
//! ```

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use autogate_core::constants::{DEFAULT_CLOSE_TIMEOUT_MS, DEFAULT_EVENT_CHANNEL_CAPACITY};
use autogate_core::{Error, Result};
use futures::Stream;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::channel::{BoundedChannel, Slot};

/// A driver that produces events into an [`EventGenerator`].
///
/// `setup` installs the hardware subscription (spawn a sampling thread,
/// register an interrupt callback) and hands it the sink to push events
/// into; `cleanup` removes it and waits for producers to quiesce. The
/// generator guarantees the two calls alternate strictly.
pub trait EventSource: Send + 'static {
    type Event: Send + 'static;

    fn setup(&mut self, sink: EventSink<Self::Event>) -> Result<()>;

    fn cleanup(&mut self);
}

/// Producer side of one attach lifecycle.
pub struct EventSink<T> {
    channel: BoundedChannel<T>,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            channel: self.channel.clone(),
        }
    }
}

impl<T> fmt::Debug for EventSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("channel", &self.channel)
            .finish()
    }
}

impl<T> EventSink<T> {
    /// Push an event, waiting while the consumer is behind.
    ///
    /// Fails with [`Error::Closed`] once the lifecycle ended; producers
    /// should stop on error.
    pub fn emit(&self, event: T) -> Result<()> {
        self.channel.put(event)
    }

    /// End the stream from the producer side. The consumer sees the
    /// remaining events, then the sequence terminates.
    pub fn finish(&self) {
        self.channel.close();
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}

/// Where a generator is in its attach lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorState {
    /// No consumer, no hardware subscription.
    Idle,

    /// One consumer attached, events flowing.
    Active,

    /// The close sentinel was injected; waiting for the consumer to release.
    Draining,
}

impl fmt::Display for GeneratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
            Self::Draining => write!(f, "draining"),
        }
    }
}

struct Session<T> {
    id: u64,
    channel: BoundedChannel<T>,
}

struct Lifecycle<T> {
    state: GeneratorState,
    session: Option<Session<T>>,
    next_id: u64,
}

struct Inner<S: EventSource> {
    name: String,
    capacity: usize,
    close_timeout: Duration,
    source: Mutex<S>,
    lifecycle: Mutex<Lifecycle<S::Event>>,
    released: Condvar,
}

impl<S: EventSource> Inner<S> {
    /// Bring the generator back to `Idle`, preempting any active consumer.
    fn quiesce(&self, lifecycle: &mut MutexGuard<'_, Lifecycle<S::Event>>) {
        let deadline = Instant::now() + self.close_timeout;
        loop {
            match lifecycle.state {
                GeneratorState::Idle => return,
                GeneratorState::Active => {
                    // The consumer may be the caller itself, so do not wait
                    // for it. Its own release later finds the session gone.
                    match lifecycle.session.as_ref().map(|s| s.id) {
                        Some(id) => {
                            debug!(generator = %self.name, session = id, "Closing active consumer");
                            self.release_locked(lifecycle, id);
                        }
                        None => lifecycle.state = GeneratorState::Idle,
                    }
                }
                GeneratorState::Draining => {
                    let timed_out = self.released.wait_until(lifecycle, deadline).timed_out();
                    if timed_out && lifecycle.state != GeneratorState::Idle {
                        warn!(
                            generator = %self.name,
                            timeout_ms = self.close_timeout.as_millis() as u64,
                            "Consumer did not release in time, cleaning up on its behalf"
                        );
                        if let Some(id) = lifecycle.session.as_ref().map(|s| s.id) {
                            self.release_locked(lifecycle, id);
                        } else {
                            lifecycle.state = GeneratorState::Idle;
                        }
                    }
                }
            }
        }
    }

    /// End session `id` if it is still the live one. Returns whether this
    /// call performed the cleanup.
    fn release(&self, id: u64) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        self.release_locked(&mut lifecycle, id)
    }

    fn release_locked(&self, lifecycle: &mut Lifecycle<S::Event>, id: u64) -> bool {
        let Some(session) = lifecycle.session.take_if(|s| s.id == id) else {
            return false;
        };

        // Producers blocked on a full channel must wake up before cleanup
        // joins them.
        session.channel.close();
        session.channel.clear();
        self.source.lock().cleanup();

        lifecycle.state = GeneratorState::Idle;
        self.released.notify_all();
        debug!(generator = %self.name, session = id, "Consumer released");
        true
    }

    /// Inject the sentinel into session `id` without waiting.
    fn request_close(&self, id: u64) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != GeneratorState::Active {
            return;
        }
        if let Some(session) = lifecycle.session.as_ref().filter(|s| s.id == id) {
            debug!(generator = %self.name, session = id, "Close requested by consumer");
            session.channel.close();
            session.channel.clear();
            lifecycle.state = GeneratorState::Draining;
        }
    }
}

/// Exclusive-consumer bridge from an [`EventSource`] to blocking and async
/// consumers.
///
/// Cloning yields another handle to the same generator.
pub struct EventGenerator<S: EventSource> {
    inner: Arc<Inner<S>>,
}

impl<S: EventSource> Clone for EventGenerator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: EventSource> fmt::Debug for EventGenerator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventGenerator")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("state", &self.state())
            .finish()
    }
}

impl<S: EventSource> EventGenerator<S> {
    /// Generator with default capacity and close timeout.
    pub fn new(name: impl Into<String>, source: S) -> Self {
        Self::builder(name, source).build()
    }

    pub fn builder(name: impl Into<String>, source: S) -> EventGeneratorBuilder<S> {
        EventGeneratorBuilder {
            name: name.into(),
            source,
            capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            close_timeout: Duration::from_millis(DEFAULT_CLOSE_TIMEOUT_MS),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> GeneratorState {
        self.inner.lifecycle.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() != GeneratorState::Idle
    }

    /// Run `f` with exclusive access to the underlying source.
    pub fn with_source<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.inner.source.lock())
    }

    /// Become the sole consumer and return a blocking iterator of events.
    ///
    /// A previous consumer is closed and its source cleaned up first. Only
    /// a session already draining is waited for, bounded by the close
    /// timeout.
    ///
    /// # Errors
    ///
    /// Propagates the error of the source's `setup`; the generator stays
    /// `Idle` in that case.
    pub fn attach(&self) -> Result<EventStream<S>> {
        let mut lifecycle = self.inner.lifecycle.lock();
        self.inner.quiesce(&mut lifecycle);

        let id = lifecycle.next_id;
        lifecycle.next_id += 1;

        let channel = BoundedChannel::new(format!("{} events", self.inner.name), self.inner.capacity);
        self.inner.source.lock().setup(EventSink {
            channel: channel.clone(),
        })?;

        lifecycle.session = Some(Session {
            id,
            channel: channel.clone(),
        });
        lifecycle.state = GeneratorState::Active;
        debug!(generator = %self.inner.name, session = id, "Consumer attached");

        Ok(EventStream {
            inner: Arc::clone(&self.inner),
            id,
            channel,
            finished: false,
        })
    }

    /// Async counterpart of [`attach`](Self::attach).
    ///
    /// The blocking stream runs on the blocking thread pool and forwards
    /// every event to the returned [`AsyncEventStream`]. Dropping that stream
    /// (or cancelling the task that owns it) closes the session.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn attach_async(&self) -> Result<AsyncEventStream<S::Event>> {
        let generator = self.clone();
        let stream = tokio::task::spawn_blocking(move || generator.attach())
            .await
            .map_err(|e| Error::worker(format!("{} attach: {e}", self.inner.name)))??;

        let (tx, rx) = mpsc::channel(self.inner.capacity.max(1));
        let session = stream.id;
        let inner = Arc::clone(&self.inner);
        let cancel = Box::new(move || inner.request_close(session));

        let pump = tokio::task::spawn_blocking(move || {
            for event in stream {
                if tx.blocking_send(event).is_err() {
                    break;
                }
            }
        });

        Ok(AsyncEventStream {
            rx,
            cancel,
            pump: Some(pump),
            close_timeout: self.inner.close_timeout,
        })
    }

    /// Terminate the active consumer, if any, and return to `Idle`.
    ///
    /// Works whether or not the consumer is currently reading, including
    /// from the consumer's own thread: the source is cleaned up before this
    /// returns.
    pub fn close(&self) {
        let mut lifecycle = self.inner.lifecycle.lock();
        self.inner.quiesce(&mut lifecycle);
    }
}

/// Builder for [`EventGenerator`].
#[derive(Debug)]
pub struct EventGeneratorBuilder<S> {
    name: String,
    source: S,
    capacity: usize,
    close_timeout: Duration,
}

impl<S: EventSource> EventGeneratorBuilder<S> {
    /// Events buffered between producer and consumer. `0` makes every
    /// emit a rendezvous with the consumer.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn build(self) -> EventGenerator<S> {
        EventGenerator {
            inner: Arc::new(Inner {
                name: self.name,
                capacity: self.capacity,
                close_timeout: self.close_timeout,
                source: Mutex::new(self.source),
                lifecycle: Mutex::new(Lifecycle {
                    state: GeneratorState::Idle,
                    session: None,
                    next_id: 0,
                }),
                released: Condvar::new(),
            }),
        }
    }
}

/// Blocking iterator over the events of one attach lifecycle.
///
/// The iterator ends when the generator is closed or preempted, or when the
/// source finishes. Dropping it early ends the lifecycle.
pub struct EventStream<S: EventSource> {
    inner: Arc<Inner<S>>,
    id: u64,
    channel: BoundedChannel<S::Event>,
    finished: bool,
}

impl<S: EventSource> EventStream<S> {
    /// Identifier of this attach lifecycle, unique per generator.
    pub fn session_id(&self) -> u64 {
        self.id
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.inner.release(self.id);
        }
    }
}

impl<S: EventSource> Iterator for EventStream<S> {
    type Item = S::Event;

    fn next(&mut self) -> Option<S::Event> {
        if self.finished {
            return None;
        }
        match self.channel.get() {
            Slot::Item(event) => Some(event),
            Slot::Close => {
                self.finish();
                None
            }
        }
    }
}

impl<S: EventSource> Drop for EventStream<S> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl<S: EventSource> fmt::Debug for EventStream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("generator", &self.inner.name)
            .field("session", &self.id)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Async stream over the events of one attach lifecycle.
pub struct AsyncEventStream<T> {
    rx: mpsc::Receiver<T>,
    cancel: Box<dyn Fn() + Send + Sync>,
    pump: Option<JoinHandle<()>>,
    close_timeout: Duration,
}

impl<T> AsyncEventStream<T> {
    /// Receive the next event; `None` once the session ended.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// End the session and wait until the source has been cleaned up.
    pub async fn close(mut self) {
        (self.cancel)();
        self.rx.close();
        if let Some(pump) = self.pump.take() {
            match tokio::time::timeout(self.close_timeout, pump).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Event pump failed: {}", e),
                Err(_) => warn!(
                    timeout_ms = self.close_timeout.as_millis() as u64,
                    "Event pump did not stop in time"
                ),
            }
        }
    }
}

impl<T> Stream for AsyncEventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

impl<T> Drop for AsyncEventStream<T> {
    fn drop(&mut self) {
        (self.cancel)();
    }
}

impl<T> fmt::Debug for AsyncEventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncEventStream")
            .field("pumping", &self.pump.is_some())
            .finish()
    }
}
