//! Shared fixtures for bridge integration tests.
//!
//! - [`RecordingSource`] counts setups and cleanups and tracks how many
//!   hardware subscriptions are live at once.
//! - [`TimedActuator`] records when each command started and finished so
//!   tests can check ordering and overlap.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use autogate_bridge::{Actuator, EventSink, EventSource};
use autogate_core::Result;
use parking_lot::Mutex;

/// Counters shared between a [`RecordingSource`] and the test.
#[derive(Debug, Default)]
pub struct SourceStats {
    pub setups: AtomicUsize,
    pub cleanups: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
}

impl SourceStats {
    pub fn setups(&self) -> usize {
        self.setups.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

/// Event source with a producer thread per subscription.
///
/// Emits `0, 1, 2, ...` every `interval`. With `limit` set the producer
/// finishes the stream after that many events, otherwise it runs until
/// cleanup.
pub struct RecordingSource {
    pub stats: Arc<SourceStats>,
    limit: Option<u64>,
    interval: Duration,
    stop: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
}

impl RecordingSource {
    pub fn new(limit: Option<u64>, interval: Duration) -> Self {
        Self {
            stats: Arc::new(SourceStats::default()),
            limit,
            interval,
            stop: Arc::new(AtomicBool::new(false)),
            producer: None,
        }
    }

    /// Source that emits `count` events as fast as the consumer allows.
    pub fn burst(count: u64) -> Self {
        Self::new(Some(count), Duration::ZERO)
    }

    /// Source that emits until cleaned up.
    pub fn endless(interval: Duration) -> Self {
        Self::new(None, interval)
    }
}

impl EventSource for RecordingSource {
    type Event = u64;

    fn setup(&mut self, sink: EventSink<u64>) -> Result<()> {
        self.stats.setups.fetch_add(1, Ordering::SeqCst);
        let live = self.stats.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_live.fetch_max(live, Ordering::SeqCst);

        self.stop = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&self.stop);
        let limit = self.limit;
        let interval = self.interval;
        self.producer = Some(thread::spawn(move || {
            let mut next = 0;
            while !stop.load(Ordering::SeqCst) && limit.is_none_or(|limit| next < limit) {
                if sink.emit(next).is_err() {
                    return;
                }
                next += 1;
                if !interval.is_zero() {
                    thread::sleep(interval);
                }
            }
            sink.finish();
        }));
        Ok(())
    }

    fn cleanup(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(producer) = self.producer.take() {
            producer.join().unwrap();
        }
        self.stats.live.fetch_sub(1, Ordering::SeqCst);
        self.stats.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

/// One executed command with its wall-clock span.
#[derive(Debug, Clone)]
pub struct Execution {
    pub command: u32,
    pub started: Instant,
    pub finished: Instant,
}

/// Actuator that sleeps for `duration` per command and records spans.
#[derive(Clone)]
pub struct TimedActuator {
    pub executions: Arc<Mutex<Vec<Execution>>>,
    pub settles: Arc<AtomicUsize>,
    pub busy: Arc<AtomicBool>,
    pub overlaps: Arc<AtomicUsize>,
    duration: Duration,
}

impl TimedActuator {
    pub fn new(duration: Duration) -> Self {
        Self {
            executions: Arc::default(),
            settles: Arc::default(),
            busy: Arc::default(),
            overlaps: Arc::default(),
            duration,
        }
    }

    pub fn commands(&self) -> Vec<u32> {
        self.executions.lock().iter().map(|e| e.command).collect()
    }
}

impl Actuator for TimedActuator {
    type Command = u32;

    fn serve(&mut self, command: u32, _has_more: bool) -> Result<()> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let started = Instant::now();
        thread::sleep(self.duration);
        self.executions.lock().push(Execution {
            command,
            started,
            finished: Instant::now(),
        });
        self.busy.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn settle(&mut self) {
        self.settles.fetch_add(1, Ordering::SeqCst);
    }
}
