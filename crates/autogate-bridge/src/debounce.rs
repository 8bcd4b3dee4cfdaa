//! Button debouncing.
//!
//! Electrical bounce turns one press into a burst of edges. The policy keeps
//! the *first* press edge and the *last* release edge within a window:
//!
//! | State | Raw edge | Effect |
//! |-------|----------|--------|
//! | `Released` | press | emit press, go `Pressed` |
//! | `Pressed` | release | (re)start the release timer |
//! | `Pressed` | press | cancel the release timer |
//! | `Released` | release | ignored |
//! | `Pressed` | timer fires | emit release, go `Released` |
//!
//! [`DebounceState`] is the pure transition function; [`Debouncer`] adds the
//! timer thread and delivers the clean edges to a callback.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use autogate_core::Result;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

/// A button edge, raw or debounced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Pressed,
    Released,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pressed => write!(f, "pressed"),
            Self::Released => write!(f, "released"),
        }
    }
}

/// What the caller must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Emit(Edge),
    StartTimer,
    CancelTimer,
    Ignore,
}

/// Debounced button state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DebounceState {
    #[default]
    Released,
    Pressed,
}

impl DebounceState {
    pub fn on_edge(self, edge: Edge) -> (Self, Action) {
        match (self, edge) {
            (Self::Released, Edge::Pressed) => (Self::Pressed, Action::Emit(Edge::Pressed)),
            (Self::Pressed, Edge::Released) => (Self::Pressed, Action::StartTimer),
            (Self::Pressed, Edge::Pressed) => (Self::Pressed, Action::CancelTimer),
            (Self::Released, Edge::Released) => (Self::Released, Action::Ignore),
        }
    }

    /// The release timer ran out without being cancelled.
    pub fn on_timer(self) -> (Self, Action) {
        match self {
            Self::Pressed => (Self::Released, Action::Emit(Edge::Released)),
            Self::Released => (Self::Released, Action::Ignore),
        }
    }
}

struct Timing {
    state: DebounceState,
    deadline: Option<Instant>,
    running: bool,
    /// Clean edges not yet handed to the callback, oldest first.
    outbox: VecDeque<Edge>,
    /// Some thread is running the callback with the lock released.
    delivering: bool,
}

struct Shared {
    window: Duration,
    timing: Mutex<Timing>,
    wake: Condvar,
    emit: Box<dyn Fn(Edge) + Send + Sync>,
}

impl Shared {
    fn apply(&self, timing: &mut Timing, (next, action): (DebounceState, Action)) {
        timing.state = next;
        match action {
            Action::Emit(edge) => timing.outbox.push_back(edge),
            Action::StartTimer => {
                timing.deadline = Some(Instant::now() + self.window);
                self.wake.notify_one();
            }
            Action::CancelTimer => {
                timing.deadline = None;
                self.wake.notify_one();
            }
            Action::Ignore => {}
        }
    }

    /// Hand queued edges to the callback without holding the lock. Only one
    /// thread delivers at a time; others leave their edges in the outbox.
    fn deliver(&self, timing: &mut MutexGuard<'_, Timing>) {
        if timing.delivering {
            return;
        }
        timing.delivering = true;
        while let Some(edge) = timing.outbox.pop_front() {
            MutexGuard::unlocked(timing, || {
                trace!(%edge, "Debounced edge");
                (self.emit)(edge);
            });
        }
        timing.delivering = false;
    }

    fn run_timer(&self) {
        let mut timing = self.timing.lock();
        while timing.running {
            match timing.deadline {
                None => self.wake.wait(&mut timing),
                Some(deadline) if Instant::now() >= deadline => {
                    timing.deadline = None;
                    let transition = timing.state.on_timer();
                    self.apply(&mut timing, transition);
                    self.deliver(&mut timing);
                }
                Some(deadline) => {
                    self.wake.wait_until(&mut timing, deadline);
                }
            }
        }
    }
}

/// Debounces raw edges and forwards clean ones to a callback.
///
/// The callback runs without the debouncer's lock held, on the thread that
/// produced the edge (`feed` for presses, the timer thread for releases).
/// Calls never overlap and follow edge order: while one thread is still
/// inside the callback, edges produced elsewhere are queued and delivered by
/// that thread, so a slow callback never stalls `feed` for bounce edges.
pub struct Debouncer {
    shared: Arc<Shared>,
    timer: Option<JoinHandle<()>>,
}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("window", &self.shared.window)
            .field("state", &self.state())
            .finish()
    }
}

impl Debouncer {
    /// Start a debouncer with the given window.
    ///
    /// # Errors
    ///
    /// Fails if the timer thread cannot be spawned.
    pub fn spawn<F>(window: Duration, emit: F) -> Result<Self>
    where
        F: Fn(Edge) + Send + Sync + 'static,
    {
        let shared = Arc::new(Shared {
            window,
            timing: Mutex::new(Timing {
                state: DebounceState::Released,
                deadline: None,
                running: true,
                outbox: VecDeque::new(),
                delivering: false,
            }),
            wake: Condvar::new(),
            emit: Box::new(emit),
        });

        let timer = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("debounce-timer".into())
                .spawn(move || shared.run_timer())?
        };

        debug!(window_us = window.as_micros() as u64, "Debouncer started");
        Ok(Self {
            shared,
            timer: Some(timer),
        })
    }

    /// Feed one raw edge.
    pub fn feed(&self, edge: Edge) {
        let mut timing = self.shared.timing.lock();
        let transition = timing.state.on_edge(edge);
        self.shared.apply(&mut timing, transition);
        self.shared.deliver(&mut timing);
    }

    pub fn state(&self) -> DebounceState {
        self.shared.timing.lock().state
    }

    /// Forget any press in progress without emitting a release.
    pub fn reset(&self) {
        let mut timing = self.shared.timing.lock();
        timing.state = DebounceState::Released;
        timing.deadline = None;
        self.shared.wake.notify_one();
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.shared.timing.lock().running = false;
        self.shared.wake.notify_all();
        if let Some(timer) = self.timer.take() {
            let _ = timer.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DebounceState::Released, Edge::Pressed, DebounceState::Pressed, Action::Emit(Edge::Pressed))]
    #[case(DebounceState::Pressed, Edge::Released, DebounceState::Pressed, Action::StartTimer)]
    #[case(DebounceState::Pressed, Edge::Pressed, DebounceState::Pressed, Action::CancelTimer)]
    #[case(DebounceState::Released, Edge::Released, DebounceState::Released, Action::Ignore)]
    fn test_transitions(
        #[case] state: DebounceState,
        #[case] edge: Edge,
        #[case] next: DebounceState,
        #[case] action: Action,
    ) {
        assert_eq!(state.on_edge(edge), (next, action));
    }

    #[test]
    fn test_timer_releases_only_when_pressed() {
        assert_eq!(
            DebounceState::Pressed.on_timer(),
            (DebounceState::Released, Action::Emit(Edge::Released))
        );
        assert_eq!(
            DebounceState::Released.on_timer(),
            (DebounceState::Released, Action::Ignore)
        );
    }

    fn recording(window_ms: u64) -> (Debouncer, Arc<Mutex<Vec<Edge>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let debouncer =
            Debouncer::spawn(Duration::from_millis(window_ms), move |edge| sink.lock().push(edge))
                .unwrap();
        (debouncer, seen)
    }

    #[test]
    fn test_bounce_collapses_to_one_pair() {
        let (debouncer, seen) = recording(40);

        debouncer.feed(Edge::Pressed);
        debouncer.feed(Edge::Released);
        thread::sleep(Duration::from_millis(5));
        debouncer.feed(Edge::Pressed);
        debouncer.feed(Edge::Released);
        thread::sleep(Duration::from_millis(120));

        assert_eq!(*seen.lock(), vec![Edge::Pressed, Edge::Released]);
        assert_eq!(debouncer.state(), DebounceState::Released);
    }

    #[test]
    fn test_release_waits_for_window() {
        let (debouncer, seen) = recording(60);

        debouncer.feed(Edge::Pressed);
        debouncer.feed(Edge::Released);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(*seen.lock(), vec![Edge::Pressed]);

        thread::sleep(Duration::from_millis(150));
        assert_eq!(*seen.lock(), vec![Edge::Pressed, Edge::Released]);
    }

    #[test]
    fn test_stray_release_is_ignored() {
        let (debouncer, seen) = recording(10);
        debouncer.feed(Edge::Released);
        thread::sleep(Duration::from_millis(40));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_blocked_callback_does_not_stall_feed() {
        let (tx, rx) = std::sync::mpsc::sync_channel(0);
        let tx = Mutex::new(tx);
        let debouncer = Arc::new(
            Debouncer::spawn(Duration::from_millis(5), move |edge| {
                let _ = tx.lock().send(edge);
            })
            .unwrap(),
        );

        let feed = |edge| {
            let debouncer = Arc::clone(&debouncer);
            let (done_tx, done_rx) = std::sync::mpsc::channel();
            thread::spawn(move || {
                debouncer.feed(edge);
                let _ = done_tx.send(());
            });
            done_rx
        };

        let press = feed(Edge::Pressed);
        assert_eq!(rx.recv().unwrap(), Edge::Pressed);
        press.recv().unwrap();

        // The timer thread is now stuck handing over the release.
        debouncer.feed(Edge::Released);
        thread::sleep(Duration::from_millis(30));

        let second_press = feed(Edge::Pressed);
        assert!(second_press.recv_timeout(Duration::from_secs(1)).is_ok());

        assert_eq!(rx.recv().unwrap(), Edge::Released);
        assert_eq!(rx.recv().unwrap(), Edge::Pressed);
    }

    #[test]
    fn test_reset_drops_pending_release() {
        let (debouncer, seen) = recording(30);
        debouncer.feed(Edge::Pressed);
        debouncer.feed(Edge::Released);
        debouncer.reset();
        thread::sleep(Duration::from_millis(80));

        assert_eq!(*seen.lock(), vec![Edge::Pressed]);
        assert_eq!(debouncer.state(), DebounceState::Released);
    }
}
