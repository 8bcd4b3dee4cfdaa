//! Peripheral drivers.
//!
//! Sensors (`button`, `ultrasonic`, `rfid`) feed an
//! [`EventGenerator`](autogate_bridge::EventGenerator); actuators (`buzzer`,
//! `gate`) are fed by a [`RequestQueue`](autogate_bridge::RequestQueue);
//! `screen` and `status_lights` serialize writes behind a lock.

pub mod button;
pub mod buzzer;
pub mod gate;
pub mod rfid;
pub mod screen;
pub mod status_lights;
pub mod ultrasonic;

pub use button::Button;
pub use buzzer::Buzzer;
pub use gate::Gate;
pub use rfid::Rfid;
pub use screen::Screen;
pub use status_lights::StatusLights;
pub use ultrasonic::Ultrasonic;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use autogate_bridge::{EventGenerator, EventSource};
use autogate_core::Result;
use autogate_core::config::GeneratorConfig;
use parking_lot::{Condvar, Mutex};
use tracing::warn;

pub(crate) fn event_generator<S: EventSource>(
    name: &str,
    source: S,
    config: &GeneratorConfig,
) -> EventGenerator<S> {
    EventGenerator::builder(name, source)
        .capacity(config.channel_capacity)
        .close_timeout(config.close_timeout())
        .build()
}

/// Stop flag a polling thread can sleep on.
#[derive(Debug, Default)]
pub(crate) struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub(crate) fn stop(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleep for `duration` unless stopped first. Returns whether stopped.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.wake.wait_while_for(&mut stopped, |stopped| !*stopped, duration);
        }
        *stopped
    }
}

/// A polling thread owned by an event source between setup and cleanup.
#[derive(Debug)]
pub(crate) struct Poller {
    name: String,
    stop: Arc<StopSignal>,
    thread: JoinHandle<()>,
}

impl Poller {
    pub(crate) fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(&StopSignal) + Send + 'static,
    {
        let stop = Arc::new(StopSignal::default());
        let thread = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name(name.to_string())
                .spawn(move || body(&stop))?
        };
        Ok(Self {
            name: name.to_string(),
            stop,
            thread,
        })
    }

    /// Signal the thread and wait for it to exit.
    pub(crate) fn stop(self) {
        self.stop.stop();
        if self.thread.join().is_err() {
            warn!(poller = %self.name, "Polling thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_stop_wakes_sleeper() {
        let poller = Poller::spawn("test-poller", |stop| {
            while !stop.sleep(Duration::from_secs(10)) {}
        })
        .unwrap();

        let started = Instant::now();
        poller.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_sleep_runs_full_duration_when_not_stopped() {
        let signal = StopSignal::default();
        let started = Instant::now();
        assert!(!signal.sleep(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(15));
        assert!(!signal.is_stopped());
    }
}
