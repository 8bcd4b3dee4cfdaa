//! Servo-driven gate.
//!
//! Moves are queued and executed one at a time by the queue worker, easing
//! the servo linearly towards the target over the configured duration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use autogate_bridge::{Actuator, RequestQueue};
use autogate_core::Result;
use autogate_core::config::GateConfig;
use autogate_core::constants::{SERVO_FREQUENCY_HZ, SERVO_MAX_ANGLE, SERVO_MIN_ANGLE};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::traits::ServoOutput;
use crate::types::GateState;

/// Intermediate positions written during an eased move of length `ease`.
///
/// Two steps per PWM period, at least one.
///
/// ```
/// use std::time::Duration;
/// use autogate_hardware::drivers::gate::ease_steps;
///
/// assert_eq!(ease_steps(Duration::from_millis(500)), 50);
/// assert_eq!(ease_steps(Duration::ZERO), 1);
/// ```
pub fn ease_steps(ease: Duration) -> u32 {
    (SERVO_FREQUENCY_HZ * ease.as_secs_f64() * 2.0).ceil().max(1.0) as u32
}

fn clamp_angle(angle: f64) -> f64 {
    angle.clamp(SERVO_MIN_ANGLE, SERVO_MAX_ANGLE)
}

struct ServoActuator {
    servo: Box<dyn ServoOutput>,
    open_angle: f64,
    close_angle: f64,
    offset: f64,
    ease: Duration,
    state: Arc<Mutex<GateState>>,
    abort: Arc<AtomicBool>,
}

impl ServoActuator {
    fn target(&self, state: GateState) -> f64 {
        let angle = match state {
            GateState::Open => self.open_angle,
            GateState::Close => self.close_angle,
        };
        clamp_angle(angle + self.offset)
    }

    /// Returns false if the move was aborted part way.
    fn ease_to(&mut self, target: f64) -> Result<bool> {
        let start = self.servo.angle();
        if target.round() == start.round() {
            return Ok(true);
        }

        let steps = ease_steps(self.ease);
        let delay = self.ease / steps;
        let increment = (target - start) / f64::from(steps);
        debug!(start, target, steps, "Easing servo");

        for step in 1..=steps {
            if self.abort.load(Ordering::Acquire) {
                debug!(angle = self.servo.angle(), "Servo move aborted");
                return Ok(false);
            }
            let angle = if step == steps {
                target
            } else {
                clamp_angle(start + increment * f64::from(step))
            };
            self.servo.set_angle(angle)?;
            thread::sleep(delay);
        }
        Ok(true)
    }
}

impl Actuator for ServoActuator {
    type Command = GateState;

    fn serve(&mut self, state: GateState, _has_more: bool) -> Result<()> {
        if self.ease_to(self.target(state))? {
            *self.state.lock() = state;
            info!(%state, "Gate moved");
        }
        Ok(())
    }

    // The servo keeps holding its last position.
    fn settle(&mut self) {}

    fn release(&mut self) {
        if let Err(e) = self.servo.detach() {
            warn!("Failed to detach servo: {}", e);
        }
    }
}

/// Gate opened and closed by a servo.
pub struct Gate {
    queue: RequestQueue<GateState>,
    state: Arc<Mutex<GateState>>,
    abort: Arc<AtomicBool>,
}

impl Gate {
    /// Take over the servo and close the gate before returning.
    pub fn new(servo: impl ServoOutput + 'static, config: &GateConfig) -> Result<Self> {
        let state = Arc::new(Mutex::new(GateState::Close));
        let abort = Arc::new(AtomicBool::new(false));
        let mut actuator = ServoActuator {
            servo: Box::new(servo),
            open_angle: config.open_angle,
            close_angle: config.close_angle,
            offset: config.angle_offset,
            ease: config.ease(),
            state: Arc::clone(&state),
            abort: Arc::clone(&abort),
        };
        actuator.serve(GateState::Close, false)?;

        let queue = RequestQueue::builder("gate")
            .capacity(config.queue_size)
            .spawn(actuator)?;

        Ok(Self { queue, state, abort })
    }

    /// Queue a move.
    ///
    /// # Errors
    ///
    /// `QueueFull` if `blocking` is false and the queue is full, `Closed`
    /// after [`close`](Self::close).
    pub fn set_state(&self, state: GateState, blocking: bool) -> Result<()> {
        self.queue.schedule(state, blocking)
    }

    pub async fn set_state_async(&self, state: GateState, blocking: bool) -> Result<()> {
        self.queue.schedule_async(state, blocking).await
    }

    /// Position of the last completed move.
    pub fn state(&self) -> GateState {
        *self.state.lock()
    }

    /// Wait until every queued move has completed.
    pub fn drain(&self) {
        self.queue.drain();
    }

    pub async fn drain_async(&self) -> Result<()> {
        self.queue.drain_async().await
    }

    /// Drop pending moves, stop the current one where it is and detach the
    /// servo.
    pub fn close(&self) -> Result<()> {
        self.abort.store(true, Ordering::Release);
        self.queue.close()
    }
}
