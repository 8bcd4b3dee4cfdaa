//! Mock PWM actuators: buzzer tone output and servo.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{HardwareError, Result};
use crate::traits::{ServoOutput, ToneOutput};

/// What a [`MockTone`] was told to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToneCall {
    Play(f64),
    Stop,
}

#[derive(Debug, Default)]
struct ToneState {
    calls: Vec<ToneCall>,
    failing: u32,
}

/// Tone output that records every call.
#[derive(Debug)]
pub struct MockTone {
    state: Arc<Mutex<ToneState>>,
}

impl MockTone {
    pub fn new() -> (Self, MockToneHandle) {
        let state = Arc::new(Mutex::new(ToneState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockToneHandle { state },
        )
    }
}

impl ToneOutput for MockTone {
    fn play(&mut self, frequency_hz: f64) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing > 0 {
            state.failing -= 1;
            return Err(HardwareError::Io(std::io::Error::other("PWM write failed")));
        }
        state.calls.push(ToneCall::Play(frequency_hz));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.state.lock().calls.push(ToneCall::Stop);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MockToneHandle {
    state: Arc<Mutex<ToneState>>,
}

impl MockToneHandle {
    pub fn calls(&self) -> Vec<ToneCall> {
        self.state.lock().calls.clone()
    }

    /// Frequencies played, in order.
    pub fn played(&self) -> Vec<f64> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ToneCall::Play(f) => Some(*f),
                ToneCall::Stop => None,
            })
            .collect()
    }

    /// Whether the last call left the buzzer silent.
    pub fn is_silent(&self) -> bool {
        !matches!(self.state.lock().calls.last(), Some(ToneCall::Play(_)))
    }

    pub fn fail_plays(&self, count: u32) {
        self.state.lock().failing = count;
    }
}

#[derive(Debug)]
struct ServoState {
    angle: f64,
    history: Vec<f64>,
    detached: bool,
}

/// Servo that records every angle written.
#[derive(Debug)]
pub struct MockServo {
    state: Arc<Mutex<ServoState>>,
}

impl MockServo {
    pub fn new(initial_angle: f64) -> (Self, MockServoHandle) {
        let state = Arc::new(Mutex::new(ServoState {
            angle: initial_angle,
            history: Vec::new(),
            detached: false,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockServoHandle { state },
        )
    }
}

impl ServoOutput for MockServo {
    fn set_angle(&mut self, degrees: f64) -> Result<()> {
        let mut state = self.state.lock();
        state.angle = degrees;
        state.history.push(degrees);
        state.detached = false;
        Ok(())
    }

    fn angle(&self) -> f64 {
        self.state.lock().angle
    }

    fn detach(&mut self) -> Result<()> {
        self.state.lock().detached = true;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MockServoHandle {
    state: Arc<Mutex<ServoState>>,
}

impl MockServoHandle {
    pub fn angle(&self) -> f64 {
        self.state.lock().angle
    }

    pub fn history(&self) -> Vec<f64> {
        self.state.lock().history.clone()
    }

    pub fn is_detached(&self) -> bool {
        self.state.lock().detached
    }
}
