//! Passive buzzer playing queued tones.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use autogate_bridge::{Actuator, RequestQueue};
use autogate_core::config::BuzzerConfig;
use autogate_core::constants::{BUZZER_MAX_DURATION_MS, BUZZER_MIN_DURATION_MS};
use autogate_core::{Error, Result};
use tracing::warn;

use crate::traits::ToneOutput;
use crate::types::BuzzerPlayRequest;

/// Check a request against the playable range.
///
/// ```
/// use std::time::Duration;
/// use autogate_hardware::drivers::buzzer::validate_request;
/// use autogate_hardware::types::BuzzerPlayRequest;
///
/// let beep = BuzzerPlayRequest::new(440.0, Duration::from_millis(100));
/// assert!(validate_request(&beep, 110.0, 1760.0).is_ok());
///
/// let squeal = BuzzerPlayRequest::new(4000.0, Duration::from_millis(100));
/// assert!(validate_request(&squeal, 110.0, 1760.0).is_err());
/// ```
pub fn validate_request(request: &BuzzerPlayRequest, min_hz: f64, max_hz: f64) -> Result<()> {
    let frequency = request.frequency_hz;
    if !frequency.is_finite() || frequency < min_hz || frequency > max_hz {
        return Err(Error::invalid_argument(format!(
            "frequency {frequency} Hz outside {min_hz}..={max_hz} Hz"
        )));
    }

    let min = Duration::from_millis(BUZZER_MIN_DURATION_MS);
    let max = Duration::from_millis(BUZZER_MAX_DURATION_MS);
    if request.duration < min || request.duration > max {
        return Err(Error::invalid_argument(format!(
            "duration {:?} outside {:?}..={:?}",
            request.duration, min, max
        )));
    }
    Ok(())
}

struct ToneActuator {
    output: Box<dyn ToneOutput>,
}

impl ToneActuator {
    fn silence(&mut self) {
        if let Err(e) = self.output.stop() {
            warn!("Failed to silence buzzer: {}", e);
        }
    }
}

impl Actuator for ToneActuator {
    type Command = BuzzerPlayRequest;

    fn serve(&mut self, request: BuzzerPlayRequest, _has_more: bool) -> Result<()> {
        self.output.play(request.frequency_hz)?;
        thread::sleep(request.duration);
        Ok(())
    }

    // Back-to-back tones play without a gap; silence only once idle.
    fn settle(&mut self) {
        self.silence();
    }

    fn release(&mut self) {
        self.silence();
    }
}

/// Buzzer with a bounded queue of tones.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct Buzzer {
    queue: Arc<RequestQueue<BuzzerPlayRequest>>,
    min_frequency_hz: f64,
    max_frequency_hz: f64,
}

impl Buzzer {
    pub fn new(output: impl ToneOutput + 'static, config: &BuzzerConfig) -> Result<Self> {
        let (min, max) = (config.min_frequency_hz, config.max_frequency_hz);
        let queue = RequestQueue::builder("buzzer")
            .capacity(config.queue_size)
            .validator(move |request| validate_request(request, min, max))
            .spawn(ToneActuator {
                output: Box::new(output),
            })?;

        Ok(Self {
            queue: Arc::new(queue),
            min_frequency_hz: min,
            max_frequency_hz: max,
        })
    }

    /// Queue a tone.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an unplayable tone, `QueueFull` if `blocking` is
    /// false and the queue is full, `Closed` after [`close`](Self::close).
    pub fn play(&self, request: BuzzerPlayRequest, blocking: bool) -> Result<()> {
        self.queue.schedule(request, blocking)
    }

    pub async fn play_async(&self, request: BuzzerPlayRequest, blocking: bool) -> Result<()> {
        self.queue.schedule_async(request, blocking).await
    }

    /// Wait until every queued tone has played.
    pub fn drain(&self) {
        self.queue.drain();
    }

    pub async fn drain_async(&self) -> Result<()> {
        self.queue.drain_async().await
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }

    pub fn min_frequency_hz(&self) -> f64 {
        self.min_frequency_hz
    }

    pub fn max_frequency_hz(&self) -> f64 {
        self.max_frequency_hz
    }

    /// Drop pending tones, stop the current one and silence the buzzer.
    pub fn close(&self) -> Result<()> {
        self.queue.close()
    }
}
