//! Ultrasonic distance sensor sampled at a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use autogate_bridge::{
    AsyncEventStream, EventGenerator, EventSink, EventSource, EventStream, GeneratorState,
};
use autogate_core::Result;
use autogate_core::config::{GeneratorConfig, UltrasonicConfig};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{Poller, event_generator};
use crate::traits::RangeFinder;

type SharedSensor = Arc<Mutex<Box<dyn RangeFinder>>>;

/// Normalize a raw reading: no echo counts as `max_cm`, readings are capped
/// at `max_cm` and rounded to millimetres.
///
/// ```
/// use autogate_hardware::drivers::ultrasonic::normalize_cm;
///
/// assert_eq!(normalize_cm(Some(12.34567), 300.0), 12.346);
/// assert_eq!(normalize_cm(Some(512.0), 300.0), 300.0);
/// assert_eq!(normalize_cm(None, 300.0), 300.0);
/// ```
pub fn normalize_cm(reading: Option<f64>, max_cm: f64) -> f64 {
    let cm = reading.map_or(max_cm, |cm| cm.clamp(0.0, max_cm));
    (cm * 1000.0).round() / 1000.0
}

fn sample(sensor: &Mutex<Box<dyn RangeFinder>>, max_cm: f64) -> crate::error::Result<f64> {
    let reading = sensor.lock().measure_cm()?;
    Ok(normalize_cm(reading, max_cm))
}

/// Event source emitting one distance, in cm, per sample interval.
pub struct UltrasonicSource {
    sensor: SharedSensor,
    interval: Duration,
    max_cm: f64,
    poller: Option<Poller>,
}

impl UltrasonicSource {
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl EventSource for UltrasonicSource {
    type Event = f64;

    fn setup(&mut self, sink: EventSink<f64>) -> Result<()> {
        let sensor = Arc::clone(&self.sensor);
        let interval = self.interval;
        let max_cm = self.max_cm;

        let poller = Poller::spawn("ultrasonic-sampler", move |stop| {
            while !stop.is_stopped() {
                match sample(&sensor, max_cm) {
                    Ok(cm) => {
                        if sink.emit(cm).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Distance measurement failed: {}", e),
                }
                if stop.sleep(interval) {
                    break;
                }
            }
        })?;

        self.poller = Some(poller);
        debug!(interval_ms = interval.as_millis() as u64, "Ultrasonic sampling started");
        Ok(())
    }

    fn cleanup(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        debug!("Ultrasonic sampling stopped");
    }
}

/// HC-SR04 style range finder.
#[derive(Clone)]
pub struct Ultrasonic {
    generator: EventGenerator<UltrasonicSource>,
    sensor: SharedSensor,
    max_cm: f64,
}

impl Ultrasonic {
    pub fn new(
        sensor: impl RangeFinder + 'static,
        config: &UltrasonicConfig,
        generator: &GeneratorConfig,
    ) -> Self {
        let sensor: SharedSensor = Arc::new(Mutex::new(Box::new(sensor)));
        let source = UltrasonicSource {
            sensor: Arc::clone(&sensor),
            interval: config.sample_interval(),
            max_cm: config.max_distance_cm,
            poller: None,
        };
        Self {
            generator: event_generator("ultrasonic", source, generator),
            sensor,
            max_cm: config.max_distance_cm,
        }
    }

    /// Take one measurement outside of any stream.
    pub fn distance_cm(&self) -> Result<f64> {
        Ok(sample(&self.sensor, self.max_cm)?)
    }

    /// Start receiving distances, preempting any current consumer.
    pub fn attach(&self) -> Result<EventStream<UltrasonicSource>> {
        self.generator.attach()
    }

    pub async fn attach_async(&self) -> Result<AsyncEventStream<f64>> {
        self.generator.attach_async().await
    }

    pub fn sample_interval(&self) -> Duration {
        self.generator.with_source(|source| source.interval())
    }

    /// Change the sampling interval.
    ///
    /// A different interval ends the current stream; the next attach samples
    /// at the new rate.
    pub fn set_sample_interval(&self, interval: Duration) {
        if self.sample_interval() == interval {
            return;
        }
        self.generator.close();
        self.generator.with_source(|source| source.interval = interval);
        debug!(interval_ms = interval.as_millis() as u64, "Sample interval changed");
    }

    pub fn state(&self) -> GeneratorState {
        self.generator.state()
    }

    pub fn close(&self) {
        self.generator.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockRangeFinder, MockRangeFinderHandle};
    use rstest::rstest;

    fn ultrasonic(interval_ms: u64) -> (Ultrasonic, MockRangeFinderHandle) {
        let (sensor, handle) = MockRangeFinder::new(42.0);
        let config = UltrasonicConfig {
            sample_interval_ms: interval_ms,
            max_distance_cm: 300.0,
        };
        let generator = GeneratorConfig {
            channel_capacity: 1,
            close_timeout_ms: 200,
        };
        (Ultrasonic::new(sensor, &config, &generator), handle)
    }

    #[rstest]
    #[case(Some(0.0), 0.0)]
    #[case(Some(-3.0), 0.0)]
    #[case(Some(299.9994), 299.999)]
    #[case(Some(300.5), 300.0)]
    #[case(None, 300.0)]
    fn test_normalize(#[case] reading: Option<f64>, #[case] expected: f64) {
        assert_eq!(normalize_cm(reading, 300.0), expected);
    }

    #[test]
    fn test_stream_samples_sensor() {
        let (ultrasonic, handle) = ultrasonic(5);
        let mut stream = ultrasonic.attach().unwrap();

        assert_eq!(stream.next(), Some(42.0));
        handle.clear();
        assert!(stream.by_ref().take(5).any(|cm| cm == 300.0));
    }

    #[test]
    fn test_failed_measurement_is_skipped() {
        let (ultrasonic, handle) = ultrasonic(5);
        handle.fail_measurements(2);

        let mut stream = ultrasonic.attach().unwrap();
        assert_eq!(stream.next(), Some(42.0));
        assert!(handle.measurements() >= 3);
    }

    #[test]
    fn test_set_sample_interval_ends_stream() {
        let (ultrasonic, _handle) = ultrasonic(5);
        let stream = ultrasonic.attach().unwrap();

        let closer = {
            let ultrasonic = ultrasonic.clone();
            std::thread::spawn(move || ultrasonic.set_sample_interval(Duration::from_millis(20)))
        };
        assert!(stream.count() < 1_000);
        closer.join().unwrap();

        assert_eq!(ultrasonic.sample_interval(), Duration::from_millis(20));
        assert_eq!(ultrasonic.state(), GeneratorState::Idle);
    }

    #[test]
    fn test_set_sample_interval_from_consumer_thread() {
        let (sensor, _handle) = MockRangeFinder::new(42.0);
        let generator = GeneratorConfig {
            channel_capacity: 1,
            close_timeout_ms: 5_000,
        };
        let config = UltrasonicConfig {
            sample_interval_ms: 5,
            max_distance_cm: 300.0,
        };
        let ultrasonic = Ultrasonic::new(sensor, &config, &generator);
        let mut stream = ultrasonic.attach().unwrap();
        assert_eq!(stream.next(), Some(42.0));

        let started = std::time::Instant::now();
        ultrasonic.set_sample_interval(Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_secs(1));

        assert_eq!(ultrasonic.state(), GeneratorState::Idle);
        assert_eq!(stream.next(), None);
    }

    #[test]
    fn test_same_interval_keeps_stream() {
        let (ultrasonic, _handle) = ultrasonic(5);
        let _stream = ultrasonic.attach().unwrap();

        ultrasonic.set_sample_interval(Duration::from_millis(5));
        assert_eq!(ultrasonic.state(), GeneratorState::Active);
    }

    #[test]
    fn test_one_shot_distance() {
        let (ultrasonic, handle) = ultrasonic(1_000);
        handle.set_distance(17.25);
        assert_eq!(ultrasonic.distance_cm().unwrap(), 17.25);
    }
}
