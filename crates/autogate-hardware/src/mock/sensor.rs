//! Mock ultrasonic range finder.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{HardwareError, Result};
use crate::traits::RangeFinder;

#[derive(Debug)]
struct Echo {
    distance_cm: Option<f64>,
    failing: u32,
    measurements: usize,
}

/// Range finder returning whatever distance its handle last set.
#[derive(Debug)]
pub struct MockRangeFinder {
    echo: Arc<Mutex<Echo>>,
}

impl MockRangeFinder {
    pub fn new(distance_cm: f64) -> (Self, MockRangeFinderHandle) {
        let echo = Arc::new(Mutex::new(Echo {
            distance_cm: Some(distance_cm),
            failing: 0,
            measurements: 0,
        }));
        (
            Self {
                echo: Arc::clone(&echo),
            },
            MockRangeFinderHandle { echo },
        )
    }
}

impl RangeFinder for MockRangeFinder {
    fn measure_cm(&mut self) -> Result<Option<f64>> {
        let mut echo = self.echo.lock();
        echo.measurements += 1;
        if echo.failing > 0 {
            echo.failing -= 1;
            return Err(HardwareError::invalid_data("echo pulse too short"));
        }
        Ok(echo.distance_cm)
    }
}

#[derive(Debug, Clone)]
pub struct MockRangeFinderHandle {
    echo: Arc<Mutex<Echo>>,
}

impl MockRangeFinderHandle {
    pub fn set_distance(&self, distance_cm: f64) {
        self.echo.lock().distance_cm = Some(distance_cm);
    }

    /// Nothing in range: measurements time out.
    pub fn clear(&self) {
        self.echo.lock().distance_cm = None;
    }

    pub fn fail_measurements(&self, count: u32) {
        self.echo.lock().failing = count;
    }

    pub fn measurements(&self) -> usize {
        self.echo.lock().measurements
    }
}
