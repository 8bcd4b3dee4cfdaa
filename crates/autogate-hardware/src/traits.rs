//! Hardware device trait definitions.
//!
//! These traits are the seam between drivers and the physical peripherals
//! (GPIO, PWM, I2C). Drivers run their device I/O on dedicated threads, so
//! every method is blocking and every trait is object-safe: drivers hold
//! `Box<dyn Trait>` and tests plug in the implementations from
//! [`mock`](crate::mock).

use std::time::Duration;

use crate::error::Result;
use crate::types::{ButtonEvent, FirmwareVersion};

/// Callback invoked from the GPIO layer on every raw edge.
pub type EdgeCallback = Box<dyn Fn(ButtonEvent) + Send + Sync>;

/// Digital input that reports edges through a callback.
pub trait EdgeInput: Send {
    /// Route every raw edge to `callback`, replacing any previous one.
    fn install(&mut self, callback: EdgeCallback) -> Result<()>;

    /// Stop delivering edges. Once this returns the callback is no longer
    /// running and has been dropped.
    fn remove(&mut self);
}

/// Distance sensor such as an HC-SR04.
pub trait RangeFinder: Send {
    /// One measurement in centimetres, `None` if no echo arrived.
    fn measure_cm(&mut self) -> Result<Option<f64>>;
}

/// An initialized NFC reader session (PN532 over I2C).
pub trait CardReader: Send {
    fn firmware_version(&mut self) -> Result<FirmwareVersion>;

    /// Configure the secure access module for normal reading.
    fn sam_configuration(&mut self) -> Result<()>;

    /// Wait up to `timeout` for a card. `Ok(None)` if none showed up.
    fn read_passive_target(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// Opens [`CardReader`] sessions. Called again to reset a wedged reader.
pub trait CardReaderConnector: Send {
    fn connect(&mut self) -> Result<Box<dyn CardReader>>;
}

/// PWM tone generator driving a passive buzzer.
pub trait ToneOutput: Send {
    fn play(&mut self, frequency_hz: f64) -> Result<()>;

    fn stop(&mut self) -> Result<()>;
}

/// Hobby servo on a PWM channel.
pub trait ServoOutput: Send {
    fn set_angle(&mut self, degrees: f64) -> Result<()>;

    /// Last angle written.
    fn angle(&self) -> f64;

    /// Stop sending pulses.
    fn detach(&mut self) -> Result<()>;
}

/// Character LCD behind an I2C backpack.
pub trait LcdPanel: Send {
    fn clear(&mut self) -> Result<()>;

    fn write_line(&mut self, row: usize, text: &str) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 8-bit I2C port expander (PCF8574) driving LEDs.
pub trait LedExpander: Send {
    fn write_gpio(&mut self, value: u8) -> Result<()>;
}

/// Opens [`LedExpander`] handles. Called again to reset the bus.
pub trait LedExpanderConnector: Send {
    fn connect(&mut self, address: u8) -> Result<Box<dyn LedExpander>>;
}
