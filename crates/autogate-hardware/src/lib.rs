//! Peripherals of the autogate module.
//!
//! This crate turns the gate hardware (servo, buzzer, LCD, status LEDs, PN532
//! reader, ultrasonic sensor, collision button) into drivers built on the
//! `autogate-bridge` primitives.
//!
//! # Layers
//!
//! - [`traits`]: the seam to the physical buses. Every method is blocking and
//!   every trait is object-safe, so drivers hold `Box<dyn Trait>` and run the
//!   I/O on their own threads.
//! - [`drivers`]: sensors expose an exclusive event stream, actuators a
//!   bounded command queue, indicators a locked write.
//! - [`manager`]: [`Peripherals`] owns the drivers and shuts them down in
//!   order.
//! - [`mock`]: in-memory devices with handles for tests and the demo.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use autogate_core::AppConfig;
//! use autogate_hardware::mock::MockRig;
//! use autogate_hardware::types::{BuzzerPlayRequest, GateState};
//!
//! let mut config = AppConfig::default();
//! config.gate.ease_ms = 0;
//!
//! let (mut peripherals, rig) = MockRig::build(&config).unwrap();
//! let gate = peripherals.gate().unwrap();
//! gate.set_state(GateState::Open, true).unwrap();
//! gate.drain();
//! assert_eq!(gate.state(), GateState::Open);
//!
//! let buzzer = peripherals.buzzer().unwrap();
//! buzzer.play(BuzzerPlayRequest::new(440.0, Duration::from_millis(10)), true).unwrap();
//! buzzer.drain();
//! assert_eq!(rig.tone.played(), vec![440.0]);
//!
//! peripherals.shutdown().unwrap();
//! ```
//!
//! # Error Handling
//!
//! Device traits return [`HardwareError`]. Drivers convert it into
//! [`autogate_core::Error`], classifying bus glitches as transient so the
//! retry policies can reinitialize the device.

pub mod drivers;
pub mod error;
pub mod manager;
pub mod mock;
pub mod traits;
pub mod types;

pub use drivers::{Button, Buzzer, Gate, Rfid, Screen, StatusLights, Ultrasonic};
pub use error::{HardwareError, Result};
pub use manager::{PeripheralStats, Peripherals, PeripheralsBuilder};
pub use types::{BuzzerPlayRequest, ButtonEvent, CardScan, GateState, StatusLightState};
