//! In-memory peripherals for tests, benches and the demo binary.
//!
//! Every mock comes with a handle that drives the simulated hardware (press
//! the button, present a card, inject bus faults) and inspects what the
//! driver did to it.
//!
//! [`MockRig::build`] wires a complete set into [`Peripherals`]:
//!
//! ```
//! use autogate_core::AppConfig;
//! use autogate_hardware::mock::MockRig;
//! use autogate_hardware::types::GateState;
//!
//! let mut config = AppConfig::default();
//! config.gate.ease_ms = 0;
//!
//! let (mut peripherals, rig) = MockRig::build(&config).unwrap();
//! assert_eq!(peripherals.gate().unwrap().state(), GateState::Close);
//! assert_eq!(rig.servo.angle(), 180.0);
//!
//! peripherals.shutdown().unwrap();
//! assert!(rig.servo.is_detached());
//! ```

pub mod actuators;
pub mod button;
pub mod panel;
pub mod rfid;
pub mod sensor;

pub use actuators::{MockServo, MockServoHandle, MockTone, MockToneHandle, ToneCall};
pub use button::{MockButton, MockButtonHandle};
pub use panel::{MockLcd, MockLcdHandle, MockLedConnector, MockLedExpander, MockLedHandle};
pub use rfid::{MockPn532, MockPn532Connector, MockPn532Handle};
pub use sensor::{MockRangeFinder, MockRangeFinderHandle};

use autogate_core::{AppConfig, Result};

use crate::drivers::{Button, Buzzer, Gate, Rfid, Screen, StatusLights, Ultrasonic};
use crate::manager::Peripherals;

/// Handles to every mock behind a [`Peripherals`] built by [`MockRig::build`].
#[derive(Clone)]
pub struct MockRig {
    pub button: MockButtonHandle,
    pub range_finder: MockRangeFinderHandle,
    pub reader: MockPn532Handle,
    pub tone: MockToneHandle,
    pub servo: MockServoHandle,
    pub lcd: MockLcdHandle,
    pub leds: MockLedHandle,
}

impl MockRig {
    /// Build every driver on top of fresh mocks.
    ///
    /// The servo starts at the open angle so construction performs a real
    /// closing move. The RFID reader beeps through the buzzer.
    pub fn build(config: &AppConfig) -> Result<(Peripherals, Self)> {
        let (input, button) = MockButton::new();
        let (sensor, range_finder) = MockRangeFinder::new(config.ultrasonic.max_distance_cm);
        let (connector, reader) = MockPn532Connector::new();
        let (output, tone) = MockTone::new();
        let (motor, servo) = MockServo::new(config.gate.open_angle);
        let (panel, lcd) = MockLcd::new(config.screen.rows, config.screen.columns);
        let (expander, leds) = MockLedConnector::new();

        let buzzer = Buzzer::new(output, &config.buzzer)?;
        let peripherals = Peripherals::builder()
            .button(Button::new(input, &config.button, &config.generator))
            .ultrasonic(Ultrasonic::new(sensor, &config.ultrasonic, &config.generator))
            .rfid(Rfid::new(
                connector,
                &config.rfid,
                &config.generator,
                Some(buzzer.clone()),
            )?)
            .gate(Gate::new(motor, &config.gate)?)
            .buzzer(buzzer)
            .status_lights(StatusLights::new(expander, &config.status_lights)?)
            .screen(Screen::new(panel, &config.screen))
            .build();

        Ok((
            peripherals,
            Self {
                button,
                range_finder,
                reader,
                tone,
                servo,
                lcd,
                leds,
            },
        ))
    }
}
