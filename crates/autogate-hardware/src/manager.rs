//! Peripheral lifecycle owner.
//!
//! [`Peripherals`] holds every driver of the gate module and tears them down
//! in a fixed order when the controller stops:
//!
//! ```text
//! 1. event sources    button, ultrasonic, rfid    (consumers see end of stream)
//! 2. actuators        gate, buzzer                (queues closed, hardware released)
//! 3. indicators       status lights, screen       (switched off)
//! ```
//!
//! Streams go first so no consumer reacts to a half torn down module, and
//! the RFID reader stops before the buzzer it beeps through.

use serde::Serialize;
use tracing::{error, info};

use autogate_bridge::GeneratorState;
use autogate_core::Result;

use crate::drivers::{Button, Buzzer, Gate, Rfid, Screen, StatusLights, Ultrasonic};
use crate::types::{GateState, StatusLightState};

/// Snapshot of the registered peripherals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeripheralStats {
    /// Generator state per event source, `None` if not registered.
    pub button: Option<String>,
    pub ultrasonic: Option<String>,
    pub rfid: Option<String>,

    pub gate: Option<GateState>,
    pub buzzer_idle: Option<bool>,
    pub status_lights: Option<StatusLightState>,
    pub screen_connected: bool,
    pub shut_down: bool,
}

/// Every driver of one gate module.
///
/// Dropping it shuts down whatever is still running.
#[derive(Default)]
pub struct Peripherals {
    button: Option<Button>,
    ultrasonic: Option<Ultrasonic>,
    rfid: Option<Rfid>,
    gate: Option<Gate>,
    buzzer: Option<Buzzer>,
    status_lights: Option<StatusLights>,
    screen: Option<Screen>,
    shut_down: bool,
}

impl Peripherals {
    pub fn builder() -> PeripheralsBuilder {
        PeripheralsBuilder::default()
    }

    pub fn button(&self) -> Option<&Button> {
        self.button.as_ref()
    }

    pub fn ultrasonic(&self) -> Option<&Ultrasonic> {
        self.ultrasonic.as_ref()
    }

    pub fn rfid(&self) -> Option<&Rfid> {
        self.rfid.as_ref()
    }

    pub fn gate(&self) -> Option<&Gate> {
        self.gate.as_ref()
    }

    pub fn buzzer(&self) -> Option<&Buzzer> {
        self.buzzer.as_ref()
    }

    pub fn status_lights(&self) -> Option<&StatusLights> {
        self.status_lights.as_ref()
    }

    pub fn screen(&self) -> Option<&Screen> {
        self.screen.as_ref()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn stats(&self) -> PeripheralStats {
        let generator = |state: GeneratorState| state.to_string();
        PeripheralStats {
            button: self.button.as_ref().map(|b| generator(b.state())),
            ultrasonic: self.ultrasonic.as_ref().map(|u| generator(u.state())),
            rfid: self.rfid.as_ref().map(|r| generator(r.state())),
            gate: self.gate.as_ref().map(Gate::state),
            buzzer_idle: self.buzzer.as_ref().map(Buzzer::is_idle),
            status_lights: self.status_lights.as_ref().and_then(StatusLights::state),
            screen_connected: self.screen.is_some(),
            shut_down: self.shut_down,
        }
    }

    /// Stop every peripheral in order.
    ///
    /// Keeps going past failures and returns the first one. Calling it
    /// again is a no-op.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        info!("Shutting down peripherals");

        if let Some(button) = self.button.take() {
            button.close();
        }
        if let Some(ultrasonic) = self.ultrasonic.take() {
            ultrasonic.close();
        }
        if let Some(rfid) = self.rfid.take() {
            rfid.close();
        }

        let mut first_error = None;
        let mut record = |device: &str, result: Result<()>| {
            if let Err(e) = result {
                error!(device, "Shutdown failed: {}", e);
                first_error.get_or_insert(e);
            }
        };

        if let Some(gate) = self.gate.take() {
            record("gate", gate.close());
        }
        if let Some(buzzer) = self.buzzer.take() {
            record("buzzer", buzzer.close());
        }
        if let Some(lights) = self.status_lights.take() {
            record("status lights", lights.close());
        }
        if let Some(screen) = self.screen.take() {
            record("screen", screen.close());
        }

        info!("Peripherals shut down");
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Peripherals {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Peripheral shutdown on drop failed: {}", e);
        }
    }
}

/// Builder for [`Peripherals`]. Every peripheral is optional.
#[derive(Default)]
pub struct PeripheralsBuilder {
    inner: Peripherals,
}

impl PeripheralsBuilder {
    pub fn button(mut self, button: Button) -> Self {
        self.inner.button = Some(button);
        self
    }

    pub fn ultrasonic(mut self, ultrasonic: Ultrasonic) -> Self {
        self.inner.ultrasonic = Some(ultrasonic);
        self
    }

    pub fn rfid(mut self, rfid: Rfid) -> Self {
        self.inner.rfid = Some(rfid);
        self
    }

    pub fn gate(mut self, gate: Gate) -> Self {
        self.inner.gate = Some(gate);
        self
    }

    pub fn buzzer(mut self, buzzer: Buzzer) -> Self {
        self.inner.buzzer = Some(buzzer);
        self
    }

    pub fn status_lights(mut self, status_lights: StatusLights) -> Self {
        self.inner.status_lights = Some(status_lights);
        self
    }

    pub fn screen(mut self, screen: Screen) -> Self {
        self.inner.screen = Some(screen);
        self
    }

    pub fn build(self) -> Peripherals {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockRig, MockServo, ToneCall};
    use autogate_core::AppConfig;
    use autogate_core::config::GateConfig;

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.gate.ease_ms = 0;
        config.generator.close_timeout_ms = 200;
        config.rfid.read_timeout_ms = 10;
        config
    }

    #[test]
    fn test_empty_peripherals_shut_down_cleanly() {
        let mut peripherals = Peripherals::builder().build();
        peripherals.shutdown().unwrap();
        assert!(peripherals.is_shut_down());
        assert!(peripherals.gate().is_none());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (mut peripherals, rig) = MockRig::build(&config()).unwrap();
        peripherals.shutdown().unwrap();
        peripherals.shutdown().unwrap();

        assert!(rig.servo.is_detached());
        assert!(rig.lcd.is_closed());
        assert_eq!(rig.leds.output(), Some(0xFF));
        assert!(rig.tone.is_silent());
    }

    #[test]
    fn test_shutdown_ends_open_streams() {
        let (mut peripherals, rig) = MockRig::build(&config()).unwrap();
        let button = peripherals.button().unwrap().clone();
        let consumer = std::thread::spawn(move || button.attach().unwrap().count());

        while !rig.button.is_installed() {
            std::thread::yield_now();
        }
        peripherals.shutdown().unwrap();

        assert_eq!(consumer.join().unwrap(), 0);
        assert!(!rig.button.is_installed());
    }

    #[test]
    fn test_stats() {
        let (peripherals, _rig) = MockRig::build(&config()).unwrap();
        let stats = peripherals.stats();

        assert_eq!(stats.button.as_deref(), Some("idle"));
        assert_eq!(stats.gate, Some(GateState::Close));
        assert_eq!(stats.status_lights, Some(StatusLightState::None));
        assert!(!stats.shut_down);
    }

    #[test]
    fn test_drop_shuts_down() {
        let (servo, handle) = MockServo::new(180.0);
        let gate = Gate::new(servo, &GateConfig::default()).unwrap();
        drop(Peripherals::builder().gate(gate).build());
        assert!(handle.is_detached());
    }

    #[test]
    fn test_scan_beeps() {
        let (peripherals, rig) = MockRig::build(&config()).unwrap();
        let mut scans = peripherals.rfid().unwrap().attach().unwrap();

        rig.reader.present(vec![0xca, 0xfe]);
        assert_eq!(scans.next().unwrap().uid, "cafe");

        // The beep is queued right after the scan is handed over.
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while !rig.tone.calls().contains(&ToneCall::Play(800.0)) {
            assert!(std::time::Instant::now() < deadline, "scan did not beep");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }
}
