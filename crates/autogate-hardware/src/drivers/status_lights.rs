//! Status LED bank on a PCF8574 port expander.
//!
//! LEDs are wired active low: a cleared port bit lights its LED, and `0xFF`
//! turns the whole bank off. With the reverse layout LED 0 sits on pin 7.

use std::time::Duration;

use autogate_bridge::RetryPolicy;
use autogate_core::config::StatusLightsConfig;
use autogate_core::constants::{LED_RETRY_DELAY_MS, MAX_LED_COUNT};
use autogate_core::{Error, Result};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::traits::{LedExpander, LedExpanderConnector};
use crate::types::StatusLightState;

const ALL_OFF: u8 = 0xFF;

/// Port byte lighting the LEDs set in `pattern`.
///
/// ```
/// use autogate_hardware::drivers::status_lights::encode;
///
/// assert_eq!(encode(0b0000, true), 0xFF);
/// assert_eq!(encode(0b1000, false), 0b1111_0111);
/// assert_eq!(encode(0b1000, true), 0b1110_1111);
/// ```
pub fn encode(pattern: u8, reverse_layout: bool) -> u8 {
    let byte = !pattern;
    if reverse_layout { byte.reverse_bits() } else { byte }
}

struct Bank {
    connector: Box<dyn LedExpanderConnector>,
    expander: Box<dyn LedExpander>,
    address: u8,
    output: u8,
}

impl Bank {
    /// Open the expander and switch every LED off.
    fn open(
        connector: &mut dyn LedExpanderConnector,
        address: u8,
    ) -> crate::error::Result<Box<dyn LedExpander>> {
        let mut expander = connector.connect(address)?;
        expander.write_gpio(ALL_OFF)?;
        Ok(expander)
    }

    fn reinit(&mut self) -> crate::error::Result<()> {
        self.expander = Self::open(self.connector.as_mut(), self.address)?;
        self.output = ALL_OFF;
        debug!(address = self.address, "LED expander reinitialized");
        Ok(())
    }

    fn write(&mut self, byte: u8) -> crate::error::Result<()> {
        self.expander.write_gpio(byte)?;
        self.output = byte;
        Ok(())
    }
}

/// Ready/processing/allow/deny indicator.
pub struct StatusLights {
    bank: Mutex<Bank>,
    state: Mutex<Option<StatusLightState>>,
    led_count: u8,
    reverse_layout: bool,
    policy: RetryPolicy,
}

impl StatusLights {
    /// Open the expander and switch every LED off.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a LED count outside 1..=8,
    /// `FatalDeviceFault` if the expander never answered.
    pub fn new(
        connector: impl LedExpanderConnector + 'static,
        config: &StatusLightsConfig,
    ) -> Result<Self> {
        if !(1..=MAX_LED_COUNT).contains(&config.led_count) {
            return Err(Error::invalid_argument(format!(
                "led_count must be within 1..={MAX_LED_COUNT}, got {}",
                config.led_count
            )));
        }

        let policy = RetryPolicy::fixed(
            "status lights",
            config.write_attempts,
            Duration::from_millis(LED_RETRY_DELAY_MS),
        );
        let mut connector: Box<dyn LedExpanderConnector> = Box::new(connector);
        let expander = policy.retry(|| Bank::open(connector.as_mut(), config.address))?;
        info!(address = config.address, leds = config.led_count, "Status lights ready");

        Ok(Self {
            bank: Mutex::new(Bank {
                connector,
                expander,
                address: config.address,
                output: ALL_OFF,
            }),
            state: Mutex::new(Some(StatusLightState::None)),
            led_count: config.led_count,
            reverse_layout: config.reverse_layout,
            policy,
        })
    }

    /// Highest pattern the wired LEDs can show.
    pub fn max_pattern(&self) -> u8 {
        ((1u16 << self.led_count) - 1) as u8
    }

    pub fn set_state(&self, state: StatusLightState) -> Result<()> {
        let mut current = self.state.lock();
        self.set_pattern(state.pattern())?;
        *current = Some(state);
        debug!(%state, "Status lights updated");
        Ok(())
    }

    /// Last state set, `None` after individual LEDs were changed.
    pub fn state(&self) -> Option<StatusLightState> {
        *self.state.lock()
    }

    /// Light exactly the LEDs in `pattern`, bit 0 being LED 0.
    pub fn set_pattern(&self, pattern: u8) -> Result<()> {
        if pattern > self.max_pattern() {
            return Err(Error::invalid_argument(format!(
                "pattern {pattern:#06b} exceeds {:#06b}",
                self.max_pattern()
            )));
        }
        self.write(encode(pattern, self.reverse_layout))
    }

    /// Switch one LED, leaving the others as they are.
    pub fn set_led(&self, led: u8, on: bool) -> Result<()> {
        if led >= self.led_count {
            return Err(Error::invalid_argument(format!(
                "led must be below {}, got {led}",
                self.led_count
            )));
        }
        let pin = if self.reverse_layout { 7 - led } else { led };

        let mut state = self.state.lock();
        let mut bank = self.bank.lock();
        let mut byte = bank.output;
        if on {
            byte &= !(1 << pin);
        } else {
            byte |= 1 << pin;
        }
        self.policy.retry_with_reinit(&mut *bank, |bank| bank.write(byte), Bank::reinit)?;
        *state = None;
        Ok(())
    }

    /// Raw byte currently on the port.
    pub fn output(&self) -> u8 {
        self.bank.lock().output
    }

    /// Switch every LED off.
    pub fn close(&self) -> Result<()> {
        self.write(ALL_OFF)?;
        *self.state.lock() = Some(StatusLightState::None);
        Ok(())
    }

    fn write(&self, byte: u8) -> Result<()> {
        let mut bank = self.bank.lock();
        self.policy.retry_with_reinit(&mut *bank, |bank| bank.write(byte), Bank::reinit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockLedConnector, MockLedHandle};
    use rstest::rstest;

    fn lights(reverse_layout: bool) -> (StatusLights, MockLedHandle) {
        let (connector, handle) = MockLedConnector::new();
        let config = StatusLightsConfig {
            reverse_layout,
            ..StatusLightsConfig::default()
        };
        (StatusLights::new(connector, &config).unwrap(), handle)
    }

    #[rstest]
    #[case(StatusLightState::None, 0xFF)]
    #[case(StatusLightState::Ready, 0b1110_1111)]
    #[case(StatusLightState::Processing, 0b1101_1111)]
    #[case(StatusLightState::Allow, 0b1011_1111)]
    #[case(StatusLightState::Deny, 0b0111_1111)]
    fn test_state_bytes_reverse_layout(#[case] state: StatusLightState, #[case] byte: u8) {
        let (lights, handle) = lights(true);
        lights.set_state(state).unwrap();
        assert_eq!(handle.output(), Some(byte));
        assert_eq!(lights.state(), Some(state));
    }

    #[test]
    fn test_init_turns_everything_off() {
        let (_lights, handle) = lights(true);
        assert_eq!(handle.writes(), vec![0xFF]);
    }

    #[test]
    fn test_pattern_out_of_range() {
        let (lights, handle) = lights(false);
        let err = lights.set_pattern(0b1_0000).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(handle.writes().len(), 1);
    }

    #[test]
    fn test_led_count_validated() {
        let (connector, _handle) = MockLedConnector::new();
        let config = StatusLightsConfig {
            led_count: 9,
            ..StatusLightsConfig::default()
        };
        assert!(matches!(
            StatusLights::new(connector, &config),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_bus_error_reinitializes() {
        let (lights, handle) = lights(false);
        handle.fail_writes(1);

        lights.set_state(StatusLightState::Allow).unwrap();
        assert_eq!(handle.output(), Some(encode(0b0010, false)));
        assert_eq!(handle.connects(), 2);
    }

    #[test]
    fn test_persistent_bus_error_gives_up() {
        let (lights, handle) = lights(false);
        handle.fail_writes(100);

        let err = lights.set_state(StatusLightState::Deny).unwrap_err();
        assert!(matches!(err, Error::FatalDeviceFault { attempts: 5, .. }));
        assert_eq!(lights.state(), Some(StatusLightState::None));
    }

    #[test]
    fn test_single_led() {
        let (lights, handle) = lights(false);
        lights.set_led(0, true).unwrap();
        lights.set_led(3, true).unwrap();
        assert_eq!(handle.output(), Some(0b1111_0110));

        lights.set_led(0, false).unwrap();
        assert_eq!(handle.output(), Some(0b1111_0111));
        assert_eq!(lights.state(), None);
        assert!(lights.set_led(4, true).is_err());
    }

    #[test]
    fn test_close_turns_everything_off() {
        let (lights, handle) = lights(true);
        lights.set_state(StatusLightState::Deny).unwrap();
        lights.close().unwrap();
        assert_eq!(handle.output(), Some(0xFF));
    }
}
