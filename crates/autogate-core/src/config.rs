//! Runtime configuration.
//!
//! Configuration is resolved in three layers, later layers winning:
//!
//! 1. compiled-in defaults from [`crate::constants`],
//! 2. an optional JSON file ([`AppConfig::from_json_file`]),
//! 3. environment variables ([`AppConfig::apply_env`]).
//!
//! Every section derives `Default` and is `#[serde(default)]`, so a file only
//! needs to mention the values it changes:
//!
//! ```
//! use autogate_core::config::AppConfig;
//!
//! let config = AppConfig::from_json_str(r#"{ "gate": { "open_angle": 80.0 } }"#).unwrap();
//! assert_eq!(config.gate.open_angle, 80.0);
//! assert_eq!(config.gate.close_angle, 180.0);
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::*;
use crate::error::{Error, Result};

/// Top-level configuration of the gate controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub generator: GeneratorConfig,
    pub gate: GateConfig,
    pub buzzer: BuzzerConfig,
    pub button: ButtonConfig,
    pub ultrasonic: UltrasonicConfig,
    pub rfid: RfidConfig,
    pub status_lights: StatusLightsConfig,
    pub screen: ScreenConfig,
}

/// Settings shared by every event generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Channel capacity; `0` makes every hand-off a rendezvous.
    pub channel_capacity: usize,

    /// Bound on waiting for a previous consumer to release the hardware.
    pub close_timeout_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            close_timeout_ms: DEFAULT_CLOSE_TIMEOUT_MS,
        }
    }
}

impl GeneratorConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub open_angle: f64,
    pub close_angle: f64,
    pub angle_offset: f64,
    pub ease_ms: u64,
    pub queue_size: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            open_angle: DEFAULT_GATE_OPEN_ANGLE,
            close_angle: DEFAULT_GATE_CLOSE_ANGLE,
            angle_offset: DEFAULT_GATE_ANGLE_OFFSET,
            ease_ms: DEFAULT_GATE_EASE_MS,
            queue_size: DEFAULT_REQUEST_QUEUE_SIZE,
        }
    }
}

impl GateConfig {
    pub fn ease(&self) -> Duration {
        Duration::from_millis(self.ease_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuzzerConfig {
    pub queue_size: usize,
    pub min_frequency_hz: f64,
    pub max_frequency_hz: f64,
}

impl Default for BuzzerConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_REQUEST_QUEUE_SIZE,
            min_frequency_hz: BUZZER_MIN_FREQUENCY_HZ,
            max_frequency_hz: BUZZER_MAX_FREQUENCY_HZ,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    pub debounce_us: u64,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            debounce_us: DEFAULT_DEBOUNCE_US,
        }
    }
}

impl ButtonConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_micros(self.debounce_us)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UltrasonicConfig {
    pub sample_interval_ms: u64,
    pub max_distance_cm: f64,
}

impl Default for UltrasonicConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            max_distance_cm: MAX_DISTANCE_CM,
        }
    }
}

impl UltrasonicConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RfidConfig {
    pub init_attempts: u32,
    pub read_attempts: u32,
    pub retry_delay_ms: u64,
    pub read_timeout_ms: u64,
    pub rescan_window_ms: u64,
    pub beep_frequency_hz: f64,
    pub beep_ms: u64,
}

impl Default for RfidConfig {
    fn default() -> Self {
        Self {
            init_attempts: DEFAULT_RFID_INIT_ATTEMPTS,
            read_attempts: DEFAULT_RFID_READ_ATTEMPTS,
            retry_delay_ms: DEFAULT_RFID_RETRY_DELAY_MS,
            read_timeout_ms: DEFAULT_RFID_READ_TIMEOUT_MS,
            rescan_window_ms: DEFAULT_RFID_RESCAN_WINDOW_MS,
            beep_frequency_hz: DEFAULT_RFID_BEEP_FREQUENCY_HZ,
            beep_ms: DEFAULT_RFID_BEEP_MS,
        }
    }
}

impl RfidConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn rescan_window(&self) -> Duration {
        Duration::from_millis(self.rescan_window_ms)
    }

    pub fn beep(&self) -> Duration {
        Duration::from_millis(self.beep_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusLightsConfig {
    pub led_count: u8,
    pub reverse_layout: bool,
    pub address: u8,
    pub write_attempts: u32,
}

impl Default for StatusLightsConfig {
    fn default() -> Self {
        Self {
            led_count: DEFAULT_LED_COUNT,
            reverse_layout: true,
            address: DEFAULT_LED_ADDRESS,
            write_attempts: DEFAULT_LED_WRITE_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub rows: usize,
    pub columns: usize,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_SCREEN_ROWS,
            columns: DEFAULT_SCREEN_COLUMNS,
        }
    }
}

impl AppConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("invalid configuration document: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(std::env::vars())?;
        Ok(config)
    }

    /// Apply overrides from `(name, value)` pairs.
    ///
    /// Recognized names are `GATE_OPEN_ANGLE`, `GATE_CLOSE_ANGLE`,
    /// `GATE_ANGLE_OFFSET` and the `AUTOGATE_*` family listed in the match
    /// below. Unknown names are ignored; unparsable values are an error.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned()))
            .collect();

        for (name, value) in &vars {
            match name.as_str() {
                "GATE_OPEN_ANGLE" => self.gate.open_angle = parse_var(name, value)?,
                "GATE_CLOSE_ANGLE" => self.gate.close_angle = parse_var(name, value)?,
                "GATE_ANGLE_OFFSET" => self.gate.angle_offset = parse_var(name, value)?,
                "AUTOGATE_GATE_EASE_MS" => self.gate.ease_ms = parse_var(name, value)?,
                "AUTOGATE_BUZZER_QUEUE_SIZE" => self.buzzer.queue_size = parse_var(name, value)?,
                "AUTOGATE_DEBOUNCE_US" => self.button.debounce_us = parse_var(name, value)?,
                "AUTOGATE_SAMPLE_INTERVAL_MS" => {
                    self.ultrasonic.sample_interval_ms = parse_var(name, value)?
                }
                "AUTOGATE_RFID_INIT_ATTEMPTS" => self.rfid.init_attempts = parse_var(name, value)?,
                "AUTOGATE_RFID_READ_ATTEMPTS" => self.rfid.read_attempts = parse_var(name, value)?,
                "AUTOGATE_LED_COUNT" => self.status_lights.led_count = parse_var(name, value)?,
                "AUTOGATE_CLOSE_TIMEOUT_MS" => {
                    self.generator.close_timeout_ms = parse_var(name, value)?
                }
                _ => continue,
            }
            debug!("Configuration override {}={}", name, value);
        }

        self.validate()
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let angles = SERVO_MIN_ANGLE..=SERVO_MAX_ANGLE;
        for (name, angle) in [
            ("gate.open_angle", self.gate.open_angle),
            ("gate.close_angle", self.gate.close_angle),
        ] {
            if !angles.contains(&angle) {
                return Err(Error::config(format!(
                    "{name} must be within {SERVO_MIN_ANGLE}..={SERVO_MAX_ANGLE}, got {angle}"
                )));
            }
        }

        if self.buzzer.min_frequency_hz >= self.buzzer.max_frequency_hz {
            return Err(Error::config(
                "buzzer.min_frequency_hz must be below buzzer.max_frequency_hz",
            ));
        }

        if !(1..=MAX_LED_COUNT).contains(&self.status_lights.led_count) {
            return Err(Error::config(format!(
                "status_lights.led_count must be within 1..={MAX_LED_COUNT}, got {}",
                self.status_lights.led_count
            )));
        }

        if self.rfid.init_attempts == 0 || self.rfid.read_attempts == 0 {
            return Err(Error::config("rfid attempts must be at least 1"));
        }

        if self.status_lights.write_attempts == 0 {
            return Err(Error::config("status_lights.write_attempts must be at least 1"));
        }

        if self.screen.rows == 0 || self.screen.columns == 0 {
            return Err(Error::config("screen dimensions must be non-zero"));
        }

        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{name} has an invalid value: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.gate.open_angle, 90.0);
        assert_eq!(config.gate.close_angle, 180.0);
        assert_eq!(config.buzzer.queue_size, 3);
        assert_eq!(config.generator.close_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_env([
                ("GATE_OPEN_ANGLE", "45"),
                ("GATE_ANGLE_OFFSET", "-1.5"),
                ("AUTOGATE_BUZZER_QUEUE_SIZE", "8"),
                ("PATH", "/usr/bin"),
            ])
            .unwrap();

        assert_eq!(config.gate.open_angle, 45.0);
        assert_eq!(config.gate.angle_offset, -1.5);
        assert_eq!(config.buzzer.queue_size, 8);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = AppConfig::default();
        let err = config.apply_env([("GATE_CLOSE_ANGLE", "wide open")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_rejects_out_of_range_angle() {
        let mut config = AppConfig::default();
        assert!(config.apply_env([("GATE_OPEN_ANGLE", "270")]).is_err());
    }

    #[test]
    fn test_partial_json() {
        let config =
            AppConfig::from_json_str(r#"{ "rfid": { "read_attempts": 5 }, "screen": { "rows": 2 } }"#)
                .unwrap();
        assert_eq!(config.rfid.read_attempts, 5);
        assert_eq!(config.rfid.init_attempts, DEFAULT_RFID_INIT_ATTEMPTS);
        assert_eq!(config.screen.rows, 2);
        assert_eq!(config.screen.columns, DEFAULT_SCREEN_COLUMNS);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            AppConfig::from_json_str("{ not json"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_led_count_bounds() {
        let mut config = AppConfig::default();
        config.status_lights.led_count = 9;
        assert!(config.validate().is_err());
        config.status_lights.led_count = 0;
        assert!(config.validate().is_err());
    }
}
