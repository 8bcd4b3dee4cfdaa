//! Values exchanged with drivers: events they emit and commands they accept.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use autogate_bridge::Edge as ButtonEvent;

/// A card presented to the RFID reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardScan {
    /// Card UID as lowercase hex, two digits per byte.
    pub uid: String,

    /// When the scan was accepted.
    pub timestamp: DateTime<Utc>,
}

impl CardScan {
    pub fn new(uid: &[u8]) -> Self {
        Self {
            uid: uid_hex(uid),
            timestamp: Utc::now(),
        }
    }
}

/// Render a UID the way clients see it.
///
/// ```
/// use autogate_hardware::types::uid_hex;
///
/// assert_eq!(uid_hex(&[0x04, 0xab, 0xcd, 0xef]), "04abcdef");
/// ```
pub fn uid_hex(uid: &[u8]) -> String {
    uid.iter().map(|b| format!("{b:02x}")).collect()
}

/// Card reader firmware report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub ic: u8,
    pub version: u8,
    pub revision: u8,
    pub support: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.version, self.revision)
    }
}

/// Position the gate is commanded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    Open,
    Close,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Close => write!(f, "close"),
        }
    }
}

/// What the status LED bank shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLightState {
    #[default]
    None,
    Ready,
    Processing,
    Allow,
    Deny,
}

impl StatusLightState {
    /// LED pattern, bit 0 being the first LED.
    pub fn pattern(self) -> u8 {
        match self {
            Self::None => 0b0000,
            Self::Ready => 0b1000,
            Self::Processing => 0b0100,
            Self::Allow => 0b0010,
            Self::Deny => 0b0001,
        }
    }
}

impl fmt::Display for StatusLightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Allow => "allow",
            Self::Deny => "deny",
        };
        f.write_str(name)
    }
}

/// One tone for the buzzer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuzzerPlayRequest {
    pub frequency_hz: f64,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl BuzzerPlayRequest {
    pub fn new(frequency_hz: f64, duration: Duration) -> Self {
        Self {
            frequency_hz,
            duration,
        }
    }
}

/// Durations travel as fractional seconds, like the HTTP form fields.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StatusLightState::None, 0b0000)]
    #[case(StatusLightState::Ready, 0b1000)]
    #[case(StatusLightState::Processing, 0b0100)]
    #[case(StatusLightState::Allow, 0b0010)]
    #[case(StatusLightState::Deny, 0b0001)]
    fn test_status_patterns(#[case] state: StatusLightState, #[case] pattern: u8) {
        assert_eq!(state.pattern(), pattern);
    }

    #[test]
    fn test_gate_state_serde() {
        assert_eq!(serde_json::to_string(&GateState::Open).unwrap(), "\"open\"");
        let state: GateState = serde_json::from_str("\"close\"").unwrap();
        assert_eq!(state, GateState::Close);
    }

    #[test]
    fn test_buzzer_request_from_form_values() {
        let request: BuzzerPlayRequest =
            serde_json::from_str(r#"{"frequency_hz": 600.0, "duration": 0.5}"#).unwrap();
        assert_eq!(request.duration, Duration::from_millis(500));
        assert!(serde_json::from_str::<BuzzerPlayRequest>(r#"{"frequency_hz": 1.0, "duration": -1}"#).is_err());
    }

    #[test]
    fn test_card_scan_uid_is_lowercase_hex() {
        let scan = CardScan::new(&[0xDE, 0xAD, 0x00, 0x01]);
        assert_eq!(scan.uid, "dead0001");
    }

    #[test]
    fn test_firmware_display() {
        let fw = FirmwareVersion {
            ic: 0x32,
            version: 1,
            revision: 6,
            support: 7,
        };
        assert_eq!(fw.to_string(), "1.6");
    }
}
