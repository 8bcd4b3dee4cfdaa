//! Default values for the gate controller.
//!
//! These are the values the configuration layer falls back to when a field
//! is absent from the configuration file and the environment. They reflect
//! the wiring of the reference gate module (MG90S servo on PWM channel 0,
//! passive buzzer, PN532 reader, PCF8574 LED expander, 2004A LCD).
//!
//! ```
//! use autogate_core::constants::*;
//!
//! assert!(DEFAULT_GATE_OPEN_ANGLE < DEFAULT_GATE_CLOSE_ANGLE);
//! assert_eq!(DEFAULT_REQUEST_QUEUE_SIZE, 3);
//! ```

// ============================================================================
// Bridging primitives
// ============================================================================

/// Capacity of the channel behind each event generator.
///
/// At least one slot lets a driver emit before the consumer starts reading.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1;

/// Upper bound for waiting on a previous consumer or producer thread to
/// acknowledge a close request, in milliseconds.
pub const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 5_000;

/// Number of commands an actuator queue accepts before reporting backpressure.
pub const DEFAULT_REQUEST_QUEUE_SIZE: usize = 3;

// ============================================================================
// Gate servo
// ============================================================================

/// Servo angle at which the gate is open, in degrees.
pub const DEFAULT_GATE_OPEN_ANGLE: f64 = 90.0;

/// Servo angle at which the gate is closed, in degrees.
pub const DEFAULT_GATE_CLOSE_ANGLE: f64 = 180.0;

/// Mechanical trim added to every gate angle, in degrees.
pub const DEFAULT_GATE_ANGLE_OFFSET: f64 = 0.3;

/// Duration of an eased gate movement, in milliseconds.
pub const DEFAULT_GATE_EASE_MS: u64 = 500;

/// Lowest angle the servo accepts.
pub const SERVO_MIN_ANGLE: f64 = 0.0;

/// Highest angle the servo accepts.
pub const SERVO_MAX_ANGLE: f64 = 180.0;

/// PWM refresh rate of the servo.
pub const SERVO_FREQUENCY_HZ: f64 = 50.0;

// ============================================================================
// Buzzer
// ============================================================================

/// Lowest playable frequency (A2, two octaves below A4).
pub const BUZZER_MIN_FREQUENCY_HZ: f64 = 110.0;

/// Highest playable frequency (A6, two octaves above A4).
pub const BUZZER_MAX_FREQUENCY_HZ: f64 = 1760.0;

/// Shortest tone a request may ask for, in milliseconds.
pub const BUZZER_MIN_DURATION_MS: u64 = 10;

/// Longest tone a request may ask for, in milliseconds.
pub const BUZZER_MAX_DURATION_MS: u64 = 5_000;

// ============================================================================
// Button
// ============================================================================

/// Window in which a release edge may still be cancelled by a press bounce,
/// in microseconds (one 60 Hz frame).
pub const DEFAULT_DEBOUNCE_US: u64 = 16_667;

// ============================================================================
// Ultrasonic sensor
// ============================================================================

/// Interval between two distance samples, in milliseconds.
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1_000;

/// Readings above this distance (and echo timeouts) are reported as this value, in cm.
pub const MAX_DISTANCE_CM: f64 = 300.0;

// ============================================================================
// RFID reader
// ============================================================================

/// Attempts made to bring the reader up before giving up.
pub const DEFAULT_RFID_INIT_ATTEMPTS: u32 = 10;

/// Attempts made for a single card read, reinitializing between them.
pub const DEFAULT_RFID_READ_ATTEMPTS: u32 = 3;

/// Delay between two initialization attempts, in milliseconds.
pub const DEFAULT_RFID_RETRY_DELAY_MS: u64 = 1_000;

/// How long one passive-target poll waits for a card, in milliseconds.
pub const DEFAULT_RFID_READ_TIMEOUT_MS: u64 = 500;

/// The same card scanned again within this window is not reported, in milliseconds.
pub const DEFAULT_RFID_RESCAN_WINDOW_MS: u64 = 500;

/// Frequency of the confirmation beep played on a scan.
pub const DEFAULT_RFID_BEEP_FREQUENCY_HZ: f64 = 800.0;

/// Duration of the confirmation beep, in milliseconds.
pub const DEFAULT_RFID_BEEP_MS: u64 = 100;

// ============================================================================
// Status lights
// ============================================================================

/// Number of LEDs wired to the expander.
pub const DEFAULT_LED_COUNT: u8 = 4;

/// Maximum number of LEDs a PCF8574 can drive.
pub const MAX_LED_COUNT: u8 = 8;

/// I2C address of the LED expander.
pub const DEFAULT_LED_ADDRESS: u8 = 0x20;

/// Attempts made for a single LED write, reinitializing between them.
pub const DEFAULT_LED_WRITE_ATTEMPTS: u32 = 5;

/// Pause before reopening the expander after a failed write, in milliseconds.
pub const LED_RETRY_DELAY_MS: u64 = 10;

// ============================================================================
// Screen
// ============================================================================

/// Character rows of the LCD.
pub const DEFAULT_SCREEN_ROWS: usize = 4;

/// Character columns of the LCD.
pub const DEFAULT_SCREEN_COLUMNS: usize = 20;
