//! Mock PN532 reader for testing and development.
//!
//! The connector hands out reader sessions that share one simulated RF
//! field. Cards are put in the field through a [`MockPn532Handle`], which
//! can also inject the bus faults a real PN532 produces.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{HardwareError, Result};
use crate::traits::{CardReader, CardReaderConnector};
use crate::types::FirmwareVersion;

const DEVICE: &str = "PN532";

#[derive(Debug, Default)]
struct Field {
    cards: VecDeque<Vec<u8>>,
    failing_connects: u32,
    failing_reads: u32,
    disconnected: bool,
    connects: usize,
    reads: usize,
}

#[derive(Debug, Default)]
struct Shared {
    field: Mutex<Field>,
    presented: Condvar,
}

/// Opens mock PN532 sessions.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use autogate_hardware::mock::MockPn532Connector;
/// use autogate_hardware::traits::CardReaderConnector;
///
/// let (mut connector, handle) = MockPn532Connector::new();
/// handle.present(vec![0x04, 0xab, 0xcd, 0xef]);
///
/// let mut reader = connector.connect().unwrap();
/// let uid = reader.read_passive_target(Duration::from_millis(10)).unwrap();
/// assert_eq!(uid, Some(vec![0x04, 0xab, 0xcd, 0xef]));
/// ```
#[derive(Debug)]
pub struct MockPn532Connector {
    shared: Arc<Shared>,
}

impl MockPn532Connector {
    pub fn new() -> (Self, MockPn532Handle) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockPn532Handle { shared },
        )
    }
}

impl CardReaderConnector for MockPn532Connector {
    fn connect(&mut self) -> Result<Box<dyn CardReader>> {
        let mut field = self.shared.field.lock();
        field.connects += 1;
        if field.disconnected {
            return Err(HardwareError::disconnected(DEVICE));
        }
        if field.failing_connects > 0 {
            field.failing_connects -= 1;
            return Err(HardwareError::nack(DEVICE));
        }
        Ok(Box::new(MockPn532 {
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// One mock PN532 session.
#[derive(Debug)]
pub struct MockPn532 {
    shared: Arc<Shared>,
}

impl CardReader for MockPn532 {
    fn firmware_version(&mut self) -> Result<FirmwareVersion> {
        Ok(FirmwareVersion {
            ic: 0x32,
            version: 1,
            revision: 6,
            support: 7,
        })
    }

    fn sam_configuration(&mut self) -> Result<()> {
        if self.shared.field.lock().disconnected {
            return Err(HardwareError::disconnected(DEVICE));
        }
        Ok(())
    }

    fn read_passive_target(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        let mut field = self.shared.field.lock();
        field.reads += 1;

        if field.disconnected {
            return Err(HardwareError::disconnected(DEVICE));
        }
        if field.failing_reads > 0 {
            field.failing_reads -= 1;
            return Err(HardwareError::bad_preamble(DEVICE));
        }

        while field.cards.is_empty() {
            if self
                .shared
                .presented
                .wait_until(&mut field, deadline)
                .timed_out()
            {
                break;
            }
        }
        Ok(field.cards.pop_front())
    }
}

/// Handle for controlling a mock PN532.
#[derive(Debug, Clone)]
pub struct MockPn532Handle {
    shared: Arc<Shared>,
}

impl MockPn532Handle {
    /// Put a card in the field. Each presentation is read once.
    pub fn present(&self, uid: Vec<u8>) {
        self.shared.field.lock().cards.push_back(uid);
        self.shared.presented.notify_all();
    }

    /// Make the next `count` reads fail with a garbled frame.
    pub fn fail_reads(&self, count: u32) {
        self.shared.field.lock().failing_reads = count;
    }

    /// Make the next `count` connects fail with a missing ACK.
    pub fn fail_connects(&self, count: u32) {
        self.shared.field.lock().failing_connects = count;
    }

    /// Unplug the reader: every further operation fails permanently.
    pub fn disconnect(&self) {
        self.shared.field.lock().disconnected = true;
        self.shared.presented.notify_all();
    }

    pub fn connects(&self) -> usize {
        self.shared.field.lock().connects
    }

    pub fn reads(&self) -> usize {
        self.shared.field.lock().reads
    }

    pub fn pending_cards(&self) -> usize {
        self.shared.field.lock().cards.len()
    }
}
