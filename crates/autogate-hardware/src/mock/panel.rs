//! Mock I2C panel devices: character LCD and LED port expander.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{HardwareError, Result};
use crate::traits::{LcdPanel, LedExpander, LedExpanderConnector};

fn bus_error() -> HardwareError {
    HardwareError::Io(std::io::Error::other("Remote I/O error"))
}

#[derive(Debug)]
struct Glass {
    rows: Vec<String>,
    columns: usize,
    failing: u32,
    closed: bool,
}

/// Character LCD keeping its contents in memory.
///
/// # Examples
///
/// ```
/// use autogate_hardware::mock::MockLcd;
/// use autogate_hardware::traits::LcdPanel;
///
/// let (mut lcd, handle) = MockLcd::new(4, 20);
/// lcd.write_line(0, "AGUARDE...").unwrap();
///
/// assert_eq!(handle.line(0), "AGUARDE...");
/// assert_eq!(handle.lines().len(), 4);
/// ```
#[derive(Debug)]
pub struct MockLcd {
    glass: Arc<Mutex<Glass>>,
}

impl MockLcd {
    pub fn new(rows: usize, columns: usize) -> (Self, MockLcdHandle) {
        let glass = Arc::new(Mutex::new(Glass {
            rows: vec![String::new(); rows],
            columns,
            failing: 0,
            closed: false,
        }));
        (
            Self {
                glass: Arc::clone(&glass),
            },
            MockLcdHandle { glass },
        )
    }
}

impl LcdPanel for MockLcd {
    fn clear(&mut self) -> Result<()> {
        let mut glass = self.glass.lock();
        glass.rows.iter_mut().for_each(String::clear);
        Ok(())
    }

    fn write_line(&mut self, row: usize, text: &str) -> Result<()> {
        let mut glass = self.glass.lock();
        if glass.failing > 0 {
            glass.failing -= 1;
            return Err(bus_error());
        }
        if text.chars().count() > glass.columns {
            return Err(HardwareError::invalid_data(format!(
                "line longer than {} columns",
                glass.columns
            )));
        }
        let slot = glass
            .rows
            .get_mut(row)
            .ok_or_else(|| HardwareError::invalid_data(format!("no row {row}")))?;
        *slot = text.to_string();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.glass.lock().closed = true;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MockLcdHandle {
    glass: Arc<Mutex<Glass>>,
}

impl MockLcdHandle {
    pub fn line(&self, row: usize) -> String {
        self.glass.lock().rows.get(row).cloned().unwrap_or_default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.glass.lock().rows.clone()
    }

    pub fn fail_writes(&self, count: u32) {
        self.glass.lock().failing = count;
    }

    pub fn is_closed(&self) -> bool {
        self.glass.lock().closed
    }
}

#[derive(Debug, Default)]
struct Port {
    writes: Vec<u8>,
    failing: u32,
    connects: usize,
}

/// Opens mock PCF8574 handles sharing one port.
#[derive(Debug)]
pub struct MockLedConnector {
    port: Arc<Mutex<Port>>,
}

impl MockLedConnector {
    pub fn new() -> (Self, MockLedHandle) {
        let port = Arc::new(Mutex::new(Port::default()));
        (
            Self {
                port: Arc::clone(&port),
            },
            MockLedHandle { port },
        )
    }
}

impl LedExpanderConnector for MockLedConnector {
    fn connect(&mut self, _address: u8) -> Result<Box<dyn LedExpander>> {
        self.port.lock().connects += 1;
        Ok(Box::new(MockLedExpander {
            port: Arc::clone(&self.port),
        }))
    }
}

#[derive(Debug)]
pub struct MockLedExpander {
    port: Arc<Mutex<Port>>,
}

impl LedExpander for MockLedExpander {
    fn write_gpio(&mut self, value: u8) -> Result<()> {
        let mut port = self.port.lock();
        if port.failing > 0 {
            port.failing -= 1;
            return Err(bus_error());
        }
        port.writes.push(value);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MockLedHandle {
    port: Arc<Mutex<Port>>,
}

impl MockLedHandle {
    /// Raw byte last written to the port.
    pub fn output(&self) -> Option<u8> {
        self.port.lock().writes.last().copied()
    }

    pub fn writes(&self) -> Vec<u8> {
        self.port.lock().writes.clone()
    }

    pub fn fail_writes(&self, count: u32) {
        self.port.lock().failing = count;
    }

    pub fn connects(&self) -> usize {
        self.port.lock().connects
    }
}
