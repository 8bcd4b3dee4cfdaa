//! Character LCD.

use autogate_core::Result;
use autogate_core::config::ScreenConfig;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::traits::LcdPanel;

/// Split `text` into at most `rows` lines of at most `columns` characters.
///
/// ```
/// use autogate_hardware::drivers::screen::layout;
///
/// let lines = layout("ACESSO LIBERADO\nBem-vindo, visitante", 2, 16);
/// assert_eq!(lines, vec!["ACESSO LIBERADO", "Bem-vindo, visit"]);
/// ```
pub fn layout(text: &str, rows: usize, columns: usize) -> Vec<String> {
    text.lines()
        .take(rows)
        .map(|line| line.chars().take(columns).collect())
        .collect()
}

/// LCD with writes serialized behind a lock.
pub struct Screen {
    panel: Mutex<Box<dyn LcdPanel>>,
    rows: usize,
    columns: usize,
}

impl Screen {
    pub fn new(panel: impl LcdPanel + 'static, config: &ScreenConfig) -> Self {
        Self {
            panel: Mutex::new(Box::new(panel)),
            rows: config.rows,
            columns: config.columns,
        }
    }

    /// Replace the screen contents with `text`, one row per line.
    ///
    /// Lines beyond the last row and characters beyond the last column are
    /// dropped.
    pub fn write_text(&self, text: &str) -> Result<()> {
        let lines = layout(text, self.rows, self.columns);
        if text.lines().count() > self.rows {
            warn!(rows = self.rows, "Text does not fit the screen, truncating");
        }

        let mut panel = self.panel.lock();
        panel.clear()?;
        for (row, line) in lines.iter().enumerate() {
            panel.write_line(row, line)?;
        }
        debug!(lines = lines.len(), "Screen updated");
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        Ok(self.panel.lock().clear()?)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Blank the screen and release the panel.
    pub fn close(&self) -> Result<()> {
        let mut panel = self.panel.lock();
        panel.clear()?;
        panel.close()?;
        Ok(())
    }
}
