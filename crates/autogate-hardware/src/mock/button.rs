//! Mock push button.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::traits::{EdgeCallback, EdgeInput};
use crate::types::ButtonEvent;

#[derive(Default)]
struct Line {
    callback: Option<EdgeCallback>,
    installs: usize,
}

/// GPIO input whose edges are driven by a [`MockButtonHandle`].
pub struct MockButton {
    line: Arc<Mutex<Line>>,
}

impl MockButton {
    pub fn new() -> (Self, MockButtonHandle) {
        let line = Arc::new(Mutex::new(Line::default()));
        (
            Self {
                line: Arc::clone(&line),
            },
            MockButtonHandle { line },
        )
    }
}

impl EdgeInput for MockButton {
    fn install(&mut self, callback: EdgeCallback) -> Result<()> {
        let mut line = self.line.lock();
        line.callback = Some(callback);
        line.installs += 1;
        Ok(())
    }

    fn remove(&mut self) {
        self.line.lock().callback = None;
    }
}

/// Handle for toggling a [`MockButton`].
#[derive(Clone)]
pub struct MockButtonHandle {
    line: Arc<Mutex<Line>>,
}

impl MockButtonHandle {
    /// Deliver one raw edge. Dropped if no callback is installed.
    pub fn edge(&self, edge: ButtonEvent) {
        if let Some(callback) = self.line.lock().callback.as_ref() {
            callback(edge);
        }
    }

    pub fn press(&self) {
        self.edge(ButtonEvent::Pressed);
    }

    pub fn release(&self) {
        self.edge(ButtonEvent::Released);
    }

    /// Contact bounce: `count` extra release/press pairs after a press.
    pub fn bounce(&self, count: usize) {
        for _ in 0..count {
            self.release();
            self.press();
        }
    }

    pub fn is_installed(&self) -> bool {
        self.line.lock().callback.is_some()
    }

    pub fn installs(&self) -> usize {
        self.line.lock().installs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_reach_installed_callback() {
        let (mut button, handle) = MockButton::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            button
                .install(Box::new(move |edge| seen.lock().push(edge)))
                .unwrap();
        }

        handle.press();
        handle.release();
        button.remove();
        handle.press();

        assert_eq!(*seen.lock(), vec![ButtonEvent::Pressed, ButtonEvent::Released]);
        assert!(!handle.is_installed());
        assert_eq!(handle.installs(), 1);
    }
}
