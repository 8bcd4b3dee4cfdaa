//! Debounced push button.
//!
//! Raw edges arrive on the GPIO callback thread and go through a
//! [`Debouncer`]; clean edges are emitted into the button's event generator.
//! The callback and the debouncer only exist while a consumer is attached.

use std::sync::Arc;
use std::time::Duration;

use autogate_bridge::{
    AsyncEventStream, Debouncer, EventGenerator, EventSink, EventSource, EventStream,
    GeneratorState,
};
use autogate_core::Result;
use autogate_core::config::{ButtonConfig, GeneratorConfig};
use tracing::{debug, trace};

use super::event_generator;
use crate::traits::EdgeInput;
use crate::types::ButtonEvent;

/// Event source wiring an [`EdgeInput`] to a debouncer.
pub struct ButtonSource {
    input: Box<dyn EdgeInput>,
    window: Duration,
    debouncer: Option<Arc<Debouncer>>,
}

impl ButtonSource {
    pub fn new(input: Box<dyn EdgeInput>, window: Duration) -> Self {
        Self {
            input,
            window,
            debouncer: None,
        }
    }
}

impl EventSource for ButtonSource {
    type Event = ButtonEvent;

    fn setup(&mut self, sink: EventSink<ButtonEvent>) -> Result<()> {
        let debouncer = Arc::new(Debouncer::spawn(self.window, move |edge| {
            if sink.emit(edge).is_err() {
                trace!(%edge, "Button edge dropped, no consumer");
            }
        })?);

        let feed = Arc::clone(&debouncer);
        self.input.install(Box::new(move |edge| feed.feed(edge)))?;
        self.debouncer = Some(debouncer);
        debug!("Button callback installed");
        Ok(())
    }

    fn cleanup(&mut self) {
        self.input.remove();
        self.debouncer = None;
        debug!("Button callback removed");
    }
}

/// A push button reporting debounced presses and releases.
#[derive(Clone)]
pub struct Button {
    generator: EventGenerator<ButtonSource>,
}

impl Button {
    pub fn new(
        input: impl EdgeInput + 'static,
        config: &ButtonConfig,
        generator: &GeneratorConfig,
    ) -> Self {
        let source = ButtonSource::new(Box::new(input), config.debounce());
        Self {
            generator: event_generator("button", source, generator),
        }
    }

    /// Start receiving button events, preempting any current consumer.
    pub fn attach(&self) -> Result<EventStream<ButtonSource>> {
        self.generator.attach()
    }

    pub async fn attach_async(&self) -> Result<AsyncEventStream<ButtonEvent>> {
        self.generator.attach_async().await
    }

    pub fn state(&self) -> GeneratorState {
        self.generator.state()
    }

    /// End the current stream and release the GPIO callback.
    pub fn close(&self) {
        self.generator.close();
    }
}
