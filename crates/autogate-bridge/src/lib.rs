//! Bridges between hardware threads and application code.
//!
//! Two directions share one primitive, the [`BoundedChannel`]:
//!
//! - [`EventGenerator`]: hardware to application. A driver pushes events from
//!   its own threads; one consumer at a time reads them as a blocking
//!   iterator or an async stream.
//! - [`RequestQueue`]: application to hardware. Commands are executed
//!   serially by a worker that owns the actuator, which settles once idle.
//!
//! On top sit two policies drivers use: [`Debouncer`] for button edges and
//! [`RetryPolicy`] for flaky device I/O.

pub mod channel;
pub mod debounce;
pub mod event_generator;
pub mod request_queue;
pub mod retry;

pub use channel::{BoundedChannel, Slot};
pub use debounce::{DebounceState, Debouncer, Edge};
pub use event_generator::{
    AsyncEventStream, EventGenerator, EventSink, EventSource, EventStream, GeneratorState,
};
pub use request_queue::{Actuator, RequestQueue};
pub use retry::{Backoff, RetryPolicy};
