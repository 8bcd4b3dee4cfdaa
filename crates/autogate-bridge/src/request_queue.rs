//! Serializing command processor for actuators.
//!
//! A [`RequestQueue`] owns a [`BoundedChannel`] of commands and one worker
//! thread that owns the hardware handle. Commands run strictly in
//! submission order and never overlap. When the worker finds nothing else
//! queued after a command it calls [`Actuator::settle`], so a buzzer stops
//! sounding or a servo stops being driven after its last scheduled action.
//!
//! Scheduling is fire-and-forget: a failing command is logged and the worker
//! moves on. Callers that need to know when work completed use
//! [`drain`](RequestQueue::drain).

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use autogate_core::constants::{DEFAULT_CLOSE_TIMEOUT_MS, DEFAULT_REQUEST_QUEUE_SIZE};
use autogate_core::{Error, Result};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use crate::channel::{BoundedChannel, Slot};

/// Hardware handle driven by a [`RequestQueue`] worker.
pub trait Actuator: Send + 'static {
    type Command: Send + fmt::Debug + 'static;

    /// Execute one command. `has_more` tells whether another command is
    /// already waiting, so a move can skip its final hold.
    fn serve(&mut self, command: Self::Command, has_more: bool) -> Result<()>;

    /// Rest action once the queue runs dry.
    fn settle(&mut self);

    /// Release the hardware handle. Called once, after the final settle.
    fn release(&mut self) {}
}

type Validator<C> = Box<dyn Fn(&C) -> Result<()> + Send + Sync>;

struct Stopped {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Stopped {
    fn set(&self) {
        *self.done.lock() = true;
        self.signal.notify_all();
    }

    fn wait(&self, timeout: Duration) -> bool {
        let mut done = self.done.lock();
        if !*done {
            self.signal.wait_while_for(&mut done, |done| !*done, timeout);
        }
        *done
    }
}

struct Shared<C> {
    name: String,
    channel: BoundedChannel<C>,
    validator: Option<Validator<C>>,
    stopped: Stopped,
}

impl<C> Shared<C> {
    fn schedule(&self, command: C, blocking: bool) -> Result<()> {
        if let Some(validate) = &self.validator {
            validate(&command)?;
        }
        if blocking {
            self.channel.put(command)
        } else {
            self.channel.try_put(command)
        }
    }
}

/// Serial command queue in front of one actuator.
pub struct RequestQueue<C> {
    shared: Arc<Shared<C>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    close_timeout: Duration,
}

impl<C> fmt::Debug for RequestQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestQueue")
            .field("name", &self.shared.name)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<C> RequestQueue<C> {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Commands waiting behind the one in progress.
    pub fn pending(&self) -> usize {
        self.shared.channel.len()
    }

    /// No command queued or executing.
    pub fn is_idle(&self) -> bool {
        self.shared.channel.unfinished() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.channel.is_closed()
    }
}

impl<C: Send + fmt::Debug + 'static> RequestQueue<C> {
    pub fn builder(name: impl Into<String>) -> RequestQueueBuilder<C> {
        RequestQueueBuilder {
            name: name.into(),
            capacity: DEFAULT_REQUEST_QUEUE_SIZE,
            close_timeout: Duration::from_millis(DEFAULT_CLOSE_TIMEOUT_MS),
            validator: None,
        }
    }

    /// Submit a command.
    ///
    /// With `blocking` the caller waits for a free slot; otherwise a full
    /// queue is reported immediately.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the validation hook rejects `command`
    /// - [`Error::QueueFull`] if `blocking` is false and no slot is free
    /// - [`Error::Closed`] once the queue has been closed
    pub fn schedule(&self, command: C, blocking: bool) -> Result<()> {
        self.shared.schedule(command, blocking)
    }

    /// [`schedule`](Self::schedule) for async callers. A blocking submit
    /// waits on the blocking thread pool.
    pub async fn schedule_async(&self, command: C, blocking: bool) -> Result<()> {
        if !blocking {
            return self.shared.schedule(command, false);
        }
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || shared.schedule(command, true))
            .await
            .map_err(|e| Error::worker(format!("{} schedule: {e}", self.shared.name)))?
    }

    /// Wait until every command scheduled so far has been executed (or
    /// discarded by [`close`](Self::close)).
    pub fn drain(&self) {
        self.shared.channel.join();
    }

    /// Like [`drain`](Self::drain), giving up after `timeout`.
    pub fn drain_timeout(&self, timeout: Duration) -> Result<()> {
        if self.shared.channel.join_timeout(timeout) {
            Ok(())
        } else {
            Err(Error::timeout(format!("{} drain", self.shared.name), timeout))
        }
    }

    pub async fn drain_async(&self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        tokio::task::spawn_blocking(move || shared.channel.join())
            .await
            .map_err(|e| Error::worker(format!("{} drain: {e}", self.shared.name)))
    }

    /// Stop accepting commands, discard the queued ones, let the current one
    /// finish, then settle and release the actuator.
    ///
    /// Waits at most the close timeout for the worker. Calling it again is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] if the worker did not stop in time; it is left to
    /// finish in the background.
    pub fn close(&self) -> Result<()> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };

        self.shared.channel.close();
        let discarded = self.shared.channel.clear();
        debug!(queue = %self.shared.name, discarded, "Closing request queue");

        if !self.shared.stopped.wait(self.close_timeout) {
            warn!(
                queue = %self.shared.name,
                timeout_ms = self.close_timeout.as_millis() as u64,
                "Worker did not stop in time"
            );
            return Err(Error::timeout(
                format!("{} worker", self.shared.name),
                self.close_timeout,
            ));
        }

        if worker.join().is_err() {
            return Err(Error::worker(format!("{} worker panicked", self.shared.name)));
        }
        Ok(())
    }
}

impl<C> Drop for RequestQueue<C> {
    fn drop(&mut self) {
        if self.worker.get_mut().is_some() {
            self.shared.channel.close();
            self.shared.channel.clear();
            if !self.shared.stopped.wait(self.close_timeout) {
                warn!(queue = %self.shared.name, "Worker still running at drop");
            }
        }
    }
}

/// Builder for [`RequestQueue`].
pub struct RequestQueueBuilder<C> {
    name: String,
    capacity: usize,
    close_timeout: Duration,
    validator: Option<Validator<C>>,
}

impl<C: Send + fmt::Debug + 'static> RequestQueueBuilder<C> {
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Check every command before it is queued. Rejections should be
    /// [`Error::InvalidArgument`].
    pub fn validator<F>(mut self, validate: F) -> Self
    where
        F: Fn(&C) -> Result<()> + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(validate));
        self
    }

    /// Start the worker thread, handing it `actuator`.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the thread cannot be spawned.
    pub fn spawn<A>(self, actuator: A) -> Result<RequestQueue<C>>
    where
        A: Actuator<Command = C>,
    {
        let shared = Arc::new(Shared {
            channel: BoundedChannel::new(format!("{} requests", self.name), self.capacity),
            name: self.name,
            validator: self.validator,
            stopped: Stopped {
                done: Mutex::new(false),
                signal: Condvar::new(),
            },
        });

        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(format!("{}-worker", shared.name))
                .spawn(move || run_worker(&shared, actuator))?
        };

        Ok(RequestQueue {
            shared,
            worker: Mutex::new(Some(worker)),
            close_timeout: self.close_timeout,
        })
    }
}

fn run_worker<A: Actuator>(shared: &Shared<A::Command>, mut actuator: A) {
    debug!(queue = %shared.name, "Worker started");
    let mut settled = true;

    loop {
        let command = match shared.channel.get() {
            Slot::Item(command) => command,
            Slot::Close => break,
        };
        let has_more = !shared.channel.is_empty();
        let description = format!("{command:?}");
        settled = false;

        match panic::catch_unwind(AssertUnwindSafe(|| actuator.serve(command, has_more))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(queue = %shared.name, command = %description, "Command failed: {}", e),
            Err(_) => error!(queue = %shared.name, command = %description, "Command panicked"),
        }

        if shared.channel.is_empty() {
            actuator.settle();
            settled = true;
        }
        shared.channel.task_done();
    }

    if !settled {
        actuator.settle();
    }
    actuator.release();
    debug!(queue = %shared.name, "Worker stopped");
    shared.stopped.set();
}
