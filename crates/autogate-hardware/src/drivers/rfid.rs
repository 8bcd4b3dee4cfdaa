//! PN532 card reader.
//!
//! A scanner thread polls the reader while a consumer is attached. Each poll
//! goes through the read retry policy, which reopens the reader session
//! between attempts; running out of attempts ends the stream. The same card
//! seen again within the rescan window is not reported twice.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use autogate_bridge::{
    AsyncEventStream, EventGenerator, EventSink, EventSource, EventStream, GeneratorState,
    RetryPolicy,
};
use autogate_core::config::{GeneratorConfig, RfidConfig};
use autogate_core::{Error, Result};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use super::{Buzzer, Poller, event_generator};
use crate::traits::{CardReader, CardReaderConnector};
use crate::types::{BuzzerPlayRequest, CardScan, FirmwareVersion};

/// Reader session plus the means to reopen it.
struct Pn532 {
    connector: Box<dyn CardReaderConnector>,
    reader: Box<dyn CardReader>,
}

impl Pn532 {
    fn open(connector: &mut dyn CardReaderConnector) -> crate::error::Result<Box<dyn CardReader>> {
        let mut reader = connector.connect()?;
        reader.sam_configuration()?;
        Ok(reader)
    }

    fn reinit(&mut self) -> crate::error::Result<()> {
        self.reader = Self::open(self.connector.as_mut())?;
        debug!("PN532 reinitialized");
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> crate::error::Result<Option<Vec<u8>>> {
        self.reader.read_passive_target(timeout)
    }
}

/// Suppresses repeated scans of a card held against the reader.
#[derive(Debug)]
struct RescanFilter {
    window: Duration,
    last_seen: HashMap<String, Instant>,
}

impl RescanFilter {
    fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    /// Whether a scan of `uid` at `now` should be reported. Every scan
    /// restarts the window, so a card left on the reader stays quiet.
    fn accept(&mut self, uid: &str, now: Instant) -> bool {
        let previous = self.last_seen.insert(uid.to_string(), now);
        self.last_seen.retain(|_, seen| now.saturating_duration_since(*seen) < self.window);
        previous.is_none_or(|seen| now.saturating_duration_since(seen) >= self.window)
    }
}

/// Event source emitting one [`CardScan`] per presented card.
pub struct RfidSource {
    device: Arc<Mutex<Pn532>>,
    read_policy: RetryPolicy,
    read_timeout: Duration,
    rescan_window: Duration,
    beep: Option<(Buzzer, BuzzerPlayRequest)>,
    poller: Option<Poller>,
}

impl EventSource for RfidSource {
    type Event = CardScan;

    fn setup(&mut self, sink: EventSink<CardScan>) -> Result<()> {
        let device = Arc::clone(&self.device);
        let policy = self.read_policy.clone();
        let timeout = self.read_timeout;
        let mut filter = RescanFilter::new(self.rescan_window);
        let beep = self.beep.clone();

        let poller = Poller::spawn("rfid-scanner", move |stop| {
            while !stop.is_stopped() {
                let read = {
                    let mut device = device.lock();
                    policy.retry_with_reinit(&mut *device, |d| d.read(timeout), Pn532::reinit)
                };

                let uid = match read {
                    Ok(Some(uid)) => uid,
                    Ok(None) => continue,
                    Err(e) => {
                        error!("Card reader gave up: {}", e);
                        sink.finish();
                        break;
                    }
                };

                let scan = CardScan::new(&uid);
                if !filter.accept(&scan.uid, Instant::now()) {
                    debug!(uid = %scan.uid, "Ignoring rescan");
                    continue;
                }

                info!(uid = %scan.uid, "Card scanned");
                if sink.emit(scan).is_err() {
                    break;
                }
                if let Some((buzzer, request)) = &beep {
                    if let Err(e) = buzzer.play(*request, false) {
                        debug!("Scan beep skipped: {}", e);
                    }
                }
            }
        })?;

        self.poller = Some(poller);
        debug!("RFID scanning started");
        Ok(())
    }

    fn cleanup(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        debug!("RFID scanning stopped");
    }
}

/// PN532 NFC reader reporting card scans.
#[derive(Clone)]
pub struct Rfid {
    generator: EventGenerator<RfidSource>,
    firmware: FirmwareVersion,
}

impl Rfid {
    /// Bring the reader up, retrying per `config.init_attempts`.
    ///
    /// With a `buzzer`, every reported scan is confirmed by a short beep.
    ///
    /// # Errors
    ///
    /// [`Error::FatalDeviceFault`] if the reader could not be initialized.
    pub fn new(
        connector: impl CardReaderConnector + 'static,
        config: &RfidConfig,
        generator: &GeneratorConfig,
        buzzer: Option<Buzzer>,
    ) -> Result<Self> {
        let mut connector: Box<dyn CardReaderConnector> = Box::new(connector);
        let init_policy =
            RetryPolicy::fixed("rfid init", config.init_attempts, config.retry_delay());
        let mut reader = init_policy.retry(|| Pn532::open(connector.as_mut()))?;
        let firmware = reader.firmware_version()?;
        info!(firmware = %firmware, "Found PN532");

        let source = RfidSource {
            device: Arc::new(Mutex::new(Pn532 { connector, reader })),
            read_policy: RetryPolicy::fixed(
                "rfid read",
                config.read_attempts,
                config.retry_delay(),
            ),
            read_timeout: config.read_timeout(),
            rescan_window: config.rescan_window(),
            beep: buzzer.map(|buzzer| {
                let request = BuzzerPlayRequest::new(config.beep_frequency_hz, config.beep());
                (buzzer, request)
            }),
            poller: None,
        };

        Ok(Self {
            generator: event_generator("rfid", source, generator),
            firmware,
        })
    }

    pub fn firmware(&self) -> FirmwareVersion {
        self.firmware
    }

    /// Start receiving scans, preempting any current consumer.
    pub fn attach(&self) -> Result<EventStream<RfidSource>> {
        self.generator.attach()
    }

    pub async fn attach_async(&self) -> Result<AsyncEventStream<CardScan>> {
        self.generator.attach_async().await
    }

    /// Poll for a single card outside of any stream. Garbled frames are
    /// retried with a reader reinit, as in the scanning loop.
    ///
    /// # Errors
    ///
    /// - `Closed` while a consumer is attached; the scanner thread owns the
    ///   reader then.
    /// - `FatalDeviceFault` once the read retry budget is spent.
    pub fn read_once(&self, timeout: Duration) -> Result<Option<CardScan>> {
        if self.generator.is_active() {
            return Err(Error::closed("rfid reader is streaming"));
        }
        self.generator.with_source(|source| -> Result<Option<CardScan>> {
            let mut device = source.device.lock();
            let uid = source.read_policy.retry_with_reinit(
                &mut *device,
                |d| d.read(timeout),
                Pn532::reinit,
            )?;
            Ok(uid.map(|uid| CardScan::new(&uid)))
        })
    }

    pub fn state(&self) -> GeneratorState {
        self.generator.state()
    }

    pub fn close(&self) {
        self.generator.close();
    }
}
