// WearLog — Acquisition State & Scheduler
//
// Interrupt handlers only ever raise a readiness flag.  The scheduler runs on
// the acquisition task and, once per cycle, polls EDA, motion and PPG in that
// fixed order, formats every ready reading and hands it to the log writer,
// then appends one shared timestamp record if anything was produced.
//
// Flags are level-triggered: several interrupts between two polls collapse
// into a single reading.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::record::{Record, Tag, Timestamp};
use crate::storage::error::StorageError;

// ---------------------------------------------------------------------------
// Shared acquisition state (written from ISRs and the control task)
// ---------------------------------------------------------------------------
pub struct ReadyFlag(AtomicBool);

impl ReadyFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// ISR side.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Consume the flag.  Test-and-clear is a single atomic step, so a raise
    /// racing with the fetch is never lost silently.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for ReadyFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct AcquisitionState {
    pub eda: ReadyFlag,
    pub motion: ReadyFlag,
    pub ppg: ReadyFlag,
    recording: AtomicBool,
    listing_requested: AtomicBool,
}

impl AcquisitionState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_recording_enabled(&self, enabled: bool) {
        self.recording.store(enabled, Ordering::SeqCst);
    }

    pub fn recording_enabled(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Flip Recording Enable and return the new value.
    pub fn toggle_recording(&self) -> bool {
        !self.recording.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn request_file_listing(&self) {
        self.listing_requested.store(true, Ordering::SeqCst);
    }

    pub fn take_file_listing_request(&self) -> bool {
        self.listing_requested.swap(false, Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Seams to the sensor drivers and the log writer
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sample {
    Idle,
    Ready(String),
}

pub trait SensorSource {
    fn tag(&self) -> Tag;

    /// Consume the source's readiness flag and, if it was raised, fetch and
    /// format the reading.
    fn poll(&mut self) -> anyhow::Result<Sample>;

    /// Idempotent: redundant transitions do nothing.
    fn set_power(&mut self, enabled: bool) -> anyhow::Result<()>;
}

pub trait Clock {
    fn now(&mut self) -> anyhow::Result<Timestamp>;
}

pub trait RecordSink {
    fn submit(&mut self, record: &Record) -> Result<(), StorageError>;
}

/// Masks and unmasks the sensor readiness interrupts around flash access.
pub trait ReadinessGate {
    fn suspend(&mut self);
    fn resume(&mut self);
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------
pub struct Scheduler<W> {
    sources: Vec<Box<dyn SensorSource + Send>>,
    clock: Box<dyn Clock + Send>,
    sink: W,
    state: Arc<AcquisitionState>,
    powered: bool,
}

impl<W: RecordSink> Scheduler<W> {
    /// Sources are polled EDA, motion, PPG regardless of the order given.
    /// They are assumed powered on entry.
    pub fn new(
        mut sources: Vec<Box<dyn SensorSource + Send>>,
        clock: Box<dyn Clock + Send>,
        sink: W,
        state: Arc<AcquisitionState>,
    ) -> Self {
        sources.sort_by_key(|s| s.tag().poll_rank());
        Self {
            sources,
            clock,
            sink,
            state,
            powered: true,
        }
    }

    pub fn state(&self) -> &Arc<AcquisitionState> {
        &self.state
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    /// One polling pass.  Returns the number of sensor records produced;
    /// only fatal storage errors escape.
    pub fn run_cycle(&mut self) -> Result<usize, StorageError> {
        self.sync_power();

        let mut produced = 0;
        for source in self.sources.iter_mut() {
            let tag = source.tag();
            let payload = match source.poll() {
                Ok(Sample::Idle) => continue,
                Ok(Sample::Ready(payload)) => payload,
                Err(e) => {
                    log::warn!("{} read failed: {:#}", tag, e);
                    continue;
                }
            };

            match Record::new(tag, payload) {
                Ok(record) => {
                    deliver(&mut self.sink, &record)?;
                    produced += 1;
                }
                Err(e) => log::warn!("Dropping reading: {:#}", e),
            }
        }

        if produced > 0 {
            match self.clock.now() {
                Ok(ts) => deliver(&mut self.sink, &Record::timestamp(&ts))?,
                Err(e) => log::warn!("RTC read failed: {:#}", e),
            }
        }

        Ok(produced)
    }

    /// Follow the Recording Enable switch with sensor power.
    fn sync_power(&mut self) {
        let enabled = self.state.recording_enabled();
        if enabled == self.powered {
            return;
        }

        for source in self.sources.iter_mut() {
            if let Err(e) = source.set_power(enabled) {
                log::warn!("{} power {} failed: {:#}", source.tag(), on_off(enabled), e);
            }
        }
        self.powered = enabled;
        log::info!("Recording {}", if enabled { "enabled" } else { "disabled" });
    }
}

/// Oversize records are reported and dropped; anything else is fatal.
fn deliver<W: RecordSink>(sink: &mut W, record: &Record) -> Result<(), StorageError> {
    match sink.submit(record) {
        Err(e) if !e.is_fatal() => {
            log::error!("{} record dropped: {}", record.tag(), e);
            Ok(())
        }
        other => other,
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
