// WearLog — Flash Storage Engine
//
// Turns a full log buffer into a new fixed-size file `r<index>.txt`.  The
// file catalog is a counter seeded at boot from the directory; it only ever
// grows.  Once creating one more file would exceed the configured maximum the
// engine goes Exhausted for the rest of the session and every later flush is
// discarded.  Exhaustion is not persisted: after a reboot the recount
// re-derives it on the first flush.
//
// Every flash access runs inside the atomic section: sensor interrupts masked
// and the SPI bus taken from the AFE.

use std::io;
use std::sync::mpsc::Sender;
use std::thread;

use embedded_hal::digital::OutputPin;

use crate::acquisition::ReadinessGate;
use crate::config::{file_name, StorageConfig};
use crate::events::ControlEvent;
use crate::storage::buffer::LogBuffer;
use crate::storage::bus::{BusArbiter, BusPeer};
use crate::storage::error::StorageError;
use crate::storage::fs::{FileInfo, FlashFs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityState {
    Active,
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// A new file was written with `used` meaningful bytes.
    Written { index: u32, used: usize },
    /// This flush found the catalog full; the buffer was discarded.
    Exhausted,
    /// The engine was already exhausted; the buffer was discarded.
    Discarded,
}

/// Where the log writer sends a full buffer.  The buffer is always cleared,
/// whatever the outcome.
pub trait PageStore {
    /// Geometry the writer sizes its buffer from.
    fn config(&self) -> &StorageConfig;

    fn flush(&mut self, buffer: &mut LogBuffer) -> Result<FlushOutcome, StorageError>;
}

pub struct FlashStore<F, P, C> {
    fs: F,
    bus: BusArbiter<P, C>,
    gate: Box<dyn ReadinessGate + Send>,
    events: Option<Sender<ControlEvent>>,
    config: StorageConfig,
    catalog_count: u32,
    state: CapacityState,
}

impl<F, P, C> FlashStore<F, P, C>
where
    F: FlashFs,
    P: BusPeer,
    C: OutputPin,
{
    /// Seed the catalog by counting the files already on the device.
    pub fn open(
        fs: F,
        bus: BusArbiter<P, C>,
        gate: Box<dyn ReadinessGate + Send>,
        config: StorageConfig,
    ) -> Result<Self, StorageError> {
        let mut store = Self {
            fs,
            bus,
            gate,
            events: None,
            config,
            catalog_count: 0,
            state: CapacityState::Active,
        };

        let existing = store.atomic(|s| s.fs.list().map_err(StorageError::Directory))?;
        store.catalog_count = existing.len() as u32;
        log::info!(
            "Flash catalog: {} existing files (max {})",
            store.catalog_count,
            store.config.max_files
        );

        Ok(store)
    }

    /// Deliver the one-shot capacity notification to the control task.
    pub fn with_notifier(mut self, events: Sender<ControlEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn catalog_count(&self) -> u32 {
        self.catalog_count
    }

    pub fn state(&self) -> CapacityState {
        self.state
    }

    /// Post `event` to the control task, if one is listening.
    pub fn notify(&self, event: ControlEvent) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                log::warn!("Control channel closed, dropping {:?}", event);
            }
        }
    }

    pub fn device_status(&mut self) -> String {
        match self.atomic(|s| Ok(s.fs.status())) {
            Ok(status) => status,
            Err(e) => format!("unavailable ({})", e),
        }
    }

    /// Directory-listing diagnostic.
    pub fn list_files(&mut self) -> Result<Vec<FileInfo>, StorageError> {
        let files = self.atomic(|s| s.fs.list().map_err(StorageError::Directory))?;
        for file in &files {
            log::info!("  {:<20}  {} bytes", file.name, file.size);
        }
        Ok(files)
    }

    /// Run `op` with sensor interrupts masked and the bus held for storage.
    /// The bus is handed back and interrupts restored even when `op` fails.
    fn atomic<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        self.gate.suspend();
        let result = match self.bus.acquire_for_storage() {
            Ok(()) => op(self),
            Err(e) => Err(e),
        };
        let released = self.bus.release_from_storage();
        self.gate.resume();

        let value = result?;
        released?;
        Ok(value)
    }

    fn write_page(&mut self, buffer: &LogBuffer) -> Result<FlushOutcome, StorageError> {
        if self.state == CapacityState::Exhausted {
            return Ok(FlushOutcome::Discarded);
        }

        if self.catalog_count + 1 > self.config.max_files {
            self.state = CapacityState::Exhausted;
            return Ok(FlushOutcome::Exhausted);
        }

        let mut name = file_name(self.catalog_count);
        while self.fs.exists(&name).map_err(StorageError::Directory)? {
            self.catalog_count += 1;
            name = file_name(self.catalog_count);
        }

        self.fs
            .create(&name, self.config.file_size)
            .map_err(|source| StorageError::Create {
                name: name.clone(),
                source,
            })?;
        let index = self.catalog_count;
        self.catalog_count += 1;

        self.wait_ready()?;
        self.fs.write(&name, buffer.page()).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                StorageError::Open {
                    name: name.clone(),
                    source,
                }
            } else {
                StorageError::Write {
                    name: name.clone(),
                    source,
                }
            }
        })?;
        self.wait_ready()?;

        log::info!(
            "Wrote {} ({}/{} bytes)",
            name,
            buffer.len(),
            self.config.file_size
        );
        Ok(FlushOutcome::Written {
            index,
            used: buffer.len(),
        })
    }

    /// Bounded poll of the device busy status.
    fn wait_ready(&mut self) -> Result<(), StorageError> {
        let limit = self.config.ready_poll_limit;
        for attempt in 0..limit {
            if self.fs.is_ready().map_err(StorageError::Device)? {
                return Ok(());
            }
            if attempt + 1 < limit && !self.config.ready_poll_interval.is_zero() {
                thread::sleep(self.config.ready_poll_interval);
            }
        }
        Err(StorageError::DeviceTimeout { attempts: limit })
    }
}

impl<F, P, C> PageStore for FlashStore<F, P, C>
where
    F: FlashFs,
    P: BusPeer,
    C: OutputPin,
{
    fn config(&self) -> &StorageConfig {
        &self.config
    }

    fn flush(&mut self, buffer: &mut LogBuffer) -> Result<FlushOutcome, StorageError> {
        let page: &LogBuffer = buffer;
        let outcome = self.atomic(|s| s.write_page(page));
        buffer.clear();

        match outcome {
            Ok(FlushOutcome::Exhausted) => {
                log::warn!(
                    "Flash catalog full ({} files), logging stopped",
                    self.catalog_count
                );
                self.notify(ControlEvent::CapacityExhausted);
            }
            Ok(FlushOutcome::Discarded) => log::debug!("Flash exhausted, buffer discarded"),
            _ => {}
        }
        outcome
    }
}
