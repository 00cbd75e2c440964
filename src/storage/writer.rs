// WearLog — Buffered Log Writer
//
// Entry point for every record.  Lines accumulate in the log buffer until the
// next one would bring it to the flush threshold; the buffer is then flushed
// once and the record lands in the fresh page.

use std::sync::Arc;

use crate::acquisition::{AcquisitionState, RecordSink};
use crate::config::StorageConfig;
use crate::record::Record;
use crate::storage::buffer::LogBuffer;
use crate::storage::engine::PageStore;
use crate::storage::error::StorageError;

pub struct LogWriter<S> {
    buffer: LogBuffer,
    store: S,
    state: Arc<AcquisitionState>,
    flush_threshold: usize,
}

impl<S: PageStore> LogWriter<S> {
    /// Buffer capacity and flush threshold come from the store's geometry.
    pub fn new(store: S, state: Arc<AcquisitionState>) -> anyhow::Result<Self> {
        let cfg = *store.config();
        cfg.validate()?;
        Ok(Self {
            buffer: LogBuffer::new(cfg.file_size),
            store,
            state,
            flush_threshold: cfg.flush_threshold,
        })
    }

    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

impl<S: PageStore> RecordSink for LogWriter<S> {
    /// Dropped silently while recording is disabled.  The buffer keeps
    /// whatever it held across a disable/enable cycle.
    fn submit(&mut self, record: &Record) -> Result<(), StorageError> {
        if !self.state.recording_enabled() {
            return Ok(());
        }

        let needed = record.serialized_len() + 1;
        if needed > self.buffer.capacity() {
            return Err(StorageError::RecordTooLarge {
                len: record.serialized_len(),
                capacity: self.buffer.capacity(),
            });
        }

        if !self.buffer.is_empty() && self.buffer.len() + needed >= self.flush_threshold {
            self.store.flush(&mut self.buffer)?;
        }

        // Cannot fail: the line fits an empty page.
        if !self.buffer.push_line(record) {
            return Err(StorageError::RecordTooLarge {
                len: record.serialized_len(),
                capacity: self.buffer.capacity() - self.buffer.len(),
            });
        }
        Ok(())
    }
}
