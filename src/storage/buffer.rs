// WearLog — In-memory Log Buffer
//
// One file's worth of bytes.  Records are appended newline-terminated in
// arrival order; the whole page (zero-padded past the used prefix) is what
// lands in flash.

use crate::record::Record;

pub struct LogBuffer {
    data: Box<[u8]>,
    len: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The logically written prefix.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The full page, zero beyond `len()`.
    pub fn page(&self) -> &[u8] {
        &self.data
    }

    /// Append `<TAG>:<payload>\n`.  Returns `false`, leaving the buffer
    /// untouched, when the line does not fit the remaining capacity.
    pub fn push_line(&mut self, record: &Record) -> bool {
        let needed = record.serialized_len() + 1;
        if self.len + needed > self.data.len() {
            return false;
        }

        let payload = record.payload().as_bytes();
        let start = self.len;
        self.data[start] = record.tag().as_char() as u8;
        self.data[start + 1] = b':';
        self.data[start + 2..start + 2 + payload.len()].copy_from_slice(payload);
        self.data[start + 2 + payload.len()] = b'\n';
        self.len += needed;
        true
    }

    /// Reset every byte, not just the length, so the next page is clean.
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.len = 0;
    }
}
