// WearLog — Storage Errors
//
// Capacity exhaustion is not an error: it is reported once through the
// control channel and flushes are silently discarded afterwards.  Everything
// here except an oversize record is fail-stop.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("record of {len} bytes (plus separator) cannot fit a {capacity}-byte buffer")]
    RecordTooLarge { len: usize, capacity: usize },

    #[error("file {name} could not be created: {source}")]
    Create {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("file {name} could not be opened: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("write to {name} failed: {source}")]
    Write {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("flash directory unreadable: {0}")]
    Directory(#[source] io::Error),

    #[error("flash status read failed: {0}")]
    Device(#[source] io::Error),

    #[error("flash device not ready after {attempts} polls")]
    DeviceTimeout { attempts: u32 },

    #[error("shared bus arbitration failed: {0}")]
    Bus(String),
}

impl StorageError {
    /// Fatal errors halt acquisition until an external reset.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::RecordTooLarge { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_oversize_records_are_recoverable() {
        assert!(!StorageError::RecordTooLarge { len: 200, capacity: 112 }.is_fatal());
        assert!(StorageError::DeviceTimeout { attempts: 3 }.is_fatal());
        assert!(StorageError::Create {
            name: "r0.txt".into(),
            source: io::Error::new(io::ErrorKind::Other, "full"),
        }
        .is_fatal());
        assert!(StorageError::Bus("cs stuck".into()).is_fatal());
    }
}
