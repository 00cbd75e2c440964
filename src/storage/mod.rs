// WearLog — Flash Log Storage
//
// record -> LogWriter (buffer) -> FlashStore (files) -> FlashFs (device),
// with the BusArbiter keeping the AFE off the SPI bus during flash access.

pub mod buffer;
pub mod bus;
pub mod engine;
pub mod error;
pub mod fs;
pub mod writer;

pub use buffer::LogBuffer;
pub use bus::{BusArbiter, BusOwner, BusPeer};
pub use engine::{CapacityState, FlashStore, FlushOutcome, PageStore};
pub use error::StorageError;
pub use fs::{DirFs, FileInfo, FlashFs};
pub use writer::LogWriter;
