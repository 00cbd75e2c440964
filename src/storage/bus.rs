// WearLog — Shared SPI Bus Arbiter
//
// The NOR flash shares its SPI bus with the AFE4400 front end (and with an
// unpopulated second memory footprint).  Before any flash transaction the AFE
// is deselected and its SDO driver tri-stated; afterwards it is restored.
// The flash driver toggles its own chip select per command, so "selecting the
// flash" here means granting it the bus with every other select held high.

use embedded_hal::digital::OutputPin;

use crate::storage::error::StorageError;

/// The peripheral competing with the flash for the bus.
pub trait BusPeer {
    /// Deselect the peripheral and tri-state its bus outputs.
    fn suspend(&mut self) -> anyhow::Result<()>;

    /// Restore the operating configuration that `suspend` replaced.
    fn resume(&mut self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOwner {
    Peer,
    Storage,
}

pub struct BusArbiter<P, C> {
    peer: P,
    aux_cs: C,
    owner: BusOwner,
}

impl<P: BusPeer, C: OutputPin> BusArbiter<P, C> {
    /// The bus starts out with the peer; the auxiliary select is parked high.
    pub fn new(peer: P, mut aux_cs: C) -> Result<Self, StorageError> {
        aux_cs.set_high().map_err(pin_error)?;
        Ok(Self {
            peer,
            aux_cs,
            owner: BusOwner::Peer,
        })
    }

    pub fn owner(&self) -> BusOwner {
        self.owner
    }

    pub fn acquire_for_storage(&mut self) -> Result<(), StorageError> {
        if self.owner == BusOwner::Storage {
            return Ok(());
        }

        self.peer
            .suspend()
            .map_err(|e| StorageError::Bus(format!("peer suspend: {:#}", e)))?;
        self.aux_cs.set_high().map_err(pin_error)?;
        self.owner = BusOwner::Storage;

        log::debug!("SPI bus -> storage");
        Ok(())
    }

    pub fn release_from_storage(&mut self) -> Result<(), StorageError> {
        if self.owner == BusOwner::Peer {
            return Ok(());
        }

        self.aux_cs.set_high().map_err(pin_error)?;
        self.peer
            .resume()
            .map_err(|e| StorageError::Bus(format!("peer resume: {:#}", e)))?;
        self.owner = BusOwner::Peer;

        log::debug!("SPI bus -> peer");
        Ok(())
    }
}

fn pin_error<E: core::fmt::Debug>(e: E) -> StorageError {
    StorageError::Bus(format!("chip select: {:?}", e))
}
