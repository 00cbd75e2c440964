// WearLog — Peripheral Drivers
//
// Register-level drivers written against the embedded-hal 1.0 traits, so the
// same code runs over esp-idf-hal on the device and over fakes in tests.

pub mod afe4400;
pub mod eda;
pub mod imu;
pub mod rtc;
pub mod status_led;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Handle to a bus shared between drivers for the whole programme.
pub type SharedBus<B> = &'static Mutex<B>;

/// A poisoned lock only means another holder panicked mid-transfer; the
/// peripheral itself is still usable.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// HAL error types only promise `Debug`.
pub(crate) fn bus_error<E: core::fmt::Debug>(what: &'static str) -> impl FnOnce(E) -> anyhow::Error {
    move |e| anyhow::anyhow!("{}: {:?}", what, e)
}
