// WearLog — Wearable Physiological Data Logger
//
// EDA, motion and PPG readings are polled off interrupt-raised readiness
// flags, formatted as tagged text records, buffered in RAM and written to
// external NOR flash as fixed-size files.  Everything here is written
// against embedded-hal traits so it runs on the host under test; the ESP-IDF
// wiring lives in the firmware binary.

pub mod acquisition;
pub mod config;
pub mod drivers;
pub mod events;
pub mod input;
pub mod record;
pub mod storage;
pub mod tasks;
