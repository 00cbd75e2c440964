// WearLog — Tasks
//
// Each task maps to a FreeRTOS task via `std::thread`.

pub mod acquisition;
pub mod control;
