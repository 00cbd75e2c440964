// WearLog — Control Events
//
// Messages flowing into the control task from the button handler and from
// the storage engine.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Single button click: flip the Recording Enable switch.
    ToggleRecording,
    /// Double button click: print the flash directory.
    ListFiles,
    /// Long button press (≥ 3 s).
    LongPress,
    /// The file catalog is full; raised exactly once per session.
    CapacityExhausted,
    /// A fatal storage error stopped acquisition until reset.
    StorageHalted,
}
