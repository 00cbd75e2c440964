// WearLog — Button Input Manager
//
// The record button speaks three gestures: a click toggles Recording Enable,
// a second click inside the window asks for a flash listing instead, and a
// hold of LONG_PRESS_MS is reported on its own.  Polled at ~100 Hz from the
// control task with the poll time passed in.

use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use embedded_hal::digital::InputPin;

use crate::config::*;
use crate::events::ControlEvent;

/// Where the button is in a gesture, judged on the debounced level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gesture {
    Idle,
    /// Down since `since`; `second` when a click is already pending.
    Held { since: Instant, second: bool },
    /// One click seen; it becomes a toggle unless another follows in time.
    ClickPending { released: Instant },
}

pub struct InputManager<P> {
    pin: P,
    tx: Sender<ControlEvent>,
    last_level: bool,
    level_since: Instant,
    gesture: Gesture,
}

impl<P: InputPin> InputManager<P> {
    pub fn new(pin: P, tx: Sender<ControlEvent>, now: Instant) -> Self {
        Self {
            pin,
            tx,
            last_level: true, // pull-up, idle high
            level_since: now,
            gesture: Gesture::Idle,
        }
    }

    pub fn update(&mut self, now: Instant) {
        // A read error counts as released.
        let level = self.pin.is_high().unwrap_or(true);
        if level != self.last_level {
            self.last_level = level;
            self.level_since = now;
        }

        if now.duration_since(self.level_since) >= Duration::from_millis(DEBOUNCE_MS) {
            self.step(!level, now);
        }
        self.expire_pending_click(now);
    }

    /// Advance the gesture on a settled level (`pressed` is active low).
    fn step(&mut self, pressed: bool, now: Instant) {
        self.gesture = match (self.gesture, pressed) {
            (Gesture::Idle, true) => Gesture::Held {
                since: now,
                second: false,
            },
            (Gesture::ClickPending { .. }, true) => Gesture::Held {
                since: now,
                second: true,
            },
            (Gesture::Held { since, second }, false) => {
                if now.duration_since(since) >= Duration::from_millis(LONG_PRESS_MS) {
                    self.emit(ControlEvent::LongPress);
                    Gesture::Idle
                } else if second {
                    self.emit(ControlEvent::ListFiles);
                    Gesture::Idle
                } else {
                    Gesture::ClickPending { released: now }
                }
            }
            (gesture, _) => gesture,
        };
    }

    fn expire_pending_click(&mut self, now: Instant) {
        if let Gesture::ClickPending { released } = self.gesture {
            if now.duration_since(released) > Duration::from_millis(DOUBLE_CLICK_WINDOW_MS) {
                self.emit(ControlEvent::ToggleRecording);
                self.gesture = Gesture::Idle;
            }
        }
    }

    fn emit(&self, event: ControlEvent) {
        if self.tx.send(event).is_err() {
            log::warn!("Control channel closed, dropping {:?}", event);
        }
    }
}
