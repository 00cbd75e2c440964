// WearLog — Control Task
//
// Owns the record button and the status LED.  Polls the button at ~100 Hz
// and processes control events from the input manager and the storage
// engine.

use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::digital::{InputPin, OutputPin};

use crate::acquisition::AcquisitionState;
use crate::config::CONTROL_POLL_INTERVAL_MS;
use crate::drivers::status_led::{LedMode, StatusLed};
use crate::events::ControlEvent;
use crate::input::InputManager;

pub struct ControlSurface<B, L> {
    input: InputManager<B>,
    led: StatusLed<L>,
    rx: Receiver<ControlEvent>,
    state: Arc<AcquisitionState>,
    started: Instant,
    halted: bool,
}

impl<B: InputPin, L: OutputPin> ControlSurface<B, L> {
    /// `tx` feeds the same channel as `rx`; the input manager posts on it.
    pub fn new(
        button: B,
        led: StatusLed<L>,
        tx: Sender<ControlEvent>,
        rx: Receiver<ControlEvent>,
        state: Arc<AcquisitionState>,
    ) -> Self {
        let started = Instant::now();
        let recording = state.recording_enabled();
        let mut surface = Self {
            input: InputManager::new(button, tx, started),
            led,
            rx,
            state,
            started,
            halted: false,
        };
        surface.show_recording(recording);
        surface
    }

    pub fn led_mode(&self) -> LedMode {
        self.led.mode()
    }

    /// One poll: button, pending events, LED.
    pub fn poll(&mut self, now: Instant) {
        self.input.update(now);

        while let Ok(event) = self.rx.try_recv() {
            self.handle(event);
        }

        let now_ms = now.duration_since(self.started).as_millis() as u64;
        if let Err(e) = self.led.tick(now_ms) {
            log::warn!("Status LED error: {:#}", e);
        }
    }

    fn handle(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::ToggleRecording if self.halted => {
                log::warn!("Button ignored, storage halted until reset");
            }

            ControlEvent::ToggleRecording => {
                let enabled = self.state.toggle_recording();
                log::info!("Button: recording {}", if enabled { "on" } else { "off" });
                self.show_recording(enabled);
            }

            ControlEvent::ListFiles => {
                log::info!("Button: file listing requested");
                self.state.request_file_listing();
            }

            ControlEvent::LongPress => {
                log::info!("Button: long press");
            }

            ControlEvent::CapacityExhausted => {
                log::warn!("Flash full, logging has stopped until reset");
                self.led.set_mode(LedMode::StorageFull);
            }

            ControlEvent::StorageHalted => {
                log::error!("Storage halted, recording locked off until reset");
                self.halted = true;
                self.state.set_recording_enabled(false);
                self.led.set_mode(LedMode::Halted);
            }
        }
    }

    fn show_recording(&mut self, enabled: bool) {
        self.led.set_mode(if enabled {
            LedMode::Recording
        } else {
            LedMode::Paused
        });
    }
}

pub fn control_task<B: InputPin, L: OutputPin>(mut surface: ControlSurface<B, L>) -> ! {
    log::info!("Control task started");

    let poll_interval = Duration::from_millis(CONTROL_POLL_INTERVAL_MS);
    loop {
        surface.poll(Instant::now());
        thread::sleep(poll_interval);
    }
}
