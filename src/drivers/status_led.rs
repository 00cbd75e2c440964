// WearLog — Status LED
//
// Single GPIO-driven LED.  Steady on while recording, off while paused,
// blinking once the flash log is full and flickering after a fatal halt.

use embedded_hal::digital::OutputPin;

use crate::config::{LED_BLINK_PERIOD_MS, LED_HALT_BLINK_PERIOD_MS};
use crate::drivers::bus_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    Recording,
    Paused,
    StorageFull,
    Halted,
}

pub struct StatusLed<P> {
    pin: P,
    mode: LedMode,
    lit: bool,
}

impl<P: OutputPin> StatusLed<P> {
    pub fn new(mut pin: P) -> anyhow::Result<Self> {
        pin.set_low().map_err(bus_error("status LED"))?;
        Ok(Self {
            pin,
            mode: LedMode::Paused,
            lit: false,
        })
    }

    pub fn mode(&self) -> LedMode {
        self.mode
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    /// `StorageFull` and `Halted` are sticky: nothing short of a reset leaves
    /// them, except that a halt overrides a full log.
    pub fn set_mode(&mut self, mode: LedMode) {
        match self.mode {
            LedMode::Halted => {}
            LedMode::StorageFull if mode != LedMode::Halted => {}
            _ => self.mode = mode,
        }
    }

    /// Drive the pin for the current mode; call periodically.
    pub fn tick(&mut self, now_ms: u64) -> anyhow::Result<()> {
        let want = match self.mode {
            LedMode::Recording => true,
            LedMode::Paused => false,
            LedMode::StorageFull => (now_ms / LED_BLINK_PERIOD_MS) % 2 == 0,
            LedMode::Halted => (now_ms / LED_HALT_BLINK_PERIOD_MS) % 2 == 0,
        };
        if want == self.lit {
            return Ok(());
        }

        if want {
            self.pin.set_high().map_err(bus_error("status LED"))?;
        } else {
            self.pin.set_low().map_err(bus_error("status LED"))?;
        }
        self.lit = want;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::fake::FakePin;

    #[test]
    fn follows_recording_state() {
        let mut led = StatusLed::new(FakePin::default()).unwrap();
        led.tick(0).unwrap();
        assert!(!led.is_lit());

        led.set_mode(LedMode::Recording);
        led.tick(10).unwrap();
        led.tick(20).unwrap();
        assert!(led.pin.high);
        // Initial low, then a single rising edge.
        assert_eq!(led.pin.transitions, vec![false, true]);

        led.set_mode(LedMode::Paused);
        led.tick(30).unwrap();
        assert!(!led.pin.high);
    }

    #[test]
    fn storage_full_blinks_and_sticks() {
        let mut led = StatusLed::new(FakePin::default()).unwrap();
        led.set_mode(LedMode::StorageFull);
        led.set_mode(LedMode::Recording);
        assert_eq!(led.mode(), LedMode::StorageFull);

        let levels: Vec<bool> = [0, 499, 500, 999, 1000]
            .iter()
            .map(|&t| {
                led.tick(t).unwrap();
                led.is_lit()
            })
            .collect();
        assert_eq!(levels, vec![true, true, false, false, true]);
    }

    #[test]
    fn halt_overrides_everything_and_sticks() {
        let mut led = StatusLed::new(FakePin::default()).unwrap();
        led.set_mode(LedMode::StorageFull);
        led.set_mode(LedMode::Halted);
        led.set_mode(LedMode::Recording);
        led.set_mode(LedMode::StorageFull);
        assert_eq!(led.mode(), LedMode::Halted);

        let levels: Vec<bool> = [0, 99, 100, 200]
            .iter()
            .map(|&t| {
                led.tick(t).unwrap();
                led.is_lit()
            })
            .collect();
        assert_eq!(levels, vec![true, true, false, true]);
    }
}
