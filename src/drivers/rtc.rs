// WearLog — M41T62 Real-Time Clock
//
// Eight BCD time-keeping registers (centiseconds through year) plus a
// calibration register, one byte per transfer over the shared I2C bus.

use embedded_hal::i2c::I2c;

use crate::acquisition::Clock;
use crate::config::I2C_ADDR_RTC;
use crate::drivers::{bus_error, lock, SharedBus};
use crate::record::Timestamp;

const REG_CENTISECONDS: u8 = 0x00;
const REG_SECONDS: u8 = 0x01;
const REG_MINUTES: u8 = 0x02;
const REG_HOURS: u8 = 0x03;
const REG_DAY: u8 = 0x04;
const REG_DATE: u8 = 0x05;
const REG_MONTH: u8 = 0x06;
const REG_YEAR: u8 = 0x07;
const REG_CALIBRATION: u8 = 0x08;

// Field masks strip the control bits sharing each register.
const MASK_SECONDS: u8 = 0x7F;
const MASK_HOURS: u8 = 0x3F;
const MASK_DAY: u8 = 0x07;
const MASK_DATE: u8 = 0x3F;
const MASK_MONTH: u8 = 0x3F;
const MASK_YEAR: u8 = 0x1F;

const CAL_MAGNITUDE: u8 = 0x1F;
const CAL_SIGN: u8 = 0x20;

const YEAR_BASE: u16 = 2000;

pub fn dec_to_bcd(dec: u8) -> u8 {
    ((dec / 10) << 4) | (dec % 10)
}

pub fn bcd_to_dec(bcd: u8) -> u8 {
    10 * ((bcd & 0xF0) >> 4) + (bcd & 0x0F)
}

pub struct M41t62<B: 'static> {
    bus: SharedBus<B>,
}

impl<B: I2c + 'static> M41t62<B> {
    pub fn new(bus: SharedBus<B>) -> Self {
        Self { bus }
    }

    fn read_reg(&self, reg: u8) -> anyhow::Result<u8> {
        let mut buf = [0u8; 1];
        lock(self.bus)
            .write_read(I2C_ADDR_RTC, &[reg], &mut buf)
            .map_err(bus_error("M41T62 read"))?;
        Ok(buf[0])
    }

    fn write_reg(&self, reg: u8, value: u8) -> anyhow::Result<()> {
        lock(self.bus)
            .write(I2C_ADDR_RTC, &[reg, value])
            .map_err(bus_error("M41T62 write"))
    }

    fn read_field(&self, reg: u8, mask: u8) -> anyhow::Result<u8> {
        Ok(bcd_to_dec(self.read_reg(reg)? & mask))
    }

    fn write_field(&self, reg: u8, mask: u8, value: u8) -> anyhow::Result<()> {
        self.write_reg(reg, dec_to_bcd(value) & mask)
    }

    /// Current wall-clock time; the two-digit year counts from 2000.
    pub fn read_time(&self) -> anyhow::Result<Timestamp> {
        let centis = self.read_field(REG_CENTISECONDS, 0xFF)?;
        Ok(Timestamp {
            year: YEAR_BASE + self.read_field(REG_YEAR, MASK_YEAR)? as u16,
            month: self.read_field(REG_MONTH, MASK_MONTH)?,
            day: self.read_field(REG_DATE, MASK_DATE)?,
            hour: self.read_field(REG_HOURS, MASK_HOURS)?,
            minute: self.read_field(REG_MINUTES, 0xFF)?,
            second: self.read_field(REG_SECONDS, MASK_SECONDS)?,
            subsecond: centis as u16 * 10,
        })
    }

    pub fn set_time(&self, ts: &Timestamp) -> anyhow::Result<()> {
        anyhow::ensure!(
            (YEAR_BASE..YEAR_BASE + 100).contains(&ts.year),
            "year {} outside the RTC range",
            ts.year
        );
        let centis = (ts.subsecond / 10).min(99) as u8;
        self.write_field(REG_CENTISECONDS, 0xFF, centis)?;
        self.write_field(REG_SECONDS, MASK_SECONDS, ts.second)?;
        self.write_field(REG_MINUTES, 0xFF, ts.minute)?;
        self.write_field(REG_HOURS, MASK_HOURS, ts.hour)?;
        self.write_field(REG_DATE, MASK_DATE, ts.day)?;
        self.write_field(REG_MONTH, MASK_MONTH, ts.month)?;
        self.write_field(REG_YEAR, MASK_YEAR, (ts.year - YEAR_BASE) as u8)?;
        log::info!("RTC set to {}", ts);
        Ok(())
    }

    pub fn weekday(&self) -> anyhow::Result<u8> {
        self.read_field(REG_DAY, MASK_DAY)
    }

    pub fn set_weekday(&self, day: u8) -> anyhow::Result<()> {
        self.write_field(REG_DAY, MASK_DAY, day)
    }

    /// Magnitude of the oscillator trim.  The sign bit is ignored on read.
    pub fn calibration(&self) -> anyhow::Result<i8> {
        Ok((self.read_reg(REG_CALIBRATION)? & CAL_MAGNITUDE) as i8)
    }

    /// Only strictly positive offsets set the sign bit.
    pub fn set_calibration(&self, offset: i8) -> anyhow::Result<()> {
        let mut value = (offset as u8) & CAL_MAGNITUDE;
        if offset > 0 {
            value |= CAL_SIGN;
        }
        self.write_reg(REG_CALIBRATION, value)
    }
}

pub struct RtcClock<B: 'static>(pub M41t62<B>);

impl<B: I2c + 'static> Clock for RtcClock<B> {
    fn now(&mut self) -> anyhow::Result<Timestamp> {
        self.0.read_time()
    }
}
