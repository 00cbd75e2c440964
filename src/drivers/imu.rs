// WearLog — MPU6050 Motion Driver
//
// Register-level driver over the shared I2C bus (address 0x69, the RTC sits
// on 0x68).  The chip raises its INT pin at 100 Hz; the ISR only sets the
// motion readiness flag, and the scheduler fetches the accelerometer burst.

use std::sync::Arc;

use embedded_hal::i2c::I2c;

use crate::acquisition::{AcquisitionState, Sample, SensorSource};
use crate::config::*;
use crate::drivers::{bus_error, lock, SharedBus};
use crate::record::Tag;

// MPU6050 register addresses
const REG_SMPLRT_DIV: u8 = 0x19;
const REG_CONFIG: u8 = 0x1A;
const REG_GYRO_CONFIG: u8 = 0x1B;
const REG_ACCEL_CONFIG: u8 = 0x1C;
const REG_INT_ENABLE: u8 = 0x38;
const REG_INT_STATUS: u8 = 0x3A;
const REG_ACCEL_XOUT_H: u8 = 0x3B; // Start of 6-byte accelerometer burst
const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_WHO_AM_I: u8 = 0x75;
const WHO_AM_I_EXPECTED: u8 = 0x68;

const PWR_SLEEP: u8 = 0x40;
const INT_DATA_RDY: u8 = 0x01;

pub struct Mpu6050<B: 'static> {
    bus: SharedBus<B>,
}

impl<B: I2c + 'static> Mpu6050<B> {
    pub fn new(bus: SharedBus<B>) -> Self {
        Self { bus }
    }

    /// Verify the device is reachable on the I2C bus.
    pub fn is_connected(&self) -> bool {
        let mut bus = lock(self.bus);
        let mut buf = [0u8; 1];
        match bus.write_read(I2C_ADDR_MPU6050, &[REG_WHO_AM_I], &mut buf) {
            Ok(()) => buf[0] == WHO_AM_I_EXPECTED,
            Err(_) => false,
        }
    }

    /// Wake the sensor and configure accel (±8 g), gyro (±500 °/s),
    /// DLPF 21 Hz, 100 Hz sample rate with the data-ready interrupt.
    pub fn init(&self) -> anyhow::Result<()> {
        let mut bus = lock(self.bus);

        let setup = [
            [REG_PWR_MGMT_1, 0x00],   // Wake up (clear SLEEP bit)
            [REG_CONFIG, 0x04],       // DLPF bandwidth 21 Hz
            [REG_SMPLRT_DIV, 9],      // 1 kHz / (1 + 9) = 100 Hz
            [REG_GYRO_CONFIG, 0x08],  // ±500 °/s
            [REG_ACCEL_CONFIG, 0x10], // ±8 g
            [REG_INT_ENABLE, INT_DATA_RDY],
        ];
        for cmd in &setup {
            bus.write(I2C_ADDR_MPU6050, cmd)
                .map_err(bus_error("MPU6050 init"))?;
        }

        log::info!("MPU6050 initialised (±8g, ±500°/s, DLPF 21Hz, 100Hz)");
        Ok(())
    }

    pub fn set_sleep(&self, sleep: bool) -> anyhow::Result<()> {
        let mut bus = lock(self.bus);
        let mut pwr = [0u8; 1];
        bus.write_read(I2C_ADDR_MPU6050, &[REG_PWR_MGMT_1], &mut pwr)
            .map_err(bus_error("MPU6050 PWR_MGMT_1 read"))?;

        let value = if sleep { pwr[0] | PWR_SLEEP } else { pwr[0] & !PWR_SLEEP };
        bus.write(I2C_ADDR_MPU6050, &[REG_PWR_MGMT_1, value])
            .map_err(bus_error("MPU6050 PWR_MGMT_1 write"))
    }

    /// Read (and thereby clear) the interrupt status, then burst-read the
    /// three accelerometer axes in raw counts.  `None` when no new sample
    /// was latched.
    pub fn read_accel(&self) -> anyhow::Result<Option<[i16; 3]>> {
        let mut bus = lock(self.bus);

        let mut status = [0u8; 1];
        bus.write_read(I2C_ADDR_MPU6050, &[REG_INT_STATUS], &mut status)
            .map_err(bus_error("MPU6050 INT_STATUS read"))?;
        if status[0] & INT_DATA_RDY == 0 {
            return Ok(None);
        }

        let mut raw = [0u8; 6];
        bus.write_read(I2C_ADDR_MPU6050, &[REG_ACCEL_XOUT_H], &mut raw)
            .map_err(bus_error("MPU6050 accel read"))?;

        Ok(Some([
            i16::from_be_bytes([raw[0], raw[1]]),
            i16::from_be_bytes([raw[2], raw[3]]),
            i16::from_be_bytes([raw[4], raw[5]]),
        ]))
    }
}

// ---------------------------------------------------------------------------
// Motion source ("A:x:y:z")
// ---------------------------------------------------------------------------
pub struct MotionSource<B: 'static> {
    imu: Mpu6050<B>,
    state: Arc<AcquisitionState>,
    powered_down: bool,
}

impl<B: I2c + 'static> MotionSource<B> {
    pub fn new(imu: Mpu6050<B>, state: Arc<AcquisitionState>) -> Self {
        Self {
            imu,
            state,
            powered_down: false,
        }
    }
}

impl<B: I2c + 'static> SensorSource for MotionSource<B> {
    fn tag(&self) -> Tag {
        Tag::Motion
    }

    fn poll(&mut self) -> anyhow::Result<Sample> {
        if !self.state.motion.take() {
            return Ok(Sample::Idle);
        }
        Ok(match self.imu.read_accel()? {
            Some([x, y, z]) => Sample::Ready(format!("{}:{}:{}", x, y, z)),
            None => Sample::Idle,
        })
    }

    fn set_power(&mut self, enabled: bool) -> anyhow::Result<()> {
        if self.powered_down != enabled {
            return Ok(());
        }
        self.imu.set_sleep(!enabled)?;
        self.powered_down = !enabled;
        Ok(())
    }
}
