// WearLog — Hardware & System Configuration
// Target: ESP32-S3-DevKitC-1 on the sensor carrier board

use std::time::Duration;

// ---------------------------------------------------------------------------
// GPIO Pin Definitions
// ---------------------------------------------------------------------------
pub const PIN_BUTTON: i32 = 0;        // BOOT — Record toggle button (INPUT_PULLUP, active LOW)
pub const PIN_EDA_ADC: i32 = 2;       // EDA op-amp output
pub const EDA_ADC_CHANNEL: u32 = 1;   // GPIO2 is ADC1 channel 1
pub const PIN_STATUS_LED: i32 = 4;    // Power / status LED
pub const PIN_MPU_INT: i32 = 5;       // MPU6050 data-ready interrupt
pub const PIN_AFE_ADC_RDY: i32 = 6;   // AFE4400 ADC_RDY interrupt
pub const PIN_AFE_PDN: i32 = 7;       // AFE4400 power-down (active LOW)
pub const PIN_I2C_SDA: i32 = 8;       // I2C data line
pub const PIN_I2C_SCL: i32 = 9;       // I2C clock line
pub const PIN_AFE_CS: i32 = 10;       // AFE4400 SPI chip select
pub const PIN_SPI_MOSI: i32 = 11;     // SPI2 IOMUX
pub const PIN_SPI_SCLK: i32 = 12;     // SPI2 IOMUX
pub const PIN_SPI_MISO: i32 = 13;     // SPI2 IOMUX
pub const PIN_FLASH_CS: i32 = 14;     // NOR flash chip select
pub const PIN_FLASH_AUX_CS: i32 = 15; // second (unpopulated) memory footprint select

// ---------------------------------------------------------------------------
// I2C Bus (shared between RTC and MPU6050)
// ---------------------------------------------------------------------------
pub const I2C_ADDR_RTC: u8 = 0x68;
pub const I2C_ADDR_MPU6050: u8 = 0x69; // AD0 high, the RTC owns 0x68

// ---------------------------------------------------------------------------
// SPI Bus (shared between NOR flash and AFE4400)
// ---------------------------------------------------------------------------
pub const AFE_SPI_FREQ_HZ: u32 = 20_000_000;
pub const FLASH_SPI_FREQ_HZ: u32 = 20_000_000;

// ---------------------------------------------------------------------------
// Task Stack Sizes (bytes)
// ---------------------------------------------------------------------------
pub const STACK_ACQUISITION: usize = 32 * 1024; // holds the 16 KiB log buffer's owner
pub const STACK_CONTROL: usize = 4096;

// ---------------------------------------------------------------------------
// Timing (milliseconds)
// ---------------------------------------------------------------------------
pub const EDA_SAMPLE_INTERVAL_MS: u64 = 80;   // ~12 Hz
pub const CONTROL_POLL_INTERVAL_MS: u64 = 10; // 100 Hz button poll
pub const DEBOUNCE_MS: u64 = 50;
pub const LONG_PRESS_MS: u64 = 3000;
pub const DOUBLE_CLICK_WINDOW_MS: u64 = 400;
pub const HALT_REPORT_INTERVAL_MS: u64 = 2500;
pub const LED_BLINK_PERIOD_MS: u64 = 500;
pub const LED_HALT_BLINK_PERIOD_MS: u64 = 100;

// ---------------------------------------------------------------------------
// Storage geometry
// ---------------------------------------------------------------------------
pub const FILE_SIZE_BYTES: usize = 16384;
pub const FLUSH_THRESHOLD_BYTES: usize = FILE_SIZE_BYTES * 9 / 10; // 14745
pub const MAX_FILES_TO_LOG: u32 = 3900;                            // chip capacity / file size, with headroom
pub const READY_POLL_LIMIT: u32 = 50_000;
pub const READY_POLL_INTERVAL: Duration = Duration::from_micros(20);

/// Recording Enable state after reset.
pub const RECORD_ON_BOOT: bool = true;

pub const FILE_NAME_PREFIX: &str = "r";
pub const FILE_NAME_EXTENSION: &str = ".txt";
pub const FLASH_MOUNT_POINT: &str = "/flash";

/// Geometry and limits of the flash log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageConfig {
    /// Capacity C of the in-memory buffer and of every file.
    pub file_size: usize,
    /// Fill level T at which the buffer is flushed before accepting more.
    pub flush_threshold: usize,
    /// Maximum number of files M the catalog may hold.
    pub max_files: u32,
    /// Device-ready polls before the device is declared stalled.
    pub ready_poll_limit: u32,
    pub ready_poll_interval: Duration,
}

impl StorageConfig {
    pub fn new(file_size: usize, flush_threshold: usize, max_files: u32) -> anyhow::Result<Self> {
        let cfg = Self {
            file_size,
            flush_threshold,
            max_files,
            ..Self::default()
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// `0 < T < C` and `M >= 1`.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.flush_threshold > 0 && self.flush_threshold < self.file_size,
            "flush threshold {} must lie strictly between 0 and the file size {}",
            self.flush_threshold,
            self.file_size
        );
        anyhow::ensure!(self.max_files > 0, "max file count must be at least 1");
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            file_size: FILE_SIZE_BYTES,
            flush_threshold: FLUSH_THRESHOLD_BYTES,
            max_files: MAX_FILES_TO_LOG,
            ready_poll_limit: READY_POLL_LIMIT,
            ready_poll_interval: READY_POLL_INTERVAL,
        }
    }
}

/// `r<index>.txt`
pub fn file_name(index: u32) -> String {
    format!("{}{}{}", FILE_NAME_PREFIX, index, FILE_NAME_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry_matches_board() {
        let cfg = StorageConfig::default();
        assert_eq!(cfg.file_size, 16384);
        assert_eq!(cfg.flush_threshold, 14745);
        assert_eq!(cfg.max_files, 3900);
    }

    #[test]
    fn rejects_threshold_outside_capacity() {
        assert!(StorageConfig::new(112, 112, 2).is_err());
        assert!(StorageConfig::new(112, 0, 2).is_err());
        assert!(StorageConfig::new(112, 100, 0).is_err());
        assert!(StorageConfig::new(112, 100, 2).is_ok());
    }

    #[test]
    fn file_names_use_decimal_index() {
        assert_eq!(file_name(0), "r0.txt");
        assert_eq!(file_name(417), "r417.txt");
    }
}
