// WearLog — Board Support (ESP32-S3)
//
// Device-side implementations of the library seams: the EDA ADC channel,
// readiness interrupts, the readiness gate used around flash access, the
// AFE's view of the shared SPI host, and the FAT mount of the external NOR
// chip.  Raw ESP-IDF calls where esp-idf-hal has no wrapper.

use std::ffi::{c_void, CString};
use std::time::Duration;

use esp_idf_hal::spi::{SpiDeviceDriver, SpiDriver};
use esp_idf_svc::sys::{self as sys, esp, EspError};
use esp_idf_svc::timer::{EspTaskTimerService, EspTimer};

use wearlog::acquisition::{AcquisitionState, ReadinessGate, ReadyFlag};
use wearlog::config::*;
use wearlog::drivers::eda::AdcRead;

// ---------------------------------------------------------------------------
// EDA ADC channel (ADC1, 11 dB attenuation, 12-bit)
// ---------------------------------------------------------------------------
pub struct OneshotAdc {
    handle: sys::adc_oneshot_unit_handle_t,
    channel: sys::adc_channel_t,
}

// The handle is only used from the acquisition task.
unsafe impl Send for OneshotAdc {}

impl OneshotAdc {
    pub fn new() -> anyhow::Result<Self> {
        let mut handle: sys::adc_oneshot_unit_handle_t = core::ptr::null_mut();
        let channel = EDA_ADC_CHANNEL as sys::adc_channel_t;
        unsafe {
            let unit_cfg = sys::adc_oneshot_unit_init_cfg_t {
                unit_id: sys::adc_unit_t_ADC_UNIT_1,
                ulp_mode: sys::adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
                ..core::mem::zeroed()
            };
            esp!(sys::adc_oneshot_new_unit(&unit_cfg, &mut handle))?;

            let chan_cfg = sys::adc_oneshot_chan_cfg_t {
                atten: sys::adc_atten_t_ADC_ATTEN_DB_11,
                bitwidth: sys::adc_bitwidth_t_ADC_BITWIDTH_12,
            };
            esp!(sys::adc_oneshot_config_channel(handle, channel, &chan_cfg))?;
        }
        Ok(Self { handle, channel })
    }
}

impl AdcRead for OneshotAdc {
    fn read_raw(&mut self) -> anyhow::Result<u16> {
        let mut raw: i32 = 0;
        esp!(unsafe { sys::adc_oneshot_read(self.handle, self.channel, &mut raw) })?;
        Ok(raw.clamp(0, u16::MAX as i32) as u16)
    }
}

// ---------------------------------------------------------------------------
// Readiness interrupts
// ---------------------------------------------------------------------------
unsafe extern "C" fn raise_flag(arg: *mut c_void) {
    let flag = &*(arg as *const ReadyFlag);
    flag.raise();
}

/// Rising-edge ISR on `pin` that raises `flag`.
fn attach_ready_isr(pin: i32, flag: &'static ReadyFlag) -> Result<(), EspError> {
    unsafe {
        esp!(sys::gpio_set_direction(pin, sys::gpio_mode_t_GPIO_MODE_INPUT))?;
        esp!(sys::gpio_set_intr_type(pin, sys::gpio_int_type_t_GPIO_INTR_POSEDGE))?;
        esp!(sys::gpio_isr_handler_add(
            pin,
            Some(raise_flag),
            flag as *const ReadyFlag as *mut c_void,
        ))?;
        esp!(sys::gpio_intr_enable(pin))
    }
}

/// Masks the MPU and AFE data-ready interrupts and pauses the EDA timer.
pub struct BoardGate {
    eda_timer: EspTimer<'static>,
}

impl BoardGate {
    /// Install the ISRs and start the EDA timer.
    pub fn start(state: &'static AcquisitionState) -> anyhow::Result<Self> {
        unsafe {
            // Already installed is fine.
            let ret = sys::gpio_install_isr_service(0);
            if ret != sys::ESP_OK && ret != sys::ESP_ERR_INVALID_STATE as sys::esp_err_t {
                esp!(ret)?;
            }
        }
        attach_ready_isr(PIN_MPU_INT, &state.motion)?;
        attach_ready_isr(PIN_AFE_ADC_RDY, &state.ppg)?;

        let timers = EspTaskTimerService::new()?;
        let eda_timer = timers.timer(move || state.eda.raise())?;
        eda_timer.every(Duration::from_millis(EDA_SAMPLE_INTERVAL_MS))?;

        log::info!(
            "Readiness sources armed (MPU GPIO{}, AFE GPIO{}, EDA {} ms)",
            PIN_MPU_INT,
            PIN_AFE_ADC_RDY,
            EDA_SAMPLE_INTERVAL_MS
        );
        Ok(Self { eda_timer })
    }
}

impl ReadinessGate for BoardGate {
    fn suspend(&mut self) {
        unsafe {
            sys::gpio_intr_disable(PIN_MPU_INT);
            sys::gpio_intr_disable(PIN_AFE_ADC_RDY);
        }
        if let Err(e) = self.eda_timer.cancel() {
            log::warn!("EDA timer cancel failed: {}", e);
        }
    }

    fn resume(&mut self) {
        unsafe {
            sys::gpio_intr_enable(PIN_MPU_INT);
            sys::gpio_intr_enable(PIN_AFE_ADC_RDY);
        }
        if let Err(e) = self.eda_timer.every(Duration::from_millis(EDA_SAMPLE_INTERVAL_MS)) {
            log::warn!("EDA timer restart failed: {}", e);
        }
    }
}

// ---------------------------------------------------------------------------
// AFE side of the SPI host
// ---------------------------------------------------------------------------
/// Each call is its own SPI transaction, so the host bus lock is released
/// between calls and the flash driver can interleave.  The AFE chip select is
/// a plain GPIO held by the driver.
pub struct AfeSpi(pub SpiDeviceDriver<'static, SpiDriver<'static>>);

impl embedded_hal::spi::ErrorType for AfeSpi {
    type Error = <SpiDeviceDriver<'static, SpiDriver<'static>> as embedded_hal::spi::ErrorType>::Error;
}

impl embedded_hal::spi::SpiBus for AfeSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        embedded_hal::spi::SpiDevice::read(&mut self.0, words)
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        embedded_hal::spi::SpiDevice::write(&mut self.0, words)
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        embedded_hal::spi::SpiDevice::transfer(&mut self.0, read, write)
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        embedded_hal::spi::SpiDevice::transfer_in_place(&mut self.0, words)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// External NOR flash, FAT over wear levelling, mounted at FLASH_MOUNT_POINT
// ---------------------------------------------------------------------------
const FLASH_PARTITION_LABEL: &str = "log";

/// Register the chip on SPI2 (bus already initialised by the SPI driver),
/// expose it as one data partition and mount it.
pub fn mount_external_flash() -> anyhow::Result<()> {
    let label = CString::new(FLASH_PARTITION_LABEL)?;
    let base = CString::new(FLASH_MOUNT_POINT)?;

    unsafe {
        let dev_cfg = sys::esp_flash_spi_device_config_t {
            host_id: sys::spi_host_device_t_SPI2_HOST,
            cs_id: 0,
            cs_io_num: PIN_FLASH_CS,
            io_mode: sys::esp_flash_io_mode_t_SPI_FLASH_SLOWRD,
            freq_mhz: (FLASH_SPI_FREQ_HZ / 1_000_000) as i32,
            ..core::mem::zeroed()
        };
        let mut chip: *mut sys::esp_flash_t = core::ptr::null_mut();
        esp!(sys::spi_bus_add_flash_device(&mut chip, &dev_cfg))?;
        esp!(sys::esp_flash_init(chip))?;

        let mut size: u32 = 0;
        esp!(sys::esp_flash_get_size(chip, &mut size))?;

        let mut partition: *const sys::esp_partition_t = core::ptr::null();
        esp!(sys::esp_partition_register_external(
            chip,
            0,
            size as _,
            label.as_ptr(),
            sys::esp_partition_type_t_ESP_PARTITION_TYPE_DATA,
            sys::esp_partition_subtype_t_ESP_PARTITION_SUBTYPE_DATA_FAT,
            &mut partition,
        ))?;

        let mount_cfg = sys::esp_vfs_fat_mount_config_t {
            format_if_mount_failed: true,
            max_files: 4,
            allocation_unit_size: 4096,
            ..core::mem::zeroed()
        };
        let mut wl: sys::wl_handle_t = 0;
        esp!(sys::esp_vfs_fat_spiflash_mount_rw_wl(
            base.as_ptr(),
            label.as_ptr(),
            &mount_cfg,
            &mut wl,
        ))?;

        log::info!(
            "External flash: {} KiB mounted at {}",
            size / 1024,
            FLASH_MOUNT_POINT
        );
    }
    Ok(())
}
