// WearLog — Firmware Entry Point
//
// Boot sequence:
//   1. Logger, peripherals, shared I2C bus and SPI host.
//   2. AFE4400 brought up and parked while the external flash is mounted.
//   3. Readiness interrupts and the EDA timer armed.
//   4. Flash store opened (catalog seeded from the directory).
//   5. MPU6050 and RTC checked, scheduler assembled.
//   6. Acquisition and control tasks spawned.
//
// Acquisition stops for good on a fatal storage error; the acquisition task
// then reports the fault on the console until reset.

#[cfg(target_os = "espidf")]
mod board;

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use esp_idf_hal::gpio::{AnyIOPin, PinDriver, Pull};
    use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_hal::prelude::*;
    use esp_idf_hal::spi::{config, SpiDeviceDriver, SpiDriver};

    use wearlog::acquisition::{AcquisitionState, Scheduler, SensorSource};
    use wearlog::config::*;
    use wearlog::drivers::afe4400::{Afe4400, AfeBusPeer, PpgSource};
    use wearlog::drivers::eda::EdaSource;
    use wearlog::drivers::imu::{MotionSource, Mpu6050};
    use wearlog::drivers::rtc::{M41t62, RtcClock};
    use wearlog::drivers::status_led::StatusLed;
    use wearlog::storage::{BusArbiter, DirFs, FlashStore, LogWriter};
    use wearlog::tasks;
    use wearlog::tasks::control::ControlSurface;

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("WearLog firmware starting…");

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;
    let state = AcquisitionState::new();

    // ---- I2C bus (shared between RTC and MPU6050) --------------------------
    let i2c_config = I2cConfig::new().baudrate(400u32.kHz().into());
    let i2c = I2cDriver::new(peripherals.i2c0, pins.gpio8, pins.gpio9, &i2c_config)?;
    let i2c_bus: &'static Mutex<I2cDriver<'static>> = Box::leak(Box::new(Mutex::new(i2c)));

    // ---- SPI host (shared between NOR flash and AFE4400) -------------------
    let spi = SpiDriver::new(
        peripherals.spi2,
        pins.gpio12,       // SCLK
        pins.gpio11,       // MOSI
        Some(pins.gpio13), // MISO
        &config::DriverConfig::new(),
    )?;
    let afe_spi = SpiDeviceDriver::new(
        spi,
        Option::<AnyIOPin>::None,
        &config::Config::new().baudrate(AFE_SPI_FREQ_HZ.Hz()),
    )?;

    let mut afe = Afe4400::new(
        board::AfeSpi(afe_spi),
        PinDriver::output(pins.gpio10)?, // CS
        PinDriver::output(pins.gpio7)?,  // PDN
    )?;
    afe.init()?;
    let afe = Arc::new(Mutex::new(afe));

    let mut bus = BusArbiter::new(AfeBusPeer(afe.clone()), PinDriver::output(pins.gpio15)?)?;
    bus.acquire_for_storage()?;
    board::mount_external_flash()?;
    bus.release_from_storage()?;

    // ---- Readiness sources -------------------------------------------------
    // The ISRs and the timer hold this reference for the programme's life.
    let isr_state: &'static AcquisitionState = Box::leak(Box::new(Arc::clone(&state)));
    let gate = board::BoardGate::start(isr_state)?;

    // ---- Storage -----------------------------------------------------------
    let (control_tx, control_rx) = mpsc::channel();
    let flash_dir = DirFs::new(FLASH_MOUNT_POINT)?;
    log::info!("Logging to {}", flash_dir.root().display());
    let store = FlashStore::open(flash_dir, bus, Box::new(gate), StorageConfig::default())?
        .with_notifier(control_tx.clone());
    let writer = LogWriter::new(store, state.clone())?;

    // ---- Sensors -----------------------------------------------------------
    let imu = Mpu6050::new(i2c_bus);
    if !imu.is_connected() {
        log::error!("MPU6050 not found at 0x{:02X}", I2C_ADDR_MPU6050);
    }
    imu.init()?;

    let rtc = M41t62::new(i2c_bus);
    match rtc.read_time() {
        Ok(ts) => log::info!("RTC time {}", ts),
        Err(e) => log::error!("RTC read failed: {:#}", e),
    }

    let sources: Vec<Box<dyn SensorSource + Send>> = vec![
        Box::new(EdaSource::new(board::OneshotAdc::new()?, state.clone())),
        Box::new(MotionSource::new(imu, state.clone())),
        Box::new(PpgSource::new(afe, state.clone())),
    ];
    let scheduler = Scheduler::new(sources, Box::new(RtcClock(rtc)), writer, state.clone());
    state.set_recording_enabled(RECORD_ON_BOOT);

    // ---- Control surface ---------------------------------------------------
    let mut button = PinDriver::input(pins.gpio0)?;
    button.set_pull(Pull::Up)?;
    let led = StatusLed::new(PinDriver::output(pins.gpio4)?)?;
    let surface = ControlSurface::new(button, led, control_tx, control_rx, state.clone());

    // ---- Spawn tasks (map to FreeRTOS tasks via std::thread) ---------------
    thread::Builder::new()
        .name("acquisition".into())
        .stack_size(STACK_ACQUISITION)
        .spawn(move || tasks::acquisition::acquisition_task(scheduler))?;

    thread::Builder::new()
        .name("control".into())
        .stack_size(STACK_CONTROL)
        .spawn(move || tasks::control::control_task(surface))?;

    log::info!("Boot complete, recording {}", if RECORD_ON_BOOT { "on" } else { "off" });

    // Main thread has nothing left to do.
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

/// Host builds only exercise the library.
#[cfg(not(target_os = "espidf"))]
fn main() {}
