// WearLog — AFE4400 PPG Analog Front End
//
// 24-bit register interface over SPI (address byte, then data MSB first) with
// a manually driven chip select.  The AFE shares the SPI bus with the NOR
// flash, so it doubles as the bus peer that the storage engine tri-states
// before every flash transaction.

use std::sync::{Arc, Mutex};

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::acquisition::{AcquisitionState, Sample, SensorSource};
use crate::drivers::{bus_error, lock};
use crate::record::Tag;
use crate::storage::bus::BusPeer;

// ---------------------------------------------------------------------------
// Register map (datasheet SBAS601)
// ---------------------------------------------------------------------------
pub const CONTROL0: u8 = 0x00;
pub const LED2STC: u8 = 0x01;
pub const LED2ENDC: u8 = 0x02;
pub const LED2LEDSTC: u8 = 0x03;
pub const LED2LEDENDC: u8 = 0x04;
pub const ALED2STC: u8 = 0x05;
pub const ALED2ENDC: u8 = 0x06;
pub const LED1STC: u8 = 0x07;
pub const LED1ENDC: u8 = 0x08;
pub const LED1LEDSTC: u8 = 0x09;
pub const LED1LEDENDC: u8 = 0x0A;
pub const ALED1STC: u8 = 0x0B;
pub const ALED1ENDC: u8 = 0x0C;
pub const LED2CONVST: u8 = 0x0D;
pub const LED2CONVEND: u8 = 0x0E;
pub const ALED2CONVST: u8 = 0x0F;
pub const ALED2CONVEND: u8 = 0x10;
pub const LED1CONVST: u8 = 0x11;
pub const LED1CONVEND: u8 = 0x12;
pub const ALED1CONVST: u8 = 0x13;
pub const ALED1CONVEND: u8 = 0x14;
pub const ADCRSTSTCT0: u8 = 0x15;
pub const ADCRSTENDCT0: u8 = 0x16;
pub const ADCRSTSTCT1: u8 = 0x17;
pub const ADCRSTENDCT1: u8 = 0x18;
pub const ADCRSTSTCT2: u8 = 0x19;
pub const ADCRSTENDCT2: u8 = 0x1A;
pub const ADCRSTSTCT3: u8 = 0x1B;
pub const ADCRSTENDCT3: u8 = 0x1C;
pub const PRPCOUNT: u8 = 0x1D;
pub const CONTROL1: u8 = 0x1E;
pub const TIA_AMB_GAIN: u8 = 0x20;
pub const LEDCNTRL: u8 = 0x21;
pub const CONTROL2: u8 = 0x22;
pub const LED2ABSVAL: u8 = 0x2E;
pub const LED1ABSVAL: u8 = 0x2F;
pub const DIAG: u8 = 0x30;

const CONTROL0_SPI_READ: u32 = 1 << 0;
const CONTROL0_RESET: u32 = 0b1010; // SW_RST | TIM_CNT_RST
const CONTROL2_NORMAL: u32 = (1 << 17) | (1 << 11) | (1 << 8);
const CONTROL2_TRI_STATE: u32 = CONTROL2_NORMAL | (1 << 10);

// LED current in mA; 50 mA max, typically < 20 mA
const CURRENT_LED1_MA: f32 = 15.0;
const CURRENT_LED2_MA: f32 = 15.0;

/// Sample/convert/reset phase boundaries for a 100 Hz pulse repetition
/// period (4 MHz / (39999 + 1)).
const TIMINGS_100HZ: [(u8, u32); 29] = [
    (PRPCOUNT, 0x009C3F),
    // Sample phases
    (ALED2STC, 0x000050),
    (ALED2ENDC, 0x0007CE),
    (LED1STC, 0x002760),
    (LED1ENDC, 0x002EDE),
    (ALED1STC, 0x004E70),
    (ALED1ENDC, 0x0055EE),
    (LED2STC, 0x007580),
    (LED2ENDC, 0x007CFE),
    // LED on phases
    (LED1LEDSTC, 0x002710),
    (LED1LEDENDC, 0x002EDF),
    (LED2LEDSTC, 0x007530),
    (LED2LEDENDC, 0x007CFF),
    // ADC conversion phases
    (ALED2CONVST, 0x002716),
    (ALED2CONVEND, 0x004E1F),
    (LED1CONVST, 0x004E26),
    (LED1CONVEND, 0x00752F),
    (ALED1CONVST, 0x007536),
    (ALED1CONVEND, 0x009C3F),
    (LED2CONVST, 0x000006),
    (LED2CONVEND, 0x00270F),
    // ADC reset phases
    (ADCRSTSTCT0, 0x000000),
    (ADCRSTENDCT0, 0x000005),
    (ADCRSTSTCT1, 0x002710),
    (ADCRSTENDCT1, 0x002715),
    (ADCRSTSTCT2, 0x004E20),
    (ADCRSTENDCT2, 0x004E25),
    (ADCRSTSTCT3, 0x007530),
    (ADCRSTENDCT3, 0x007535),
];

/// 22-bit two's complement ADC code to [-1.0, 1.0).
pub fn convert_adc_to_float(data: u32) -> f32 {
    let code = ((data << 10) as i32) >> 10;
    code as f32 / 2_097_152.0
}

fn led_drive(current_ma: f32) -> u32 {
    (current_ma / 50.0 * 256.0) as u32
}

pub struct Afe4400<SPI, CS, PDN> {
    spi: SPI,
    cs: CS,
    pdn: PDN,
    powered_down: bool,
}

impl<SPI, CS, PDN> Afe4400<SPI, CS, PDN>
where
    SPI: SpiBus,
    CS: OutputPin,
    PDN: OutputPin,
{
    pub fn new(spi: SPI, mut cs: CS, mut pdn: PDN) -> anyhow::Result<Self> {
        cs.set_high().map_err(bus_error("AFE4400 CS"))?;
        pdn.set_high().map_err(bus_error("AFE4400 PDN"))?;
        Ok(Self {
            spi,
            cs,
            pdn,
            powered_down: false,
        })
    }

    pub fn write_reg(&mut self, address: u8, data: u32) -> anyhow::Result<()> {
        let frame = [
            address,
            ((data >> 16) & 0xFF) as u8,
            ((data >> 8) & 0xFF) as u8,
            (data & 0xFF) as u8,
        ];
        self.cs.set_low().map_err(bus_error("AFE4400 CS"))?;
        let result = self.spi.write(&frame).and_then(|()| self.spi.flush());
        self.cs.set_high().map_err(bus_error("AFE4400 CS"))?;
        result.map_err(bus_error("AFE4400 write"))
    }

    pub fn read_reg(&mut self, address: u8) -> anyhow::Result<u32> {
        let mut frame = [address, 0, 0, 0];
        self.cs.set_low().map_err(bus_error("AFE4400 CS"))?;
        let result = self
            .spi
            .transfer_in_place(&mut frame)
            .and_then(|()| self.spi.flush());
        self.cs.set_high().map_err(bus_error("AFE4400 CS"))?;
        result.map_err(bus_error("AFE4400 read"))?;

        Ok(((frame[1] as u32) << 16) | ((frame[2] as u32) << 8) | frame[3] as u32)
    }

    /// Register writes are only accepted with SPI_READ cleared.
    fn write_in_write_mode(&mut self, address: u8, data: u32) -> anyhow::Result<()> {
        self.write_reg(CONTROL0, 0)?;
        self.write_reg(address, data)?;
        self.write_reg(CONTROL0, CONTROL0_SPI_READ)
    }

    /// Reset, program the transimpedance amplifier and LED drive, load the
    /// 100 Hz timing table and leave the device in read mode.
    pub fn init(&mut self) -> anyhow::Result<()> {
        self.write_reg(CONTROL0, CONTROL0_RESET)?;

        // TIA parameters (datasheet pg. 24-26)
        let ambdac: u32 = 0b0100; // Ambient DAC value
        let stage2en: u32 = 0b1; // Stage 2 enable for LED 2
        let stg2gain: u32 = 0b010; // Stage 2 gain
        let cf_led: u32 = 0b10000; // CF for LEDs
        let rf_led: u32 = 0b110; // RF for LEDs
        self.write_reg(
            TIA_AMB_GAIN,
            (ambdac << 16) | (stage2en << 14) | (stg2gain << 8) | (cf_led << 3) | rf_led,
        )?;

        self.write_reg(CONTROL2, CONTROL2_NORMAL)?;
        self.write_reg(
            LEDCNTRL,
            (1 << 16) | (led_drive(CURRENT_LED1_MA) << 8) | led_drive(CURRENT_LED2_MA),
        )?;
        // Internal timer on
        self.write_reg(CONTROL1, (1 << 8) | (1 << 1))?;

        for &(address, value) in TIMINGS_100HZ.iter() {
            self.write_reg(address, value)?;
        }

        self.write_reg(CONTROL0, CONTROL0_SPI_READ)?;
        log::info!("AFE4400 initialised (100 Hz, LED {} mA)", CURRENT_LED1_MA);
        Ok(())
    }

    /// Mean of the two LED absolute values, in raw ADC codes.
    pub fn read_ppg(&mut self) -> anyhow::Result<u32> {
        let led1 = self.read_reg(LED1ABSVAL)?;
        let led2 = self.read_reg(LED2ABSVAL)?;
        Ok((led1 + led2) / 2)
    }

    pub fn set_powered(&mut self, enabled: bool) -> anyhow::Result<()> {
        if self.powered_down != enabled {
            return Ok(());
        }
        if enabled {
            self.pdn.set_high().map_err(bus_error("AFE4400 PDN"))?;
        } else {
            self.pdn.set_low().map_err(bus_error("AFE4400 PDN"))?;
        }
        self.powered_down = !enabled;
        Ok(())
    }

    pub fn release_bus(&mut self) -> anyhow::Result<()> {
        self.write_in_write_mode(CONTROL2, CONTROL2_TRI_STATE)?;
        self.cs.set_high().map_err(bus_error("AFE4400 CS"))
    }

    pub fn reclaim_bus(&mut self) -> anyhow::Result<()> {
        self.write_in_write_mode(CONTROL2, CONTROL2_NORMAL)
    }
}

// ---------------------------------------------------------------------------
// Shared handle: the scheduler samples it, the storage engine parks it.
// ---------------------------------------------------------------------------
pub type SharedAfe<SPI, CS, PDN> = Arc<Mutex<Afe4400<SPI, CS, PDN>>>;

pub struct PpgSource<SPI, CS, PDN> {
    afe: SharedAfe<SPI, CS, PDN>,
    state: Arc<AcquisitionState>,
}

impl<SPI, CS, PDN> PpgSource<SPI, CS, PDN> {
    pub fn new(afe: SharedAfe<SPI, CS, PDN>, state: Arc<AcquisitionState>) -> Self {
        Self { afe, state }
    }
}

impl<SPI, CS, PDN> SensorSource for PpgSource<SPI, CS, PDN>
where
    SPI: SpiBus,
    CS: OutputPin,
    PDN: OutputPin,
{
    fn tag(&self) -> Tag {
        Tag::Ppg
    }

    fn poll(&mut self) -> anyhow::Result<Sample> {
        if !self.state.ppg.take() {
            return Ok(Sample::Idle);
        }
        let value = lock(&self.afe).read_ppg()?;
        Ok(Sample::Ready(value.to_string()))
    }

    fn set_power(&mut self, enabled: bool) -> anyhow::Result<()> {
        lock(&self.afe).set_powered(enabled)
    }
}

pub struct AfeBusPeer<SPI, CS, PDN>(pub SharedAfe<SPI, CS, PDN>);

impl<SPI, CS, PDN> BusPeer for AfeBusPeer<SPI, CS, PDN>
where
    SPI: SpiBus,
    CS: OutputPin,
    PDN: OutputPin,
{
    fn suspend(&mut self) -> anyhow::Result<()> {
        lock(&self.0).release_bus()
    }

    fn resume(&mut self) -> anyhow::Result<()> {
        lock(&self.0).reclaim_bus()
    }
}
