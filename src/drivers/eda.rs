// WearLog — EDA (skin conductance) Channel
//
// An external op-amp conditions the electrode signal onto an ADC pin.  A
// periodic timer (~12 Hz) raises the EDA readiness flag; the reading itself
// is a single raw ADC conversion.

use std::sync::Arc;

use crate::acquisition::{AcquisitionState, Sample, SensorSource};
use crate::record::Tag;

/// One-shot conversion on a fixed channel.
pub trait AdcRead {
    fn read_raw(&mut self) -> anyhow::Result<u16>;
}

pub struct EdaSource<A> {
    adc: A,
    state: Arc<AcquisitionState>,
}

impl<A: AdcRead> EdaSource<A> {
    pub fn new(adc: A, state: Arc<AcquisitionState>) -> Self {
        Self { adc, state }
    }
}

impl<A: AdcRead> SensorSource for EdaSource<A> {
    fn tag(&self) -> Tag {
        Tag::Eda
    }

    fn poll(&mut self) -> anyhow::Result<Sample> {
        if !self.state.eda.take() {
            return Ok(Sample::Idle);
        }
        Ok(Sample::Ready(self.adc.read_raw()?.to_string()))
    }

    /// The op-amp has no power control of its own.
    fn set_power(&mut self, enabled: bool) -> anyhow::Result<()> {
        log::debug!("EDA front end stays powered (requested {})", enabled);
        Ok(())
    }
}
