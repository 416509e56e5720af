//! Oscillators are the disciplined devices: a frequency control input with
//! fine and coarse resolution, an optional temperature sensor, and a
//! model-specific calibration procedure.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use oscillatord_shared::{CalibrationParameters, CalibrationResults, ControlOutput};

use crate::Error;
use crate::config::Config;
use crate::pps::{Polarity, PpsSource};

pub mod soft;
pub use soft::SoftOscillator;

/// Control values and lock status read back from the oscillator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OscillatorCtrl {
    pub fine_ctrl: u32,
    pub coarse_ctrl: u32,
    pub lock: bool,
}

/// Driver for an oscillator model, from the perspective of the control loop.
pub trait Oscillator {
    /// Model name
    fn model(&self) -> &str;

    /// Current control values
    fn controls(&mut self) -> Result<OscillatorCtrl, String>;

    /// Temperature reading, `None` if this model has no sensor
    fn temperature(&mut self) -> Result<Option<u16>, String>;

    /// Apply the setpoint carried by a decision engine output
    fn apply_output(&mut self, output: &ControlOutput) -> Result<(), String>;

    /// Run the calibration procedure, sampling phase errors from `pps`
    /// with `polarity` applied. `None` if the procedure failed.
    ///
    /// Calibration blocks for as long as it needs; signals do not cut it short.
    fn calibrate(
        &mut self,
        parameters: &CalibrationParameters,
        pps: &mut dyn PpsSource,
        polarity: Polarity,
    ) -> Option<CalibrationResults>;

    /// Range of DAC values the oscillator may be driven to
    fn set_dac_bounds(&mut self, min: u32, max: u32);

    /// Put the hardware in a safe state before the handle is released
    fn terminate(&mut self) {}
}

/// Constructor for a model given the daemon configuration
pub type ModelFn = fn(&Config) -> Result<Box<dyn Oscillator>, Error>;

/// Oscillator models known to the daemon, by configuration name
pub static MODELS: Lazy<BTreeMap<&'static str, ModelFn>> = Lazy::new(|| {
    BTreeMap::<&'static str, ModelFn>::from([("dummy", new_dummy as ModelFn)])
});

fn new_dummy(config: &Config) -> Result<Box<dyn Oscillator>, Error> {
    Ok(Box::new(SoftOscillator::from_config(config)?))
}

/// Create the oscillator selected by the `oscillator` key
pub fn from_config(config: &Config) -> Result<Box<dyn Oscillator>, Error> {
    let model = config.get_default("oscillator", "dummy");
    let new = MODELS.get(model).ok_or_else(|| Error::Unsupported {
        kind: "oscillator model",
        name: model.to_owned(),
    })?;
    new(config)
}
