//! Disciplining decision engines: map one phase/state sample to a corrective action.

use std::path::Path;

use oscillatord_shared::{CalibrationParameters, CalibrationResults, ControlInput, ControlOutput};

use crate::Error;
use crate::config::Config;

pub mod pid;
pub use pid::PidEngine;

/// Decision engine, from the perspective of the control loop.
///
/// Engines are stateful and expect exactly one call to
/// [`process`](DecisionEngine::process) per physical PPS edge.
pub trait DecisionEngine {
    /// Lowest DAC value the engine may request
    fn dac_min(&self) -> u32;

    /// Highest DAC value the engine may request
    fn dac_max(&self) -> u32;

    /// Decide what to do about one sample.
    /// An error means the engine lost internal consistency.
    fn process(&mut self, input: &ControlInput) -> Result<ControlOutput, String>;

    /// What to measure for a requested calibration, `None` if unavailable
    fn calibration_parameters(&mut self) -> Option<CalibrationParameters>;

    /// Hand back what the oscillator measured. The engine validates its own inputs.
    fn submit_calibration(
        &mut self,
        parameters: &CalibrationParameters,
        results: &CalibrationResults,
    );

    /// Release engine resources
    fn terminate(&mut self) {}
}

/// Create the engine selected by the `engine` key of the engine configuration file
pub fn from_config_path(path: impl AsRef<Path>) -> Result<Box<dyn DecisionEngine>, Error> {
    let config = Config::from_file(path)?;
    from_config(&config)
}

pub fn from_config(config: &Config) -> Result<Box<dyn DecisionEngine>, Error> {
    match config.get_default("engine", "pid") {
        "pid" => Ok(Box::new(PidEngine::from_config(config)?)),
        other => Err(Error::Unsupported {
            kind: "decision engine",
            name: other.to_owned(),
        }),
    }
}
