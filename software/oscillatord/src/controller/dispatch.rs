//! Execution of the action requested by the decision engine.

use tracing::{debug, info};

use oscillatord_shared::{Action, ControlOutput};

use super::context::RunState;
use crate::Error;
use crate::engine::DecisionEngine;
use crate::oscillator::Oscillator;
use crate::pps::{Polarity, PpsSource};

/// Carry out exactly one of: a phase jump, a calibration, or handing the
/// output to the oscillator. Every failure is fatal.
pub fn dispatch(
    output: &ControlOutput,
    pps: &mut dyn PpsSource,
    oscillator: &mut dyn Oscillator,
    engine: &mut dyn DecisionEngine,
    polarity: Polarity,
    state: &mut RunState,
) -> Result<(), Error> {
    match output.action {
        Action::AdjustCoarse => info!("Coarse adjustment to value {} requested", output.setpoint),
        Action::AdjustFine => info!("Fine adjustment to value {} requested", output.setpoint),
        _ => {}
    }

    match output.action {
        Action::PhaseJump => {
            info!("Phase jump requested");
            apply_phase_offset(pps, output.value_phase_ctrl.wrapping_neg())?;
            // The next edge shows the jump we just made, not a new measurement
            state.ignore_next_sample();
        }
        Action::Calibrate => {
            info!("Calibration requested");
            calibrate(engine, oscillator, pps, polarity)?;
        }
        _ => {
            debug!("Applying output to oscillator");
            oscillator
                .apply_output(output)
                .map_err(Error::driver("apply output"))?;
        }
    }

    Ok(())
}

/// Write a one-shot phase correction to the PPS device
pub fn apply_phase_offset(pps: &mut dyn PpsSource, offset_ns: i32) -> Result<(), Error> {
    pps.apply_phase_offset(offset_ns)
        .map_err(Error::io("apply phase offset"))?;
    info!(
        "{}: applied a phase offset correction of {offset_ns}ns",
        pps.name()
    );
    Ok(())
}

/// Parameters from the engine, measurement by the oscillator, results back to the engine
pub fn calibrate(
    engine: &mut dyn DecisionEngine,
    oscillator: &mut dyn Oscillator,
    pps: &mut dyn PpsSource,
    polarity: Polarity,
) -> Result<(), Error> {
    debug!("Getting calibration parameters");
    let parameters = engine
        .calibration_parameters()
        .ok_or(Error::OutOfMemory("calibration parameters"))?;

    debug!("Running oscillator calibration");
    let results = oscillator
        .calibrate(&parameters, pps, polarity)
        .ok_or(Error::OutOfMemory("oscillator calibration"))?;

    engine.submit_calibration(&parameters, &results);
    Ok(())
}
