//! Software oscillator: keeps its control values in memory.
//!
//! Used as the `dummy` model when no oscillator driver is wired in, and as
//! the disciplined device of the hardware-out-of-the-loop bench, which reads
//! the fine setpoint back through [`SoftOscillator::shared_state`].

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, error, info};

use oscillatord_shared::{Action, CalibrationParameters, CalibrationResults, ControlOutput};

use super::{Oscillator, OscillatorCtrl};
use crate::Error;
use crate::config::Config;
use crate::pps::{Polarity, PpsEvent, PpsSource, is_transient};

/// How long a calibration step waits for each PPS edge
const CALIBRATION_EDGE_TIMEOUT: Duration = Duration::from_secs(4);

/// Control state that the bench simulation reads back
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SoftState {
    pub fine: u32,
    pub coarse: u32,
    pub lock: bool,
}

#[derive(Debug)]
pub struct SoftOscillator {
    state: Rc<RefCell<SoftState>>,
    dac_min: u32,
    dac_max: u32,
}

impl SoftOscillator {
    pub fn new(fine: u32, coarse: u32) -> Self {
        let state = SoftState {
            fine,
            coarse,
            lock: false,
        };
        Self {
            state: Rc::new(RefCell::new(state)),
            dac_min: 0,
            dac_max: u32::MAX,
        }
    }

    /// Start from `dummy-fine`/`dummy-coarse`, both defaulting to mid-range
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let fine = config.get_u32_default("dummy-fine", 32768)?;
        let coarse = config.get_u32_default("dummy-coarse", 0)?;
        Ok(Self::new(fine, coarse))
    }

    /// Handle on the control state, shared with this oscillator
    pub fn shared_state(&self) -> Rc<RefCell<SoftState>> {
        Rc::clone(&self.state)
    }

    fn set_fine(&mut self, value: u32) {
        let clamped = value.clamp(self.dac_min, self.dac_max);
        self.state.borrow_mut().fine = clamped;
    }

    /// Wait for one edge and read it. `None` if the edge has to be waited for again.
    fn next_sample(pps: &mut dyn PpsSource) -> io::Result<Option<i32>> {
        match pps.wait(CALIBRATION_EDGE_TIMEOUT)? {
            PpsEvent::DataReady => match pps.read_phase_error() {
                Ok(sample) => Ok(Some(sample)),
                Err(e) if is_transient(&e) => Ok(None),
                Err(e) => Err(e),
            },
            PpsEvent::Interrupted => Ok(None),
            PpsEvent::Timeout => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "no PPS edge during calibration",
            )),
        }
    }

    fn measure(
        &mut self,
        parameters: &CalibrationParameters,
        pps: &mut dyn PpsSource,
        polarity: Polarity,
    ) -> io::Result<CalibrationResults> {
        let mut measures = Vec::with_capacity(parameters.ctrl_points.len());
        for &point in &parameters.ctrl_points {
            self.set_fine(point);
            debug!("Calibration: sampling at fine control {point}");

            let mut row = Vec::with_capacity(parameters.nb_calibration as usize);
            while row.len() < parameters.nb_calibration as usize {
                if let Some(sample) = Self::next_sample(pps)? {
                    row.push(polarity.apply(sample));
                }
            }
            measures.push(row);
        }
        Ok(CalibrationResults { measures })
    }
}

impl Oscillator for SoftOscillator {
    fn model(&self) -> &str {
        "dummy"
    }

    fn controls(&mut self) -> Result<OscillatorCtrl, String> {
        let state = self.state.borrow();
        Ok(OscillatorCtrl {
            fine_ctrl: state.fine,
            coarse_ctrl: state.coarse,
            lock: state.lock,
        })
    }

    fn temperature(&mut self) -> Result<Option<u16>, String> {
        Ok(None)
    }

    fn apply_output(&mut self, output: &ControlOutput) -> Result<(), String> {
        match output.action {
            Action::AdjustFine => self.set_fine(output.setpoint),
            Action::AdjustCoarse => self.state.borrow_mut().coarse = output.setpoint,
            _ => return Ok(()),
        }
        self.state.borrow_mut().lock = true;
        Ok(())
    }

    fn calibrate(
        &mut self,
        parameters: &CalibrationParameters,
        pps: &mut dyn PpsSource,
        polarity: Polarity,
    ) -> Option<CalibrationResults> {
        let restore = self.state.borrow().fine;
        info!(
            "Calibrating over {} control points, {} samples each",
            parameters.ctrl_points.len(),
            parameters.nb_calibration
        );

        let results = self.measure(parameters, pps, polarity);
        self.set_fine(restore);

        match results {
            Ok(results) => Some(results),
            Err(e) => {
                error!("Calibration on {} failed: {e}", pps.name());
                None
            }
        }
    }

    fn set_dac_bounds(&mut self, min: u32, max: u32) {
        self.dac_min = min;
        self.dac_max = max.max(min);
        let fine = self.state.borrow().fine;
        self.set_fine(fine);
    }
}
