//! Built-in decision engine: PI control of the fine setpoint on the
//! median-filtered phase error, with phase jumps for large errors and
//! gain calibration on request.

use flaw::MedianFilter;
use tracing::{info, warn};

use oscillatord_shared::{
    Action, CalibrationParameters, CalibrationResults, ControlInput, ControlOutput,
};

use super::DecisionEngine;
use crate::Error;
use crate::config::Config;

/// PI controller from phase error to fine setpoint, with simple
/// saturation to prevent excessive integral windup.
///
/// The fine setpoint is driven to `center - (kp * e + ki * integral) / gain`
/// where `gain` is the phase drift in ns/s caused by one DAC step. The
/// integral absorbs whatever frequency offset `center` leaves, so an
/// uncalibrated center only slows convergence.
pub struct PidEngine {
    // Configuration
    dac_min: u32,
    dac_max: u32,
    kp: f64,
    ki: f64,
    max_integral: f64,
    phase_jump_threshold_ns: i64,
    calibration_points: Vec<u32>,
    calibration_samples: u32,

    // Internal state
    ns_per_step: f64,
    center: Option<u32>,
    integral: f64,
    filter: MedianFilter<i64, 3>,
    calibration_pending: bool,
}

impl PidEngine {
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let dac_min = config.get_u32_default("dac-min", 0)?;
        let dac_max = config.get_u32_default("dac-max", 65535)?;
        if dac_max < dac_min {
            return Err(Error::InvalidValue {
                key: "dac-max".to_owned(),
                value: dac_max.to_string(),
            });
        }

        // Default to probing the quartiles of the DAC range
        let span = dac_max - dac_min;
        let calibration_points = config
            .get_list::<u32>("calibration-points")?
            .unwrap_or_else(|| {
                vec![
                    dac_min + span / 4,
                    dac_min + span / 2,
                    dac_min + span / 4 * 3,
                ]
            });

        let ns_per_step = config.get_f64_default("ns-per-step", 0.1)?;
        if !ns_per_step.is_normal() {
            return Err(Error::InvalidValue {
                key: "ns-per-step".to_owned(),
                value: ns_per_step.to_string(),
            });
        }

        Ok(Self {
            dac_min,
            dac_max,
            kp: config.get_f64_default("kp", 0.1)?,
            ki: config.get_f64_default("ki", 0.01)?,
            max_integral: config.get_f64_default("max-integral", 1e6)?,
            phase_jump_threshold_ns: config.get_i64_default("phase-jump-threshold-ns", 1000)?,
            calibration_points,
            calibration_samples: config.get_u32_default("calibration-samples", 4)?,

            ns_per_step,
            center: None,
            integral: 0.0,
            filter: MedianFilter::<i64, 3>::new(0),
            calibration_pending: config.get_bool_default("calibrate-first", false)?,
        })
    }

    /// Drift gain currently in use, in ns/s per DAC step
    pub fn ns_per_step(&self) -> f64 {
        self.ns_per_step
    }

    fn output(action: Action, setpoint: u32) -> ControlOutput {
        ControlOutput {
            action,
            setpoint,
            value_phase_ctrl: 0,
        }
    }
}

impl DecisionEngine for PidEngine {
    fn dac_min(&self) -> u32 {
        self.dac_min
    }

    fn dac_max(&self) -> u32 {
        self.dac_max
    }

    fn process(&mut self, input: &ControlInput) -> Result<ControlOutput, String> {
        // Without a fix the phase error means nothing; hold
        if !input.valid {
            return Ok(ControlOutput::hold(input.fine_setpoint));
        }

        if self.calibration_pending {
            return Ok(Self::output(Action::Calibrate, input.fine_setpoint));
        }

        let phase_ns = input.phase_error.as_ns();
        if phase_ns.abs() > self.phase_jump_threshold_ns {
            let value_phase_ctrl = i32::try_from(phase_ns)
                .map_err(|_| format!("phase error of {phase_ns}ns is out of phase jump range"))?;
            // Pre-jump samples would drag the filter after the jump
            self.filter = MedianFilter::<i64, 3>::new(0);
            return Ok(ControlOutput {
                action: Action::PhaseJump,
                setpoint: input.fine_setpoint,
                value_phase_ctrl,
            });
        }

        let center = *self.center.get_or_insert(input.fine_setpoint);
        let e = self.filter.update(phase_ns) as f64;

        // Anti-windup saturation
        self.integral = (self.integral + e).clamp(-self.max_integral, self.max_integral);

        let correction = (self.kp * e + self.ki * self.integral) / self.ns_per_step;
        let setpoint = (center as f64 - correction)
            .round()
            .clamp(self.dac_min as f64, self.dac_max as f64) as u32;

        Ok(Self::output(Action::AdjustFine, setpoint))
    }

    fn calibration_parameters(&mut self) -> Option<CalibrationParameters> {
        if self.calibration_points.is_empty() || self.calibration_samples < 2 {
            return None;
        }
        Some(CalibrationParameters {
            ctrl_points: self.calibration_points.clone(),
            nb_calibration: self.calibration_samples,
        })
    }

    fn submit_calibration(
        &mut self,
        parameters: &CalibrationParameters,
        results: &CalibrationResults,
    ) {
        self.calibration_pending = false;

        if !results.matches(parameters) {
            warn!("Calibration results do not match the requested points; keeping previous gain");
            return;
        }

        // Drift rate at each control point, from first and last sample one second apart each
        let points: Vec<(f64, f64)> = parameters
            .ctrl_points
            .iter()
            .zip(results.measures.iter())
            .filter_map(|(&ctrl, row)| {
                let (first, last) = (row.first()?, row.last()?);
                let rate = (last - first) as f64 / (row.len() - 1) as f64;
                Some((ctrl as f64, rate))
            })
            .collect();

        match fit_line(&points) {
            Some((slope, intercept)) if slope.is_normal() => {
                self.ns_per_step = slope;
                // Control value where the drift vanishes
                let nominal = (-intercept / slope)
                    .round()
                    .clamp(self.dac_min as f64, self.dac_max as f64) as u32;
                self.center = Some(nominal);
                self.integral = 0.0;
                info!("Calibrated: {slope:.6} ns/s per step, nominal fine control {nominal}");
            }
            _ => warn!("Calibration gave no usable slope; keeping previous gain"),
        }
    }
}

/// Least-squares line through `(x, y)` points as `(slope, intercept)`
fn fit_line(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    let sxy: f64 = points.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}
