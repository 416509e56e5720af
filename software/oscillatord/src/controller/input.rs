//! Assembly of the decision engine input from one cycle's readings.

use oscillatord_shared::{ControlInput, PhaseError};

use super::collect::Collected;
use crate::pps::Polarity;

/// Split a raw PPS sample into seconds and nanoseconds after applying the
/// polarity. Division truncates, so a sub-second negative error stays
/// negative in the nanoseconds field.
pub fn split_phase_error(sample_ns: i32, polarity: Polarity) -> PhaseError {
    PhaseError::from_ns(polarity.apply(sample_ns))
}

/// Merge a phase sample with the state collected in the same cycle
pub fn build_input(sample_ns: i32, polarity: Polarity, collected: &Collected) -> ControlInput {
    ControlInput {
        phase_error: split_phase_error(sample_ns, polarity),
        valid: collected.valid,
        lock: collected.ctrl.lock,
        temperature: collected.temperature,
        qerr: collected.qerr,
        fine_setpoint: collected.ctrl.fine_ctrl,
        coarse_setpoint: collected.ctrl.coarse_ctrl,
    }
}
