//! Per-cycle readout of oscillator and GNSS state.

use tracing::debug;

use crate::Error;
use crate::gnss::{Gnss, GnssStatus};
use crate::oscillator::{Oscillator, OscillatorCtrl};

/// Oscillator and GNSS state of one cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Collected {
    pub ctrl: OscillatorCtrl,
    pub temperature: u16,
    pub valid: bool,
    pub qerr: i32,
}

/// Models without a sensor report 0
pub fn read_temperature(oscillator: &mut dyn Oscillator) -> Result<u16, Error> {
    let temperature = oscillator
        .temperature()
        .map_err(Error::driver("oscillator temperature"))?;
    Ok(temperature.unwrap_or(0))
}

/// Whether the receiver fix is usable this cycle. Missing or lost fixes are
/// not errors; they only mark the phase error as untrusted.
pub fn poll_validity(gnss: &mut dyn Gnss) -> Result<bool, Error> {
    let status = gnss
        .poll()
        .map_err(Error::driver("polling receiver data"))?;
    if status != GnssStatus::Valid {
        debug!("GNSS status {status:?}, phase error not trusted");
    }
    Ok(status.is_valid())
}

pub fn read_controls(oscillator: &mut dyn Oscillator) -> Result<OscillatorCtrl, Error> {
    let ctrl = oscillator
        .controls()
        .map_err(Error::driver("oscillator controls"))?;
    debug!(
        "Oscillator controls: fine {}, coarse {}, lock {}",
        ctrl.fine_ctrl, ctrl.coarse_ctrl, ctrl.lock
    );
    Ok(ctrl)
}

/// Read everything the decision engine needs besides the phase error
pub fn collect(oscillator: &mut dyn Oscillator, gnss: &mut dyn Gnss) -> Result<Collected, Error> {
    debug!("Getting oscillator temperature");
    let temperature = read_temperature(oscillator)?;

    debug!("Getting GNSS data");
    let valid = poll_validity(gnss)?;
    let qerr = gnss.qerr();

    let ctrl = read_controls(oscillator)?;

    Ok(Collected {
        ctrl,
        temperature,
        valid,
        qerr,
    })
}
