//! Hardware-out-of-the-loop bench.
//!
//! Stands in for the PPS device and the GNSS receiver with a simulation
//! driven by the software oscillator. Each PPS wait advances simulated time
//! by one second, during which the phase error drifts in proportion to how
//! far the fine control sits from its nominal value. Phase offsets written
//! by the loop shift the simulated phase directly.
//!
//! The simulated device reports phase errors with the normal sign convention.

use std::cell::RefCell;
use std::io::{self, ErrorKind};
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, info};

use crate::Error;
use crate::config::Config;
use crate::gnss::{Gnss, GnssStatus};
use crate::oscillator::Oscillator;
use crate::oscillator::soft::{SoftOscillator, SoftState};
use crate::pps::{PpsEvent, PpsSource};

/// Simulation settings, read from the `hootl-*` keys
#[derive(Clone, Debug, PartialEq)]
pub struct HootlParams {
    /// Fine control value at which the oscillator runs on frequency
    pub nominal_fine: u32,
    /// Phase drift per second for each fine step away from nominal
    pub ns_per_step: f64,
    /// Phase error at the first edge
    pub initial_phase_ns: f64,
    /// Wall-clock time between simulated edges
    pub edge_period: Duration,
    /// Receiver polls before the simulated fix becomes valid
    pub gnss_warmup: u32,
}

impl Default for HootlParams {
    fn default() -> Self {
        Self {
            nominal_fine: 32768,
            ns_per_step: 0.1,
            initial_phase_ns: 0.0,
            edge_period: Duration::from_secs(1),
            gnss_warmup: 3,
        }
    }
}

impl HootlParams {
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let d = Self::default();
        Ok(Self {
            nominal_fine: config.get_u32_default("hootl-nominal-fine", d.nominal_fine)?,
            ns_per_step: config.get_f64_default("hootl-ns-per-step", d.ns_per_step)?,
            initial_phase_ns: config
                .get_f64_default("hootl-initial-phase-ns", d.initial_phase_ns)?,
            edge_period: Duration::from_millis(
                config.get_u32_default("hootl-edge-period-ms", d.edge_period.as_millis() as u32)?
                    as u64,
            ),
            gnss_warmup: config.get_u32_default("hootl-gnss-warmup", d.gnss_warmup)?,
        })
    }
}

/// Simulated PPS device following the software oscillator's fine control
#[derive(Debug)]
pub struct HootlPps {
    name: String,
    params: HootlParams,
    oscillator: Rc<RefCell<SoftState>>,
    phase_ns: f64,
    elapsed_s: u64,
    pending: Option<i32>,
}

impl HootlPps {
    pub fn new(name: &str, params: HootlParams, oscillator: Rc<RefCell<SoftState>>) -> Self {
        let phase_ns = params.initial_phase_ns;
        Self {
            name: name.to_owned(),
            params,
            oscillator,
            phase_ns,
            elapsed_s: 0,
            pending: None,
        }
    }

    /// Current simulated phase error
    pub fn phase_ns(&self) -> f64 {
        self.phase_ns
    }

    /// Move simulated time forward by one second
    fn advance(&mut self) {
        let fine = self.oscillator.borrow().fine;
        let offset = fine as f64 - self.params.nominal_fine as f64;
        self.phase_ns += offset * self.params.ns_per_step;
    }
}

impl PpsSource for HootlPps {
    fn name(&self) -> &str {
        &self.name
    }

    fn wait(&mut self, timeout: Duration) -> io::Result<PpsEvent> {
        if self.params.edge_period > timeout {
            std::thread::sleep(timeout);
            return Ok(PpsEvent::Timeout);
        }
        std::thread::sleep(self.params.edge_period);
        self.elapsed_s += 1;

        // The first edge reports the initial phase
        if self.pending.is_some() {
            self.advance();
        }

        let sample = self.phase_ns.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32;
        self.pending = Some(sample);
        Ok(PpsEvent::DataReady)
    }

    fn read_phase_error(&mut self) -> io::Result<i32> {
        self.pending.ok_or_else(|| ErrorKind::WouldBlock.into())
    }

    fn apply_phase_offset(&mut self, offset_ns: i32) -> io::Result<()> {
        self.phase_ns += offset_ns as f64;
        debug!("Simulated phase moved by {offset_ns}ns to {:.1}ns", self.phase_ns);
        Ok(())
    }

    fn close(&mut self) {
        info!(
            "{}: simulation ended after {}s at {:.1}ns",
            self.name, self.elapsed_s, self.phase_ns
        );
    }
}

/// Simulated receiver: waits for a fix during warmup, then stays valid
#[derive(Debug)]
pub struct HootlGnss {
    warmup_left: u32,
}

impl HootlGnss {
    pub fn new(warmup: u32) -> Self {
        Self {
            warmup_left: warmup,
        }
    }
}

impl Gnss for HootlGnss {
    fn poll(&mut self) -> Result<GnssStatus, String> {
        if self.warmup_left > 0 {
            self.warmup_left -= 1;
            return Ok(GnssStatus::Waiting);
        }
        Ok(GnssStatus::Valid)
    }

    fn qerr(&self) -> i32 {
        0
    }
}

/// The simulated collaborators, linked through the software oscillator's state
pub struct Bench {
    pub pps: Box<dyn PpsSource>,
    pub oscillator: Box<dyn Oscillator>,
    pub gnss: Box<dyn Gnss>,
}

impl Bench {
    /// Build a bench labelled with the configured PPS device path
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let params = HootlParams::from_config(config)?;
        let oscillator = SoftOscillator::from_config(config)?;
        let name = format!("hootl:{}", config.require("pps-device")?);
        info!(
            "Hardware out of the loop: nominal fine {}, {}ns/s per step",
            params.nominal_fine, params.ns_per_step
        );

        let gnss = HootlGnss::new(params.gnss_warmup);
        let pps = HootlPps::new(&name, params, oscillator.shared_state());

        Ok(Self {
            pps: Box::new(pps),
            oscillator: Box::new(oscillator),
            gnss: Box::new(gnss),
        })
    }
}

#[cfg(test)]
mod test {
    use oscillatord_shared::{Action, ControlOutput};

    use super::*;

    fn params() -> HootlParams {
        HootlParams {
            nominal_fine: 1000,
            ns_per_step: 0.5,
            initial_phase_ns: 100.0,
            edge_period: Duration::ZERO,
            gnss_warmup: 2,
        }
    }

    fn next(pps: &mut HootlPps) -> i32 {
        assert_eq!(
            pps.wait(Duration::from_secs(4)).unwrap(),
            PpsEvent::DataReady
        );
        pps.read_phase_error().unwrap()
    }

    #[test]
    fn test_phase_follows_fine_control() {
        let mut osc = SoftOscillator::new(1000, 0);
        let mut pps = HootlPps::new("sim", params(), osc.shared_state());

        assert!(pps.read_phase_error().is_err());
        assert_eq!(next(&mut pps), 100);
        // On frequency, no drift
        assert_eq!(next(&mut pps), 100);

        osc.apply_output(&ControlOutput {
            action: Action::AdjustFine,
            setpoint: 1020,
            value_phase_ctrl: 0,
        })
        .unwrap();
        assert_eq!(next(&mut pps), 110);
        assert_eq!(next(&mut pps), 120);

        pps.apply_phase_offset(-120).unwrap();
        assert_eq!(next(&mut pps), 10);
        assert_eq!(pps.phase_ns(), 10.0);
    }

    #[test]
    fn test_slow_edges_time_out() {
        let osc = SoftOscillator::new(1000, 0);
        let mut p = params();
        p.edge_period = Duration::from_millis(20);
        let mut pps = HootlPps::new("sim", p, osc.shared_state());
        assert_eq!(
            pps.wait(Duration::from_millis(1)).unwrap(),
            PpsEvent::Timeout
        );
    }

    #[test]
    fn test_gnss_warmup() {
        let mut gnss = HootlGnss::new(2);
        assert_eq!(gnss.poll().unwrap(), GnssStatus::Waiting);
        assert_eq!(gnss.poll().unwrap(), GnssStatus::Waiting);
        assert_eq!(gnss.poll().unwrap(), GnssStatus::Valid);
        assert_eq!(gnss.qerr(), 0);
    }

    #[test]
    fn test_bench_from_config() {
        let config = Config::parse(
            "pps-device=/dev/ptp_ocp/pps\nhootl=true\nhootl-edge-period-ms=0\nhootl-nominal-fine=500\ndummy-fine=500",
        );
        let mut bench = Bench::from_config(&config).unwrap();
        assert_eq!(bench.pps.name(), "hootl:/dev/ptp_ocp/pps");
        assert_eq!(bench.oscillator.model(), "dummy");
        assert_eq!(
            bench.pps.wait(Duration::from_secs(4)).unwrap(),
            PpsEvent::DataReady
        );
        assert_eq!(bench.pps.read_phase_error().unwrap(), 0);

        let missing = Bench::from_config(&Config::parse("hootl=true"));
        assert!(matches!(missing, Err(Error::MissingKey { .. })));
    }
}
