//! Control loop: one PPS edge in, one corrective action out.

pub mod collect;
pub mod context;
pub mod dispatch;
pub mod input;
pub mod startup;

use std::time::{Duration, Instant};

use tracing::{debug, info};

use oscillatord_shared::Action;

use crate::Error;
use crate::engine::DecisionEngine;
use crate::gnss::Gnss;
use crate::oscillator::Oscillator;
use crate::pps::{PpsEvent, PpsSource, is_transient};
use crate::shutdown::Shutdown;
use collect::collect;
pub use context::{CYCLE_DELAY, DaemonCtx, PPS_TIMEOUT, RunState};
use dispatch::dispatch;
use input::build_input;
pub use startup::assemble;

/// Granularity of the pacing delay, bounding how long a stop request waits
const PACING_SLICE: Duration = Duration::from_millis(100);

/// How a single turn of the loop ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Turn {
    /// A signal cut the PPS wait short
    Interrupted,
    /// An edge was signalled but its sample was not readable yet
    Retry,
    /// The sample reflected our own phase jump and was discarded
    Skipped,
    /// The engine's action was carried out
    Dispatched(Action),
}

/// The controller owns the PPS source, the oscillator, the GNSS session and
/// the decision engine for the lifetime of the daemon, and releases them
/// once when dropped.
pub struct Controller {
    ctx: DaemonCtx,
    state: RunState,

    // Appendages
    pps: Box<dyn PpsSource>,
    oscillator: Box<dyn Oscillator>,
    gnss: Box<dyn Gnss>,
    engine: Box<dyn DecisionEngine>,

    terminated: bool,
}

impl Controller {
    /// Assemble a controller. The oscillator is restricted to the DAC range
    /// the engine works with.
    pub fn new(
        ctx: DaemonCtx,
        shutdown: Shutdown,
        pps: Box<dyn PpsSource>,
        mut oscillator: Box<dyn Oscillator>,
        gnss: Box<dyn Gnss>,
        engine: Box<dyn DecisionEngine>,
    ) -> Self {
        oscillator.set_dac_bounds(engine.dac_min(), engine.dac_max());
        let state = RunState::new(ctx.turns, shutdown);

        Self {
            ctx,
            state,
            pps,
            oscillator,
            gnss,
            engine,
            terminated: false,
        }
    }

    /// Run turns until a stop is requested or the configured number of turns
    /// is used up. Any fatal condition ends the loop with an error.
    pub fn run(&mut self) -> Result<(), Error> {
        #[cfg(feature = "affinity")]
        pin_to_core();

        info!("Starting main loop");
        loop {
            self.state.begin_turn();

            if let Turn::Dispatched(_) = self.turn()? {
                self.pace();
            }

            if !self.state.keep_running() {
                break;
            }
        }

        if self.state.stop_requested() {
            match self.state.stop_cause() {
                Some(signal) => info!("Caught {}, leaving main loop", signal.as_str()),
                None => info!("Stop requested, leaving main loop"),
            }
        } else {
            info!("Configured number of turns done");
        }
        Ok(())
    }

    /// Wait for one PPS edge and act on it
    pub fn turn(&mut self) -> Result<Turn, Error> {
        debug!("Waiting for PPS event");
        let event = self
            .pps
            .wait(self.ctx.pps_timeout)
            .map_err(Error::io("waiting for PPS event"))?;
        match event {
            PpsEvent::DataReady => {}
            PpsEvent::Interrupted => return Ok(Turn::Interrupted),
            PpsEvent::Timeout => return Err(Error::PpsTimeout),
        }

        let sample = match self.pps.read_phase_error() {
            Ok(sample) => sample,
            Err(e) if is_transient(&e) => {
                debug!("Phase error not readable yet: {e}");
                return Ok(Turn::Retry);
            }
            Err(e) => return Err(Error::io("reading phase error")(e)),
        };

        if self.state.take_ignored_sample() {
            info!("Ignoring 1 input due to phase jump");
            return Ok(Turn::Skipped);
        }

        let collected = collect(&mut *self.oscillator, &mut *self.gnss)?;
        let input = build_input(sample, self.ctx.polarity, &collected);
        info!(
            "Input: phase_error = ({}s, {:09}ns), valid = {}, lock = {}, fine = {}, coarse = {}, temp = {}, qErr = {}",
            input.phase_error.sec,
            input.phase_error.nsec,
            input.valid,
            input.lock,
            input.fine_setpoint,
            input.coarse_setpoint,
            input.temperature,
            input.qerr,
        );

        let output = self
            .engine
            .process(&input)
            .map_err(Error::driver("decision engine"))?;
        info!(
            "Output: action = {:?}, setpoint = {}, value_phase_ctrl = {}",
            output.action, output.setpoint, output.value_phase_ctrl
        );

        dispatch(
            &output,
            &mut *self.pps,
            &mut *self.oscillator,
            &mut *self.engine,
            self.ctx.polarity,
            &mut self.state,
        )?;

        Ok(Turn::Dispatched(output.action))
    }

    /// Hold off for the cycle delay, returning early on a stop request
    fn pace(&self) {
        let start = Instant::now();
        while !self.state.stop_requested() {
            let Some(left) = self.ctx.cycle_delay.checked_sub(start.elapsed()) else {
                break;
            };
            if left.is_zero() {
                break;
            }
            std::thread::sleep(left.min(PACING_SLICE));
        }
    }

    /// Release the oscillator, the engine and the PPS source, in that order.
    /// Only the first call has any effect.
    pub fn terminate(&mut self) {
        if std::mem::replace(&mut self.terminated, true) {
            return;
        }
        debug!("Releasing {}", self.oscillator.model());
        self.oscillator.terminate();
        self.engine.terminate();
        self.pps.close();
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Keep the loop on the first core at the highest priority available.
/// Neither is available everywhere, and the loop works without them.
#[cfg(feature = "affinity")]
fn pin_to_core() {
    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
    if let Some(core) = core_ids.first() {
        if !core_affinity::set_for_current(*core) {
            debug!("Could not pin the control loop to core {}", core.id);
        }
    }
    if let Err(e) =
        thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Max)
    {
        debug!("Could not raise control loop priority: {e:?}");
    }
}
