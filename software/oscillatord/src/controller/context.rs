//! Settings of the current run and the loop's own mutable state.

use std::path::PathBuf;
use std::time::Duration;

use nix::sys::signal::Signal;
#[cfg(feature = "ser")]
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::config::Config;
use crate::pps::Polarity;
use crate::shutdown::Shutdown;

/// Longest wait for a PPS edge. The driver watchdog resets the PPS device
/// after 2 s without an interrupt, so this is only reached when that failed.
pub const PPS_TIMEOUT: Duration = Duration::from_secs(4);

/// Pause after each dispatched cycle, pacing writes to the hardware
pub const CYCLE_DELAY: Duration = Duration::from_secs(5);

/// Daemon settings for a run
#[derive(Clone, Debug)]
#[cfg_attr(feature = "ser", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub struct DaemonCtx {
    /// Bound on loop turns, 0 for none. `N` lets `N - 1` cycles run.
    pub turns: u32,

    /// PPS character device
    pub pps_device: PathBuf,

    /// Sign convention of the phase errors read from the PPS device
    pub polarity: Polarity,

    /// Whether debug logs are enabled
    pub debug: bool,

    /// Configuration file of the decision engine
    pub libod_config_path: PathBuf,

    /// Longest wait for a PPS edge before giving up
    pub pps_timeout: Duration,

    /// Pause after each dispatched cycle
    pub cycle_delay: Duration,
}

impl Default for DaemonCtx {
    fn default() -> Self {
        Self {
            turns: 0,
            pps_device: PathBuf::new(),
            polarity: Polarity::Normal,
            debug: false,
            libod_config_path: PathBuf::new(),
            pps_timeout: PPS_TIMEOUT,
            cycle_delay: CYCLE_DELAY,
        }
    }
}

impl DaemonCtx {
    /// Read the core keys. `pps-device` is required; the engine
    /// configuration defaults to the daemon's own file.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let pps_device = PathBuf::from(config.require("pps-device")?);
        let libod_config_path = config
            .get("libod-config-path")
            .map(PathBuf::from)
            .unwrap_or_else(|| config.path().to_path_buf());

        Ok(Self {
            turns: config.get_u32_default("turns", 0)?,
            pps_device,
            polarity: Polarity::from_opposite(
                config.get_bool_default("opposite-phase-error", false)?,
            ),
            debug: config.get_bool_default("debug", false)?,
            libod_config_path,
            ..Default::default()
        })
    }
}

/// Loop state that survives from one turn to the next
#[derive(Debug)]
pub struct RunState {
    turns: u32,
    ignore_next_sample: bool,
    shutdown: Shutdown,
}

impl RunState {
    pub fn new(turns: u32, shutdown: Shutdown) -> Self {
        Self {
            turns,
            ignore_next_sample: false,
            shutdown,
        }
    }

    /// Count a turn. Counting down from 0 wraps, leaving the loop unbounded.
    pub fn begin_turn(&mut self) {
        self.turns = self.turns.wrapping_sub(1);
    }

    /// Whether the turn just finished was the last one
    pub fn exhausted(&self) -> bool {
        self.turns == 1
    }

    pub fn stop_requested(&self) -> bool {
        self.shutdown.requested()
    }

    /// Signal behind the stop request, if any
    pub fn stop_cause(&self) -> Option<Signal> {
        self.shutdown.cause()
    }

    /// Checked between turns only
    pub fn keep_running(&self) -> bool {
        !self.stop_requested() && !self.exhausted()
    }

    /// Discard the next sample, which will reflect a correction rather than a measurement
    pub fn ignore_next_sample(&mut self) {
        self.ignore_next_sample = true;
    }

    /// Whether the current sample is to be discarded, clearing the request
    pub fn take_ignored_sample(&mut self) -> bool {
        std::mem::take(&mut self.ignore_next_sample)
    }
}
