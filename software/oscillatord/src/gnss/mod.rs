//! GNSS receiver boundary: fix status and quantization error of the PPS edge.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::Error;
use crate::config::Config;

/// Fix status reported by a receiver poll
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GnssStatus {
    /// The receiver reports a fix that cannot be used
    Invalid,
    /// No fix yet
    Waiting,
    /// Fix usable as a phase reference
    Valid,
}

impl GnssStatus {
    /// Whether phase errors of this cycle should be trusted
    pub fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Receiver session, polled once per cycle.
pub trait Gnss {
    /// Refresh receiver data. Errors mean the session is broken.
    fn poll(&mut self) -> Result<GnssStatus, String>;

    /// Quantization error of the latest PPS edge, in picoseconds,
    /// as of the last poll
    fn qerr(&self) -> i32;
}

/// Placeholder for a missing receiver: never gets a fix.
#[derive(Debug, Default)]
pub struct NoReceiver;

impl Gnss for NoReceiver {
    fn poll(&mut self) -> Result<GnssStatus, String> {
        Ok(GnssStatus::Waiting)
    }

    fn qerr(&self) -> i32 {
        0
    }
}

/// Constructor for a GNSS source given the daemon configuration
pub type SourceFn = fn(&Config) -> Result<Box<dyn Gnss>, Error>;

/// GNSS sources known to the daemon, by configuration name
pub static SOURCES: Lazy<BTreeMap<&'static str, SourceFn>> =
    Lazy::new(|| BTreeMap::<&'static str, SourceFn>::from([("none", new_none as SourceFn)]));

fn new_none(_config: &Config) -> Result<Box<dyn Gnss>, Error> {
    Ok(Box::new(NoReceiver))
}

/// Create the GNSS source selected by the `gnss` key
pub fn from_config(config: &Config) -> Result<Box<dyn Gnss>, Error> {
    let name = config.get_default("gnss", "none");
    let new = SOURCES.get(name).ok_or_else(|| Error::Unsupported {
        kind: "GNSS source",
        name: name.to_owned(),
    })?;
    new(config)
}
