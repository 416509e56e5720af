//! Oscillator disciplining daemon: steers a local oscillator so that its
//! 1PPS output stays aligned with a GNSS-derived 1PPS reference.

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod gnss;
pub mod hootl;
pub mod logging;
pub mod oscillator;
pub mod pps;
pub mod shutdown;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use controller::{Controller, DaemonCtx};
pub use error::Error;
pub use shutdown::Shutdown;
