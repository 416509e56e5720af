//! Fatal conditions of the daemon.
//!
//! Transient conditions (interrupted waits, would-block reads) never become
//! an [`Error`]; the control loop retries them in place. Everything here ends
//! the process with a nonzero status.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("usage: {0} config_file_path")]
    Usage(String),

    #[error("config_init({path:?}): {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{key} not defined in config {path:?}")]
    MissingKey { key: &'static str, path: PathBuf },

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("unsupported {kind} {name:?}")]
    Unsupported { kind: &'static str, name: String },

    /// The driver watchdog resets the PPS device after 2 s without an
    /// interrupt, so a 4 s silence means that reset did not help either.
    #[error("Timeout waiting for a PPS event, shouldn't happen!")]
    PpsTimeout,

    #[error("{op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{op}: {reason}")]
    Driver { op: &'static str, reason: String },

    #[error("{0}: out of memory")]
    OutOfMemory(&'static str),
}

impl Error {
    /// Attach an operation name to an OS-level failure
    pub fn io(op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io { op, source }
    }

    /// Attach an operation name to a failure reported by a collaborator
    pub fn driver(op: &'static str) -> impl FnOnce(String) -> Self {
        move |reason| Self::Driver { op, reason }
    }
}
