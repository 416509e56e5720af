//! PPS event source: the character device reporting the phase error of the
//! oscillator against the 1PPS reference once per edge.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsFd;
use std::path::Path;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

/// Outcome of waiting for the next PPS edge
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PpsEvent {
    /// A phase error sample can be read
    DataReady,
    /// Nothing arrived before the timeout
    Timeout,
    /// A signal arrived during the wait
    Interrupted,
}

/// Source of per-edge phase error samples that also accepts phase corrections.
pub trait PpsSource {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Block until the next edge, a signal, or the timeout.
    /// Errors are failures of the wait itself.
    fn wait(&mut self, timeout: Duration) -> io::Result<PpsEvent>;

    /// Read the phase error of the latest edge in nanoseconds.
    ///
    /// `WouldBlock` and `Interrupted` errors are transient.
    fn read_phase_error(&mut self) -> io::Result<i32>;

    /// Shift the device phase counter by `offset_ns`
    fn apply_phase_offset(&mut self, offset_ns: i32) -> io::Result<()>;

    /// Release the device
    fn close(&mut self) {}
}

/// Sign convention applied to samples read from the PPS device
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "ser", derive(serde::Serialize, serde::Deserialize))]
pub enum Polarity {
    #[default]
    Normal,
    /// The device reports the reference minus the oscillator
    Opposite,
}

impl Polarity {
    pub fn from_opposite(opposite: bool) -> Self {
        if opposite {
            Self::Opposite
        } else {
            Self::Normal
        }
    }

    pub const fn sign(self) -> i64 {
        match self {
            Self::Normal => 1,
            Self::Opposite => -1,
        }
    }

    /// Sample with the convention applied, widened so `i32::MIN` negates
    pub const fn apply(self, sample_ns: i32) -> i64 {
        self.sign() * sample_ns as i64
    }
}

/// Whether a read failure only means "try again from the wait"
pub fn is_transient(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

/// PPS character device exchanging 4-byte host-order nanosecond values.
#[derive(Debug)]
pub struct PpsDevice {
    name: String,
    file: Option<File>,
}

impl PpsDevice {
    /// Open the device read/write
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            name: path.display().to_string(),
            file: Some(file),
        })
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "PPS device already closed"))
    }
}

impl PpsSource for PpsDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn wait(&mut self, timeout: Duration) -> io::Result<PpsEvent> {
        let file = self.file()?;
        let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLIN)];
        let timeout_ms = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);

        match poll(&mut fds, PollTimeout::from(timeout_ms)) {
            Ok(0) => Ok(PpsEvent::Timeout),
            Ok(_) => Ok(PpsEvent::DataReady),
            Err(Errno::EINTR) => Ok(PpsEvent::Interrupted),
            Err(e) => Err(e.into()),
        }
    }

    fn read_phase_error(&mut self) -> io::Result<i32> {
        let mut buf = [0_u8; 4];
        let n = self.file()?.read(&mut buf)?;
        if n != buf.len() {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("short read of {n} bytes from PPS device"),
            ));
        }
        Ok(i32::from_ne_bytes(buf))
    }

    fn apply_phase_offset(&mut self, offset_ns: i32) -> io::Result<()> {
        let buf = offset_ns.to_ne_bytes();
        let n = self.file()?.write(&buf)?;
        if n != buf.len() {
            return Err(io::Error::new(
                ErrorKind::WriteZero,
                format!("short write of {n} bytes to PPS device"),
            ));
        }
        Ok(())
    }

    fn close(&mut self) {
        // Dropping the file closes the descriptor
        self.file = None;
    }
}
