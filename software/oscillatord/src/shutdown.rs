//! Cooperative shutdown on SIGINT/SIGTERM.
//!
//! The first signal only raises a flag that the control loop checks between
//! turns. Handlers are installed without `SA_RESTART`, so a signal landing
//! during the PPS wait surfaces as an interrupted wait instead of being
//! swallowed. A second signal ends the process on the spot.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

use crate::Error;

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);
static CAUGHT_SIGNAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn handle_termination(signum: libc::c_int) {
    CAUGHT_SIGNAL.store(signum, Ordering::SeqCst);
    if STOP_REQUESTED.swap(true, Ordering::SeqCst) {
        const MSG: &[u8] = b"Signalled twice, brutal exit.\n";
        // Only async-signal-safe calls in here
        unsafe {
            libc::write(libc::STDERR_FILENO, MSG.as_ptr().cast(), MSG.len());
            libc::_exit(libc::EXIT_FAILURE);
        }
    }
}

/// Handle on the stop flag.
#[derive(Clone, Copy, Debug)]
pub struct Shutdown {
    flag: &'static AtomicBool,
    signal: &'static AtomicI32,
}

impl Shutdown {
    /// Install the SIGINT/SIGTERM handlers and return the process-wide flag
    pub fn install() -> Result<Self, Error> {
        let action = SigAction::new(
            SigHandler::Handler(handle_termination),
            SaFlags::empty(),
            SigSet::empty(),
        );
        for signal in [Signal::SIGINT, Signal::SIGTERM] {
            // The handler only touches an atomic and async-signal-safe libc calls
            unsafe { sigaction(signal, &action) }
                .map_err(|e| Error::io("sigaction")(e.into()))?;
        }

        Ok(Self::process_wide())
    }

    fn process_wide() -> Self {
        Self {
            flag: &STOP_REQUESTED,
            signal: &CAUGHT_SIGNAL,
        }
    }

    /// A flag that no signal handler writes to, for driving the loop
    /// from another owner (tests, embedding)
    pub fn detached() -> Self {
        Self {
            flag: Box::leak(Box::new(AtomicBool::new(false))),
            signal: Box::leak(Box::new(AtomicI32::new(0))),
        }
    }

    pub fn requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Signal that raised the stop request, `None` if there was none or the
    /// stop was requested directly
    pub fn cause(&self) -> Option<Signal> {
        match self.signal.load(Ordering::SeqCst) {
            0 => None,
            signum => Signal::try_from(signum).ok(),
        }
    }

    /// Ask the loop to stop at the next turn boundary
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_detached_flags_are_independent() {
        let a = Shutdown::detached();
        let b = Shutdown::detached();
        assert!(!a.requested());

        a.request();
        assert!(a.requested());
        assert!(!b.requested());

        // Copies observe the same flag
        let a2 = a;
        assert!(a2.requested());
        assert_eq!(a2.cause(), None);
    }

    #[test]
    fn test_first_signal_records_cause() {
        // Only one delivery here: a second one exits the process
        handle_termination(libc::SIGTERM);
        let shutdown = Shutdown::process_wide();
        assert!(shutdown.requested());
        assert_eq!(shutdown.cause(), Some(Signal::SIGTERM));
    }
}
