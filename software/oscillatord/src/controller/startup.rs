//! Acquisition of the loop's handles at startup.
//!
//! Each handle is wrapped as soon as it exists, so a failure further down
//! the sequence still runs the release hooks of everything acquired before.

use std::ops::{Deref, DerefMut};

use tracing::{debug, error, info};

use super::Controller;
use super::context::DaemonCtx;
use crate::Error;
use crate::engine::DecisionEngine;
use crate::gnss::Gnss;
use crate::oscillator::Oscillator;
use crate::pps::{Polarity, PpsSource};
use crate::shutdown::Shutdown;

/// A handle with a teardown hook
pub trait Release {
    fn release(&mut self);
}

impl Release for Box<dyn Oscillator> {
    fn release(&mut self) {
        self.terminate();
    }
}

impl Release for Box<dyn DecisionEngine> {
    fn release(&mut self) {
        self.terminate();
    }
}

impl Release for Box<dyn PpsSource> {
    fn release(&mut self) {
        self.close();
    }
}

/// Releases the handle when dropped, unless it was passed on with
/// [`Held::into_inner`]
pub struct Held<T: Release> {
    inner: Option<T>,
}

impl<T: Release> Held<T> {
    pub fn new(inner: T) -> Self {
        Self { inner: Some(inner) }
    }

    /// Hand the handle over to a new owner, which becomes responsible for releasing it
    pub fn into_inner(mut self) -> T {
        match self.inner.take() {
            Some(inner) => inner,
            None => unreachable!("handle is only taken by into_inner"),
        }
    }
}

impl<T: Release> Deref for Held<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.inner {
            Some(inner) => inner,
            None => unreachable!("handle is only taken by into_inner"),
        }
    }
}

impl<T: Release> DerefMut for Held<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.inner {
            Some(inner) => inner,
            None => unreachable!("handle is only taken by into_inner"),
        }
    }
}

impl<T: Release> Drop for Held<T> {
    fn drop(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.release();
        }
    }
}

/// Acquire the remaining handles around an existing oscillator and build
/// the controller, in startup order: PPS device, decision engine, GNSS
/// session, signal handlers.
pub fn assemble(
    ctx: DaemonCtx,
    oscillator: Box<dyn Oscillator>,
    open_pps: impl FnOnce(&DaemonCtx) -> Result<Box<dyn PpsSource>, Error>,
    new_engine: impl FnOnce(&DaemonCtx) -> Result<Box<dyn DecisionEngine>, Error>,
    new_gnss: impl FnOnce() -> Result<Box<dyn Gnss>, Error>,
    install_shutdown: impl FnOnce() -> Result<Shutdown, Error>,
) -> Result<Controller, Error> {
    let mut oscillator = Held::new(oscillator);
    info!("Oscillator model {}", oscillator.model());
    let ctrl = oscillator
        .controls()
        .map_err(Error::driver("oscillator controls"))?;
    debug!(
        "Initial controls: fine {}, coarse {}, lock {}",
        ctrl.fine_ctrl, ctrl.coarse_ctrl, ctrl.lock
    );

    info!("PPS device {}", ctx.pps_device.display());
    let pps = Held::new(open_pps(&ctx)?);

    let engine = Held::new(new_engine(&ctx)?);
    if ctx.polarity == Polarity::Opposite {
        info!("Taking the opposite of the phase error reported");
    }

    let gnss = new_gnss().inspect_err(|_| error!("Failed to listen to the receiver"))?;
    let shutdown = install_shutdown()?;

    Ok(Controller::new(
        ctx,
        shutdown,
        pps.into_inner(),
        oscillator.into_inner(),
        gnss,
        engine.into_inner(),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine;
    use crate::testing::{Event, FakeEngine, FakeOscillator, Log, ScriptedGnss, ScriptedPps};

    fn oscillator(log: &Log) -> Box<dyn Oscillator> {
        Box::new(FakeOscillator::default().logging_to(log))
    }

    fn pps(log: &Log) -> Result<Box<dyn PpsSource>, Error> {
        Ok(Box::new(ScriptedPps::default().logging_to(log)))
    }

    fn released(log: &Log) -> Vec<Event> {
        let mut events: Vec<Event> = log
            .events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    Event::TerminateOscillator | Event::TerminateEngine | Event::ClosePps
                )
            })
            .collect();
        events.sort_by_key(|e| format!("{e:?}"));
        events
    }

    #[test]
    fn test_failed_engine_releases_oscillator_and_pps() {
        let log = Log::default();
        let result = assemble(
            DaemonCtx::default(),
            oscillator(&log),
            |_| pps(&log),
            |ctx| engine::from_config_path(&ctx.libod_config_path),
            || Ok(Box::new(ScriptedGnss::default()) as Box<dyn Gnss>),
            || Ok(Shutdown::detached()),
        );

        assert!(matches!(result, Err(Error::ConfigRead { .. })));
        assert_eq!(
            released(&log),
            vec![Event::ClosePps, Event::TerminateOscillator]
        );
    }

    #[test]
    fn test_failed_pps_open_releases_oscillator() {
        let log = Log::default();
        let result = assemble(
            DaemonCtx::default(),
            oscillator(&log),
            |_| Err(Error::io("open")(std::io::ErrorKind::NotFound.into())),
            |_| Ok(Box::new(FakeEngine::default()) as Box<dyn DecisionEngine>),
            || Ok(Box::new(ScriptedGnss::default()) as Box<dyn Gnss>),
            || Ok(Shutdown::detached()),
        );

        assert!(matches!(result, Err(Error::Io { op: "open", .. })));
        assert_eq!(released(&log), vec![Event::TerminateOscillator]);
    }

    #[test]
    fn test_failed_gnss_releases_everything() {
        let log = Log::default();
        let result = assemble(
            DaemonCtx::default(),
            oscillator(&log),
            |_| pps(&log),
            |_| Ok(Box::new(FakeEngine::default().logging_to(&log)) as Box<dyn DecisionEngine>),
            || {
                Err(Error::Unsupported {
                    kind: "GNSS source",
                    name: "ublox".to_owned(),
                })
            },
            || Ok(Shutdown::detached()),
        );

        assert!(matches!(result, Err(Error::Unsupported { .. })));
        assert_eq!(
            released(&log),
            vec![
                Event::ClosePps,
                Event::TerminateEngine,
                Event::TerminateOscillator,
            ]
        );
    }

    #[test]
    fn test_assembled_controller_owns_release() {
        let log = Log::default();
        let controller = assemble(
            DaemonCtx::default(),
            oscillator(&log),
            |_| pps(&log),
            |_| Ok(Box::new(FakeEngine::default().logging_to(&log)) as Box<dyn DecisionEngine>),
            || Ok(Box::new(ScriptedGnss::default()) as Box<dyn Gnss>),
            || Ok(Shutdown::detached()),
        )
        .unwrap();

        // Nothing released while the controller is alive
        assert!(released(&log).is_empty());
        assert_eq!(log.count(|e| *e == Event::DacBounds(100, 60000)), 1);

        drop(controller);
        assert_eq!(released(&log).len(), 3);
    }
}
