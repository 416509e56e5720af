//! Scripted stand-ins for the control loop's collaborators, recording every
//! call into a shared event log so tests can check ordering.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::rc::Rc;
use std::time::Duration;

use oscillatord_shared::{
    CalibrationParameters, CalibrationResults, ControlInput, ControlOutput,
};

use crate::engine::DecisionEngine;
use crate::gnss::{Gnss, GnssStatus};
use crate::oscillator::{Oscillator, OscillatorCtrl};
use crate::pps::{Polarity, PpsEvent, PpsSource};

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Wait,
    Read,
    PhaseOffset(i32),
    ClosePps,
    Temperature,
    Controls,
    Apply(ControlOutput),
    Calibrate(CalibrationParameters, Polarity),
    DacBounds(u32, u32),
    TerminateOscillator,
    GnssPoll,
    Process(ControlInput),
    CalibrationParameters,
    Submit(CalibrationParameters, CalibrationResults),
    TerminateEngine,
}

#[derive(Clone, Debug, Default)]
pub struct Log(Rc<RefCell<Vec<Event>>>);

impl Log {
    pub fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.0.borrow().iter().filter(|e| pred(e)).count()
    }

    pub fn processed(&self) -> Vec<ControlInput> {
        self.0
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Process(input) => Some(*input),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug)]
enum Step {
    Sample(i32),
    Interrupted,
    ReadError(ErrorKind),
    Timeout,
    WaitError,
}

/// PPS source replaying a fixed script of edges. Runs into a timeout
/// once the script is exhausted.
#[derive(Debug, Default)]
pub struct ScriptedPps {
    pub log: Log,
    pub fail_writes: bool,
    steps: VecDeque<Step>,
    pending: Option<io::Result<i32>>,
}

impl ScriptedPps {
    pub fn logging_to(mut self, log: &Log) -> Self {
        self.log = log.clone();
        self
    }

    pub fn push_sample(&mut self, sample: i32) {
        self.steps.push_back(Step::Sample(sample));
    }

    pub fn push_samples(&mut self, samples: impl IntoIterator<Item = i32>) {
        samples.into_iter().for_each(|s| self.push_sample(s));
    }

    pub fn push_interrupted(&mut self) {
        self.steps.push_back(Step::Interrupted);
    }

    pub fn push_would_block(&mut self) {
        self.steps.push_back(Step::ReadError(ErrorKind::WouldBlock));
    }

    pub fn push_read_error(&mut self, kind: ErrorKind) {
        self.steps.push_back(Step::ReadError(kind));
    }

    pub fn push_timeout(&mut self) {
        self.steps.push_back(Step::Timeout);
    }

    pub fn push_wait_error(&mut self) {
        self.steps.push_back(Step::WaitError);
    }
}

impl PpsSource for ScriptedPps {
    fn name(&self) -> &str {
        "scripted"
    }

    fn wait(&mut self, _timeout: Duration) -> io::Result<PpsEvent> {
        self.log.push(Event::Wait);
        match self.steps.pop_front() {
            Some(Step::Sample(s)) => {
                self.pending = Some(Ok(s));
                Ok(PpsEvent::DataReady)
            }
            Some(Step::ReadError(kind)) => {
                self.pending = Some(Err(kind.into()));
                Ok(PpsEvent::DataReady)
            }
            Some(Step::Interrupted) => Ok(PpsEvent::Interrupted),
            Some(Step::WaitError) => Err(io::Error::from(ErrorKind::InvalidInput)),
            Some(Step::Timeout) | None => Ok(PpsEvent::Timeout),
        }
    }

    fn read_phase_error(&mut self) -> io::Result<i32> {
        self.log.push(Event::Read);
        self.pending
            .take()
            .unwrap_or_else(|| Err(ErrorKind::WouldBlock.into()))
    }

    fn apply_phase_offset(&mut self, offset_ns: i32) -> io::Result<()> {
        if self.fail_writes {
            return Err(ErrorKind::PermissionDenied.into());
        }
        self.log.push(Event::PhaseOffset(offset_ns));
        Ok(())
    }

    fn close(&mut self) {
        self.log.push(Event::ClosePps);
    }
}

#[derive(Debug)]
pub struct FakeOscillator {
    pub log: Log,
    pub ctrl: OscillatorCtrl,
    pub ctrl_error: Option<String>,
    pub temperature: Result<Option<u16>, String>,
    pub apply_error: Option<String>,
    pub calibration_results: Option<CalibrationResults>,
}

impl Default for FakeOscillator {
    fn default() -> Self {
        Self {
            log: Log::default(),
            ctrl: OscillatorCtrl {
                fine_ctrl: 1000,
                coarse_ctrl: 10,
                lock: true,
            },
            ctrl_error: None,
            temperature: Ok(None),
            apply_error: None,
            calibration_results: Some(CalibrationResults::default()),
        }
    }
}

impl FakeOscillator {
    pub fn logging_to(mut self, log: &Log) -> Self {
        self.log = log.clone();
        self
    }
}

impl Oscillator for FakeOscillator {
    fn model(&self) -> &str {
        "fake"
    }

    fn controls(&mut self) -> Result<OscillatorCtrl, String> {
        self.log.push(Event::Controls);
        match &self.ctrl_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.ctrl),
        }
    }

    fn temperature(&mut self) -> Result<Option<u16>, String> {
        self.log.push(Event::Temperature);
        self.temperature.clone()
    }

    fn apply_output(&mut self, output: &ControlOutput) -> Result<(), String> {
        if let Some(e) = &self.apply_error {
            return Err(e.clone());
        }
        self.log.push(Event::Apply(*output));
        Ok(())
    }

    fn calibrate(
        &mut self,
        parameters: &CalibrationParameters,
        _pps: &mut dyn PpsSource,
        polarity: Polarity,
    ) -> Option<CalibrationResults> {
        self.log
            .push(Event::Calibrate(parameters.clone(), polarity));
        self.calibration_results.clone()
    }

    fn set_dac_bounds(&mut self, min: u32, max: u32) {
        self.log.push(Event::DacBounds(min, max));
    }

    fn terminate(&mut self) {
        self.log.push(Event::TerminateOscillator);
    }
}

/// Receiver replaying a list of poll results, valid once exhausted
#[derive(Debug, Default)]
pub struct ScriptedGnss {
    pub log: Log,
    pub qerr: i32,
    statuses: VecDeque<Result<GnssStatus, String>>,
}

impl ScriptedGnss {
    pub fn new(statuses: impl IntoIterator<Item = Result<GnssStatus, String>>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn logging_to(mut self, log: &Log) -> Self {
        self.log = log.clone();
        self
    }
}

impl Gnss for ScriptedGnss {
    fn poll(&mut self) -> Result<GnssStatus, String> {
        self.log.push(Event::GnssPoll);
        self.statuses.pop_front().unwrap_or(Ok(GnssStatus::Valid))
    }

    fn qerr(&self) -> i32 {
        self.qerr
    }
}

/// Engine replaying a list of outputs, holding the current setpoint once exhausted
#[derive(Debug, Default)]
pub struct FakeEngine {
    pub log: Log,
    pub calibration_parameters: Option<CalibrationParameters>,
    outputs: VecDeque<Result<ControlOutput, String>>,
}

impl FakeEngine {
    pub fn new(outputs: impl IntoIterator<Item = Result<ControlOutput, String>>) -> Self {
        Self {
            outputs: outputs.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn logging_to(mut self, log: &Log) -> Self {
        self.log = log.clone();
        self
    }
}

impl DecisionEngine for FakeEngine {
    fn dac_min(&self) -> u32 {
        100
    }

    fn dac_max(&self) -> u32 {
        60000
    }

    fn process(&mut self, input: &ControlInput) -> Result<ControlOutput, String> {
        self.log.push(Event::Process(*input));
        self.outputs
            .pop_front()
            .unwrap_or_else(|| Ok(ControlOutput::hold(input.fine_setpoint)))
    }

    fn calibration_parameters(&mut self) -> Option<CalibrationParameters> {
        self.log.push(Event::CalibrationParameters);
        self.calibration_parameters.clone()
    }

    fn submit_calibration(
        &mut self,
        parameters: &CalibrationParameters,
        results: &CalibrationResults,
    ) {
        self.log
            .push(Event::Submit(parameters.clone(), results.clone()));
    }

    fn terminate(&mut self) {
        self.log.push(Event::TerminateEngine);
    }
}
