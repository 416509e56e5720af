//! Records exchanged during an oscillator calibration.
//!
//! The decision engine decides which control values to probe and how many
//! PPS samples to take at each; the oscillator driver runs the procedure and
//! reports what it measured. Neither side interprets the other's numerics.

#[cfg(feature = "ser")]
use serde::{Deserialize, Serialize};

/// What the decision engine wants measured.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "ser", derive(Serialize, Deserialize))]
pub struct CalibrationParameters {
    /// Fine control values to apply, in order
    pub ctrl_points: Vec<u32>,

    /// Number of PPS samples to record at each control value
    pub nb_calibration: u32,
}

/// Phase errors measured by the oscillator driver.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "ser", derive(Serialize, Deserialize))]
pub struct CalibrationResults {
    /// Phase errors in nanoseconds, one row per control point
    /// and `nb_calibration` samples per row, with polarity applied
    pub measures: Vec<Vec<i64>>,
}

impl CalibrationResults {
    /// Whether the results have the shape the parameters asked for
    pub fn matches(&self, parameters: &CalibrationParameters) -> bool {
        self.measures.len() == parameters.ctrl_points.len()
            && self
                .measures
                .iter()
                .all(|row| row.len() == parameters.nb_calibration as usize)
    }
}
