//! Per-cycle records handed to and returned by a disciplining decision engine.

#[cfg(feature = "ser")]
use serde::{Deserialize, Serialize};

use crate::{coded_enum, NS_PER_SECOND};

/// Phase error split into whole seconds and leftover nanoseconds.
///
/// Both fields carry the sign of the total, using truncating division:
/// -1.5 s is `{ sec: -1, nsec: -500_000_000 }` and -200 ns is
/// `{ sec: 0, nsec: -200 }`. Engines depend on this exact convention.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "ser", derive(Serialize, Deserialize))]
pub struct PhaseError {
    pub sec: i64,
    pub nsec: i64,
}

impl PhaseError {
    /// Split a total phase error in nanoseconds
    pub const fn from_ns(total_ns: i64) -> Self {
        Self {
            sec: total_ns / NS_PER_SECOND,
            nsec: total_ns % NS_PER_SECOND,
        }
    }

    /// Recombine into a total in nanoseconds
    pub const fn as_ns(&self) -> i64 {
        self.sec * NS_PER_SECOND + self.nsec
    }
}

/// Everything the decision engine sees about one PPS edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "ser", derive(Serialize, Deserialize))]
pub struct ControlInput {
    /// Measured phase error, after the configured polarity was applied
    pub phase_error: PhaseError,

    /// Whether the GNSS receiver currently has a usable fix
    pub valid: bool,

    /// Whether the oscillator reports lock on its control input
    pub lock: bool,

    /// Oscillator temperature, 0 when the model has no sensor
    pub temperature: u16,

    /// Quantization error reported by the GNSS receiver
    pub qerr: i32,

    pub fine_setpoint: u32,
    pub coarse_setpoint: u32,
}

coded_enum! {
    /// Corrective action requested by the decision engine
    #[cfg_attr(feature = "ser", derive(Serialize, Deserialize))]
    pub enum Action(u32) {
        /// Keep going; the setpoint is still handed to the oscillator
        None = 0,
        /// Move the fine control to `setpoint`
        AdjustFine = 1,
        /// Move the coarse control to `setpoint`
        AdjustCoarse = 2,
        /// Shift the PPS phase counter by `value_phase_ctrl`
        PhaseJump = 3,
        /// Run the oscillator calibration procedure
        Calibrate = 4,
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::None
    }
}

/// Decision engine verdict for one cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "ser", derive(Serialize, Deserialize))]
pub struct ControlOutput {
    pub action: Action,

    /// Control value; which control it targets depends on `action`
    pub setpoint: u32,

    /// Phase correction in nanoseconds, only meaningful for [`Action::PhaseJump`]
    pub value_phase_ctrl: i32,
}

impl ControlOutput {
    /// An output holding the given setpoint without any other action
    pub fn hold(setpoint: u32) -> Self {
        Self {
            action: Action::None,
            setpoint,
            value_phase_ctrl: 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_split_truncates_toward_zero() {
        let pe = PhaseError::from_ns(1_500_000_000);
        assert_eq!(pe, PhaseError { sec: 1, nsec: 500_000_000 });

        let pe = PhaseError::from_ns(-1_500_000_000);
        assert_eq!(pe, PhaseError { sec: -1, nsec: -500_000_000 });

        // Sub-second negative errors keep their sign in the nanoseconds
        let pe = PhaseError::from_ns(-200);
        assert_eq!(pe, PhaseError { sec: 0, nsec: -200 });
    }

    #[test]
    fn test_split_recombines() {
        for total in [
            0,
            1,
            -1,
            999_999_999,
            -999_999_999,
            NS_PER_SECOND,
            -NS_PER_SECOND,
            i32::MAX as i64,
            i32::MIN as i64,
            -(i32::MIN as i64),
        ] {
            let pe = PhaseError::from_ns(total);
            assert_eq!(pe.as_ns(), total);
            assert!(pe.nsec.abs() < NS_PER_SECOND);
            if pe.sec == 0 {
                assert_eq!(pe.nsec.signum(), total.signum());
            }
        }
    }

    #[test]
    fn test_action_codes() {
        assert_eq!(Action::from(3), Action::PhaseJump);
        assert_eq!(u32::from(Action::Calibrate), 4);
        assert_eq!(Action::from(42), Action::Unknown(42));
        assert_eq!(u32::from(Action::Unknown(42)), 42);
        assert_eq!(ControlOutput::default().action, Action::None);
    }

    #[cfg(feature = "ser")]
    #[test]
    fn test_ser_roundtrip() {
        let output = ControlOutput {
            action: Action::PhaseJump,
            setpoint: 12,
            value_phase_ctrl: -200,
        };
        let serialized = serde_json::to_string(&output).unwrap();
        let deserialized = serde_json::from_str::<ControlOutput>(&serialized).unwrap();
        assert_eq!(output, deserialized);
    }
}
