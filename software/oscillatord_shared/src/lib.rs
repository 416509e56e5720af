#![doc = include_str!("../README.md")]

pub mod calibration;
pub mod control;

pub use calibration::{CalibrationParameters, CalibrationResults};
pub use control::{Action, ControlInput, ControlOutput, PhaseError};

/// Nanoseconds in one second, the unit split used for phase errors
pub const NS_PER_SECOND: i64 = 1_000_000_000;

/// Declare a C-like enum over an integer code with an extra `Unknown` variant
/// that keeps any code without a named variant, so that codes produced by an
/// engine built against a newer table still convert without panicking.
///
/// Same shape as smoltcp's `enum_with_unknown!`, with `Hash` added to the derives.
#[macro_export]
macro_rules! coded_enum {
    (
        $( #[$enum_attr:meta] )*
        pub enum $name:ident($ty:ty) {
            $(
              $( #[$variant_attr:meta] )*
              $variant:ident = $value:expr
            ),+ $(,)?
        }
    ) => {
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
        $( #[$enum_attr] )*
        pub enum $name {
            $(
              $( #[$variant_attr] )*
              $variant
            ),*,
            /// Code with no named variant
            Unknown($ty)
        }

        impl ::core::convert::From<$ty> for $name {
            fn from(code: $ty) -> Self {
                match code {
                    $( $value => $name::$variant ),*,
                    other => $name::Unknown(other)
                }
            }
        }

        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value ),*,
                    $name::Unknown(other) => other
                }
            }
        }
    }
}
