//! Construction-time errors for fragments and the expressions inside them.

use tessera_common::{Shape, ShapeError};

/// Reasons a fragment is rejected while it is being built.
///
/// Every variant is detected before simulation starts; nothing here is
/// coerced or patched up silently.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FragmentError {
    /// A statement or domain refers to a signal the fragment does not own.
    #[error("unknown signal {0}")]
    UnknownSignal(String),

    /// Two signals were declared with the same name.
    #[error("duplicate signal name '{0}'")]
    DuplicateSignal(String),

    /// A signal's reset value does not have the signal's shape.
    #[error("reset value of '{signal}' is {found}, expected {expected}")]
    ResetShape {
        /// Offending signal.
        signal: String,
        /// The signal's declared shape.
        expected: Shape,
        /// Shape of the reset value.
        found: Shape,
    },

    /// Two clock domains were declared with the same name.
    #[error("duplicate clock domain '{0}'")]
    DuplicateDomain(String),

    /// Clocked statements were given for a domain that was never declared.
    #[error("unknown clock domain {0}")]
    UnknownDomain(String),

    /// A static slice does not lie within the value it selects from.
    #[error("slice [{start}:{end}] out of range for a {width}-bit value")]
    SliceOutOfRange {
        /// First selected bit.
        start: u32,
        /// One past the last selected bit.
        end: u32,
        /// Width of the sliced value.
        width: u32,
    },

    /// A signal is driven from more than one domain.
    #[error("signal '{signal}' is driven from both {first} and {second}")]
    ConflictingDrivers {
        /// The multiply-driven signal.
        signal: String,
        /// The domain seen first.
        first: String,
        /// The conflicting domain.
        second: String,
    },

    /// A clock or reset signal is not exactly one bit wide.
    #[error("{role} signal '{signal}' of domain '{domain}' must be 1 bit wide, found {width}")]
    ControlWidth {
        /// Domain name.
        domain: String,
        /// `"clock"` or `"reset"`.
        role: &'static str,
        /// Offending signal.
        signal: String,
        /// Its actual width.
        width: u32,
    },

    /// A switch pattern does not have the width of the switch condition.
    #[error("pattern '{pattern}' does not fit a {expected}-bit switch condition")]
    PatternWidth {
        /// The pattern as written.
        pattern: String,
        /// Width of the condition.
        expected: u32,
    },

    /// A bit-string pattern contains a character other than `0`, `1`, `-` or space.
    #[error("invalid pattern '{0}'")]
    InvalidPattern(String),

    /// An operator result would be too wide.
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// An array with no elements was indexed.
    #[error("cannot index an empty array")]
    EmptyArray,

    /// An index or field access was applied to something that is not an array or record.
    #[error("{0}")]
    NotIndexable(String),

    /// A record field lookup failed.
    #[error("record has no field '{0}'")]
    UnknownField(String),

    /// An expression was used as an assignment target but does not name storage.
    #[error("expression is not assignable: {0}")]
    NotAssignable(String),
}
