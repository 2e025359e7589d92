//! Width and signedness of values, with the result-shape rules for every operator.
//!
//! Binary operators first reconcile mixed signedness: the unsigned operand is
//! treated as a signed operand one bit wider, so it can never read as negative.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest width, in bits, of any value the simulator will construct.
pub const MAX_WIDTH: u32 = 1 << 16;

/// Errors produced when an operator would yield an unrepresentable shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    /// The result would be wider than [`MAX_WIDTH`].
    #[error("result width {width} exceeds the maximum of {max} bits")]
    WidthOverflow {
        /// The width the operator asked for.
        width: u64,
        /// The configured maximum.
        max: u32,
    },
}

/// The width and signedness of a value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Shape {
    /// Number of bits.
    pub width: u32,
    /// Whether the bits are read as two's complement.
    pub signed: bool,
}

impl Shape {
    /// An unsigned shape of the given width.
    pub fn unsigned(width: u32) -> Self {
        Self {
            width,
            signed: false,
        }
    }

    /// A signed shape of the given width.
    pub fn signed(width: u32) -> Self {
        Self {
            width,
            signed: true,
        }
    }

    /// The narrowest shape that holds `value`.
    ///
    /// Non-negative integers get an unsigned shape of at least one bit,
    /// negative ones the narrowest signed shape.
    pub fn for_int(value: i64) -> Self {
        if value >= 0 {
            Self::unsigned((64 - value.leading_zeros()).max(1))
        } else {
            Self::signed(64 - value.leading_ones() + 1)
        }
    }

    /// Shape of `~a`.
    pub fn not(self) -> Self {
        self
    }

    /// Shape of `-a`: one bit wider and always signed.
    pub fn neg(self) -> Self {
        Self::signed(self.width.saturating_add(1))
    }

    /// Shape of `a + b` and `a - b`.
    pub fn add(self, rhs: Self) -> Self {
        let (a, b) = Self::promote(self, rhs);
        Self {
            width: a.width.max(b.width).saturating_add(1),
            signed: a.signed || b.signed,
        }
    }

    /// Shape of `a * b`.
    pub fn mul(self, rhs: Self) -> Self {
        Self {
            width: self.width.saturating_add(rhs.width),
            signed: self.signed || rhs.signed,
        }
    }

    /// Shape of `a & b`, `a | b` and `a ^ b`: signed only when both operands are.
    pub fn bitwise(self, rhs: Self) -> Self {
        let (a, b) = Self::promote(self, rhs);
        Self {
            width: a.width.max(b.width),
            signed: self.signed && rhs.signed,
        }
    }

    /// Shape able to hold values of both `self` and `rhs` (multiplexers, arrays).
    pub fn union(self, rhs: Self) -> Self {
        let (a, b) = Self::promote(self, rhs);
        Self {
            width: a.width.max(b.width),
            signed: a.signed || b.signed,
        }
    }

    /// Shape of `a << amount` for a runtime amount of shape `amount`.
    ///
    /// The result grows by the largest left shift the amount can encode.
    pub fn shl(self, amount: Self) -> Result<Self, ShapeError> {
        let extra = if amount.signed {
            pow2(amount.width.saturating_sub(1)).saturating_sub(1)
        } else {
            pow2(amount.width).saturating_sub(1)
        };
        self.grow(extra)
    }

    /// Shape of `a >> amount` for a runtime amount of shape `amount`.
    ///
    /// A signed amount can reverse into a left shift, so the result grows by
    /// the largest magnitude a negative amount can encode.
    pub fn shr(self, amount: Self) -> Result<Self, ShapeError> {
        let extra = if amount.signed {
            pow2(amount.width.saturating_sub(1))
        } else {
            0
        };
        self.grow(extra)
    }

    /// Checks the shape against [`MAX_WIDTH`].
    pub fn checked(self) -> Result<Self, ShapeError> {
        if self.width > MAX_WIDTH {
            return Err(ShapeError::WidthOverflow {
                width: u64::from(self.width),
                max: MAX_WIDTH,
            });
        }
        Ok(self)
    }

    fn grow(self, extra: u64) -> Result<Self, ShapeError> {
        let width = u64::from(self.width).saturating_add(extra);
        if width > u64::from(MAX_WIDTH) {
            return Err(ShapeError::WidthOverflow {
                width,
                max: MAX_WIDTH,
            });
        }
        Ok(Self {
            width: width as u32,
            signed: self.signed,
        })
    }

    fn promote(a: Self, b: Self) -> (Self, Self) {
        match (a.signed, b.signed) {
            (false, true) => (Self::signed(a.width.saturating_add(1)), b),
            (true, false) => (a, Self::signed(b.width.saturating_add(1))),
            _ => (a, b),
        }
    }
}

fn pow2(exp: u32) -> u64 {
    if exp >= 64 {
        u64::MAX
    } else {
        1u64 << exp
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.signed {
            write!(f, "signed({})", self.width)
        } else {
            write!(f, "unsigned({})", self.width)
        }
    }
}
