//! Arbitrary-width two's-complement bit-vectors.
//!
//! A [`Value`] owns its bits packed into `u64` words, least significant word
//! first. Bits above the width are always zero; signed values are sign-extended
//! on demand when an operator needs a wider view. Every operator derives its
//! result [`Shape`] from the operand shapes (see [`crate::shape`]) so that
//! additions, negations and shifts never overflow.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, BitAnd, BitOr, BitXor, Mul, Neg, Not, Sub};

use crate::shape::{Shape, ShapeError};

/// Error type for parsing binary value literals.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseValueError {
    /// A character other than `0`, `1` or `_` was found.
    #[error("invalid binary digit '{0}'")]
    InvalidDigit(char),
    /// The literal contained no digits.
    #[error("empty binary literal")]
    Empty,
}

/// Error type for decoding a serialized [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeValueError {
    /// The width is above [`MAX_WIDTH`](crate::shape::MAX_WIDTH).
    #[error("value width {0} exceeds the maximum of {max} bits", max = crate::shape::MAX_WIDTH)]
    TooWide(u32),
    /// The word vector does not match the width.
    #[error("a {width}-bit value needs {expected} words, found {found}")]
    WordCount {
        /// Declared width.
        width: u32,
        /// Words the width requires.
        expected: usize,
        /// Words present.
        found: usize,
    },
    /// Bits above the width are set.
    #[error("a {0}-bit value has bits set above its width")]
    ExcessBits(u32),
}

#[derive(Deserialize)]
struct RawValue {
    width: u32,
    signed: bool,
    words: Vec<u64>,
}

impl TryFrom<RawValue> for Value {
    type Error = DecodeValueError;

    fn try_from(raw: RawValue) -> Result<Self, Self::Error> {
        if raw.width > crate::shape::MAX_WIDTH {
            return Err(DecodeValueError::TooWide(raw.width));
        }
        let expected = words_for(raw.width);
        if raw.words.len() != expected {
            return Err(DecodeValueError::WordCount {
                width: raw.width,
                expected,
                found: raw.words.len(),
            });
        }
        let mut masked = raw.words.clone();
        mask_words(&mut masked, raw.width);
        if masked != raw.words {
            return Err(DecodeValueError::ExcessBits(raw.width));
        }
        Ok(Self {
            width: raw.width,
            signed: raw.signed,
            words: raw.words,
        })
    }
}

/// An immutable-by-convention bit-vector with explicit width and signedness.
///
/// Equality compares the mathematical value and the signedness, so
/// `Value::constant(3, 4) == Value::constant(3, 8)`. Use [`Value::same_bits`]
/// to compare exact bit patterns.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "RawValue")]
pub struct Value {
    width: u32,
    signed: bool,
    words: Vec<u64>,
}

fn words_for(width: u32) -> usize {
    width.div_ceil(64) as usize
}

fn mask_words(words: &mut [u64], width: u32) {
    let rem = width % 64;
    if rem != 0 {
        if let Some(last) = words.last_mut() {
            *last &= (1u64 << rem) - 1;
        }
    }
}

fn add_words(a: &[u64], b: &[u64], carry_in: bool) -> Vec<u64> {
    let mut carry = u64::from(carry_in);
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let (s1, c1) = x.overflowing_add(y);
            let (s2, c2) = s1.overflowing_add(carry);
            carry = u64::from(c1 || c2);
            s2
        })
        .collect()
}

fn mul_words(a: &[u64], b: &[u64]) -> Vec<u64> {
    let n = a.len();
    let mut out = vec![0u64; n];
    for i in 0..n {
        let mut carry: u128 = 0;
        for j in 0..(n - i) {
            let cur = u128::from(out[i + j]) + u128::from(a[i]) * u128::from(b[j]) + carry;
            out[i + j] = cur as u64;
            carry = cur >> 64;
        }
    }
    out
}

fn shl_words(words: &[u64], amount: u64) -> Vec<u64> {
    let len = words.len();
    let mut out = vec![0u64; len];
    let word_shift = (amount / 64).min(len as u64) as usize;
    let bit_shift = (amount % 64) as u32;
    for i in word_shift..len {
        let src = i - word_shift;
        let mut w = words[src] << bit_shift;
        if bit_shift > 0 && src > 0 {
            w |= words[src - 1] >> (64 - bit_shift);
        }
        out[i] = w;
    }
    out
}

fn shr_words(words: &[u64], amount: u64) -> Vec<u64> {
    let len = words.len();
    let mut out = vec![0u64; len];
    let word_shift = (amount / 64).min(len as u64) as usize;
    let bit_shift = (amount % 64) as u32;
    for (i, slot) in out.iter_mut().enumerate() {
        let src = i + word_shift;
        if src >= len {
            break;
        }
        let mut w = words[src] >> bit_shift;
        if bit_shift > 0 && src + 1 < len {
            w |= words[src + 1] << (64 - bit_shift);
        }
        *slot = w;
    }
    out
}

impl Value {
    /// Builds a value from raw words, truncating bits beyond the shape's width.
    pub fn from_words(shape: Shape, mut words: Vec<u64>) -> Self {
        words.resize(words_for(shape.width), 0);
        mask_words(&mut words, shape.width);
        Self {
            width: shape.width,
            signed: shape.signed,
            words,
        }
    }

    /// All-zero value of the given shape.
    pub fn zero(shape: Shape) -> Self {
        Self::from_words(shape, Vec::new())
    }

    /// The low `shape.width` bits of `bits`.
    pub fn from_u64(bits: u64, shape: Shape) -> Self {
        Self::from_words(shape, vec![bits])
    }

    /// `value` in two's complement, truncated to `shape.width` bits.
    pub fn from_i64(value: i64, shape: Shape) -> Self {
        let fill = if value < 0 { u64::MAX } else { 0 };
        let mut words = vec![fill; words_for(shape.width).max(1)];
        words[0] = value as u64;
        Self::from_words(shape, words)
    }

    /// An integer constant in the narrowest shape that holds it.
    pub fn int(value: i64) -> Self {
        Self::from_i64(value, Shape::for_int(value))
    }

    /// An integer constant of explicit width; signed iff `value` is negative.
    pub fn constant(value: i64, width: u32) -> Self {
        Self::from_i64(
            value,
            Shape {
                width,
                signed: value < 0,
            },
        )
    }

    /// A 1-bit unsigned value.
    pub fn from_bool(bit: bool) -> Self {
        Self::from_u64(u64::from(bit), Shape::unsigned(1))
    }

    /// Parses an MSB-first string of `0`/`1` digits; `_` separators are ignored.
    pub fn from_binary_str(digits: &str, signed: bool) -> Result<Self, ParseValueError> {
        let bits: Vec<bool> = digits
            .trim()
            .chars()
            .filter(|&c| c != '_')
            .map(|c| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(ParseValueError::InvalidDigit(other)),
            })
            .collect::<Result<_, _>>()?;
        if bits.is_empty() {
            return Err(ParseValueError::Empty);
        }
        let width = bits.len() as u32;
        let mut value = Self::zero(Shape { width, signed });
        for (i, bit) in bits.iter().rev().enumerate() {
            if *bit {
                value.words[i / 64] |= 1u64 << (i % 64);
            }
        }
        Ok(value)
    }

    /// Returns the width and signedness.
    pub fn shape(&self) -> Shape {
        Shape {
            width: self.width,
            signed: self.signed,
        }
    }

    /// Returns the width in bits.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns `true` if the bits are read as two's complement.
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// The packed bits, least significant word first.
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Returns bit `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.width()`.
    pub fn bit(&self, index: u32) -> bool {
        assert!(
            index < self.width,
            "bit index {index} out of range for width {}",
            self.width
        );
        (self.words[index as usize / 64] >> (index % 64)) & 1 == 1
    }

    /// Returns `true` if every bit is zero.
    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Returns `true` for signed values whose sign bit is set.
    pub fn is_negative(&self) -> bool {
        self.signed && self.width > 0 && self.bit(self.width - 1)
    }

    /// The low 64 bits, zero-extended.
    pub fn to_u64(&self) -> u64 {
        self.words.first().copied().unwrap_or(0)
    }

    /// The mathematical value, clamped into the `i64` range.
    pub fn to_i64_saturating(&self) -> i64 {
        let negative = self.is_negative();
        let fill = if negative { u64::MAX } else { 0 };
        let low = self.extended_word(0, fill);
        let fits = (1..self.words.len()).all(|i| self.extended_word(i, fill) == fill)
            && ((low as i64) < 0) == negative;
        if fits {
            low as i64
        } else if negative {
            i64::MIN
        } else {
            i64::MAX
        }
    }

    fn extended_word(&self, index: usize, fill: u64) -> u64 {
        match self.words.get(index) {
            None => fill,
            Some(&word) => {
                let rem = self.width % 64;
                if index + 1 == self.words.len() && rem != 0 {
                    word | (fill << rem)
                } else {
                    word
                }
            }
        }
    }

    /// Words of this value sign- or zero-extended (or truncated) to `width`.
    fn extended(&self, width: u32) -> Vec<u64> {
        let fill = if self.is_negative() { u64::MAX } else { 0 };
        let mut words: Vec<u64> = (0..words_for(width))
            .map(|i| self.extended_word(i, fill))
            .collect();
        mask_words(&mut words, width);
        words
    }

    /// Resizes to `shape.width` by this value's own signedness, then adopts
    /// `shape.signed`. This is the conversion applied on assignment.
    pub fn cast(&self, shape: Shape) -> Value {
        Self {
            width: shape.width,
            signed: shape.signed,
            words: self.extended(shape.width),
        }
    }

    /// Reinterprets the same bits as signed.
    pub fn as_signed(&self) -> Value {
        self.cast(Shape::signed(self.width))
    }

    /// Reinterprets the same bits as unsigned.
    pub fn as_unsigned(&self) -> Value {
        self.cast(Shape::unsigned(self.width))
    }

    /// Bits `start..end` as an unsigned value.
    ///
    /// # Panics
    ///
    /// Panics if the range is reversed or runs past the width.
    pub fn slice(&self, start: u32, end: u32) -> Value {
        assert!(
            start <= end && end <= self.width,
            "slice {start}..{end} out of range for width {}",
            self.width
        );
        Self::from_words(
            Shape::unsigned(end - start),
            shr_words(&self.words, u64::from(start)),
        )
    }

    /// Overwrites bits starting at `offset` with the bits of `bits`.
    ///
    /// Bits that would land beyond the width are dropped.
    pub fn set_slice(&mut self, offset: u32, bits: &Value) {
        for i in 0..bits.width {
            let Some(pos) = offset.checked_add(i).filter(|&p| p < self.width) else {
                break;
            };
            let word = &mut self.words[pos as usize / 64];
            let mask = 1u64 << (pos % 64);
            if bits.bit(i) {
                *word |= mask;
            } else {
                *word &= !mask;
            }
        }
    }

    /// Concatenates `parts`, the first part landing in the least significant bits.
    pub fn cat(parts: &[Value]) -> Value {
        let width = parts.iter().map(|p| p.width).fold(0u32, u32::saturating_add);
        let mut out = Self::zero(Shape::unsigned(width));
        let mut offset = 0;
        for part in parts {
            out.set_slice(offset, part);
            offset += part.width;
        }
        out
    }

    /// `count` copies of this value, concatenated.
    pub fn repl(&self, count: u32) -> Value {
        let parts = vec![self.clone(); count as usize];
        Self::cat(&parts)
    }

    /// Bitwise NOT.
    pub fn not(&self) -> Value {
        let words = self.words.iter().map(|w| !w).collect();
        Self::from_words(self.shape(), words)
    }

    /// Two's-complement negation, one bit wider than the operand.
    pub fn neg(&self) -> Value {
        let shape = self.shape().neg();
        let inverted: Vec<u64> = self.extended(shape.width).iter().map(|w| !w).collect();
        let zeros = vec![0u64; inverted.len()];
        Self::from_words(shape, add_words(&zeros, &inverted, true))
    }

    /// Sum, wide enough that it cannot overflow.
    pub fn add(&self, rhs: &Value) -> Value {
        let shape = self.shape().add(rhs.shape());
        let a = self.extended(shape.width);
        let b = rhs.extended(shape.width);
        Self::from_words(shape, add_words(&a, &b, false))
    }

    /// Difference, wide enough that it cannot overflow.
    pub fn sub(&self, rhs: &Value) -> Value {
        let shape = self.shape().add(rhs.shape());
        let a = self.extended(shape.width);
        let b: Vec<u64> = rhs.extended(shape.width).iter().map(|w| !w).collect();
        Self::from_words(shape, add_words(&a, &b, true))
    }

    /// Product, as wide as both operands together.
    pub fn mul(&self, rhs: &Value) -> Value {
        let shape = self.shape().mul(rhs.shape());
        let a = self.extended(shape.width);
        let b = rhs.extended(shape.width);
        Self::from_words(shape, mul_words(&a, &b))
    }

    fn bitwise(&self, rhs: &Value, op: impl Fn(u64, u64) -> u64) -> Value {
        let shape = self.shape().bitwise(rhs.shape());
        let a = self.extended(shape.width);
        let b = rhs.extended(shape.width);
        let words = a.iter().zip(&b).map(|(&x, &y)| op(x, y)).collect();
        Self::from_words(shape, words)
    }

    /// Bitwise AND.
    pub fn and(&self, rhs: &Value) -> Value {
        self.bitwise(rhs, |a, b| a & b)
    }

    /// Bitwise OR.
    pub fn or(&self, rhs: &Value) -> Value {
        self.bitwise(rhs, |a, b| a | b)
    }

    /// Bitwise XOR.
    pub fn xor(&self, rhs: &Value) -> Value {
        self.bitwise(rhs, |a, b| a ^ b)
    }

    /// `1` if any bit is set, as a 1-bit unsigned value.
    pub fn boolean(&self) -> Value {
        Self::from_bool(!self.is_zero())
    }

    /// Magnitude of the shift amount (saturated to `u64`) and whether it is negative.
    fn shift_magnitude(&self) -> (u64, bool) {
        let negative = self.is_negative();
        let magnitude = if negative { self.neg() } else { self.clone() };
        let high_set = magnitude.words.iter().skip(1).any(|&w| w != 0);
        let amount = if high_set {
            u64::MAX
        } else {
            magnitude.to_u64()
        };
        (amount, negative)
    }

    fn shift(&self, shape: Shape, amount: &Value, left: bool) -> Value {
        let words = self.extended(shape.width);
        let (magnitude, reversed) = amount.shift_magnitude();
        let shifted = if left != reversed {
            shl_words(&words, magnitude)
        } else {
            shr_words(&words, magnitude)
        };
        Self::from_words(shape, shifted)
    }

    /// Shift left by a runtime amount; a negative amount shifts right instead.
    ///
    /// The operand is first extended to the result width, and vacated bits are
    /// filled with zeros in both directions.
    pub fn shl(&self, amount: &Value) -> Result<Value, ShapeError> {
        let shape = self.shape().shl(amount.shape())?;
        Ok(self.shift(shape, amount, true))
    }

    /// Shift right by a runtime amount; a negative amount shifts left instead.
    pub fn shr(&self, amount: &Value) -> Result<Value, ShapeError> {
        let shape = self.shape().shr(amount.shape())?;
        Ok(self.shift(shape, amount, false))
    }

    /// Compares mathematical values, regardless of width and signedness.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self.is_negative(), other.is_negative()) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
        let width = self.width.max(other.width);
        let a = self.extended(width);
        let b = other.extended(width);
        a.iter().rev().cmp(b.iter().rev())
    }

    /// `==` as a 1-bit value.
    pub fn cmp_eq(&self, rhs: &Value) -> Value {
        Self::from_bool(self.compare(rhs) == Ordering::Equal)
    }

    /// `!=` as a 1-bit value.
    pub fn cmp_ne(&self, rhs: &Value) -> Value {
        Self::from_bool(self.compare(rhs) != Ordering::Equal)
    }

    /// `<` as a 1-bit value.
    pub fn cmp_lt(&self, rhs: &Value) -> Value {
        Self::from_bool(self.compare(rhs) == Ordering::Less)
    }

    /// `<=` as a 1-bit value.
    pub fn cmp_le(&self, rhs: &Value) -> Value {
        Self::from_bool(self.compare(rhs) != Ordering::Greater)
    }

    /// `>` as a 1-bit value.
    pub fn cmp_gt(&self, rhs: &Value) -> Value {
        Self::from_bool(self.compare(rhs) == Ordering::Greater)
    }

    /// `>=` as a 1-bit value.
    pub fn cmp_ge(&self, rhs: &Value) -> Value {
        Self::from_bool(self.compare(rhs) != Ordering::Less)
    }

    /// `a` if `sel` is non-zero, else `b`, in the union of both shapes.
    pub fn mux(sel: &Value, a: &Value, b: &Value) -> Value {
        let shape = a.shape().union(b.shape());
        if sel.is_zero() {
            b.cast(shape)
        } else {
            a.cast(shape)
        }
    }

    /// Returns `true` if both values have the same width and bit pattern.
    pub fn same_bits(&self, other: &Value) -> bool {
        self.width == other.width && self.words == other.words
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.signed == other.signed && self.compare(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::int(value)
    }
}

impl From<bool> for Value {
    fn from(bit: bool) -> Self {
        Value::from_bool(bit)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in (0..self.width).rev() {
            f.write_str(if self.bit(i) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({}, 0b{self})", self.shape())
    }
}

impl Not for &Value {
    type Output = Value;

    fn not(self) -> Value {
        Value::not(self)
    }
}

impl Neg for &Value {
    type Output = Value;

    fn neg(self) -> Value {
        Value::neg(self)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $inherent:ident) => {
        impl $trait for &Value {
            type Output = Value;

            fn $method(self, rhs: &Value) -> Value {
                Value::$inherent(self, rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, add);
impl_binary_op!(Sub, sub, sub);
impl_binary_op!(Mul, mul, mul);
impl_binary_op!(BitAnd, bitand, and);
impl_binary_op!(BitOr, bitor, or);
impl_binary_op!(BitXor, bitxor, xor);
