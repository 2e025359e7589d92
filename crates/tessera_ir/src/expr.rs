//! Expressions over signals and constants.
//!
//! [`Expr`] trees are built with ordinary Rust operators (`a + b`, `!a`,
//! `a << n`) and a few named constructors for operations that have no operator
//! (slices, part-selects, concatenation, multiplexers). Result shapes follow
//! the rules in [`tessera_common::shape`] and are checked once, when the
//! enclosing fragment is built.

use serde::{Deserialize, Serialize};
use std::ops::{Add, BitAnd, BitOr, BitXor, Mul, Neg, Not, Shl, Shr, Sub};
use tessera_common::{Shape, ShapeError, Value};

use crate::arena::Arena;
use crate::error::FragmentError;
use crate::ids::SignalId;
use crate::signal::Signal;

/// Single-operand operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Bitwise NOT (`~a`).
    Not,
    /// Two's-complement negation (`-a`).
    Neg,
    /// 1 iff any bit is set.
    Bool,
    /// Reinterpret as signed.
    AsSigned,
    /// Reinterpret as unsigned.
    AsUnsigned,
}

/// Two-operand operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a & b`
    And,
    /// `a | b`
    Or,
    /// `a ^ b`
    Xor,
    /// `a << b`
    Shl,
    /// `a >> b`
    Shr,
    /// `a == b`
    Eq,
    /// `a != b`
    Ne,
    /// `a < b`
    Lt,
    /// `a <= b`
    Le,
    /// `a > b`
    Gt,
    /// `a >= b`
    Ge,
}

impl BinaryOp {
    /// Returns `true` for the comparison operators, which yield one bit.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// An expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A constant.
    Const(Value),
    /// The current value of a signal.
    Signal(SignalId),
    /// A unary operation.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expr>,
    },
    /// A binary operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// `if_true` when `sel` is non-zero, else `if_false`.
    Mux {
        /// Selector.
        sel: Box<Expr>,
        /// Chosen when the selector is non-zero.
        if_true: Box<Expr>,
        /// Chosen when the selector is zero.
        if_false: Box<Expr>,
    },
    /// Bits `start..end` of `base`, fixed at construction.
    Slice {
        /// Sliced value.
        base: Box<Expr>,
        /// First bit.
        start: u32,
        /// One past the last bit.
        end: u32,
    },
    /// A `width`-bit window of `base` at a runtime offset, clamped to stay inside `base`.
    Part {
        /// Selected value.
        base: Box<Expr>,
        /// Runtime bit offset.
        offset: Box<Expr>,
        /// Window width.
        width: u32,
    },
    /// Concatenation; the first part occupies the least significant bits.
    Cat(Vec<Expr>),
    /// `count` copies of `value`, concatenated.
    Repl {
        /// Repeated value.
        value: Box<Expr>,
        /// Number of copies.
        count: u32,
    },
    /// One of `elements`, chosen at runtime; out-of-range indices clamp.
    Index {
        /// Candidates, in index order.
        elements: Vec<Expr>,
        /// Runtime index.
        index: Box<Expr>,
    },
}

impl Expr {
    /// An integer constant in its narrowest shape.
    pub fn constant(value: i64) -> Self {
        Expr::Const(Value::int(value))
    }

    fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: impl Into<Expr>) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs.into()),
        }
    }

    /// Bits `start..end`.
    pub fn slice(self, start: u32, end: u32) -> Self {
        Expr::Slice {
            base: Box::new(self),
            start,
            end,
        }
    }

    /// Bit `index`.
    pub fn bit(self, index: u32) -> Self {
        self.slice(index, index.saturating_add(1))
    }

    /// A `width`-bit window at a runtime offset.
    pub fn part(self, offset: impl Into<Expr>, width: u32) -> Self {
        Expr::Part {
            base: Box::new(self),
            offset: Box::new(offset.into()),
            width,
        }
    }

    /// Concatenates `parts`, first part least significant.
    pub fn cat(parts: impl IntoIterator<Item = impl Into<Expr>>) -> Self {
        Expr::Cat(parts.into_iter().map(Into::into).collect())
    }

    /// `count` copies of this expression.
    pub fn repl(self, count: u32) -> Self {
        Expr::Repl {
            value: Box::new(self),
            count,
        }
    }

    /// `if_true` when `sel` is non-zero, else `if_false`.
    pub fn mux(sel: impl Into<Expr>, if_true: impl Into<Expr>, if_false: impl Into<Expr>) -> Self {
        Expr::Mux {
            sel: Box::new(sel.into()),
            if_true: Box::new(if_true.into()),
            if_false: Box::new(if_false.into()),
        }
    }

    /// 1 iff any bit is set.
    pub fn boolean(self) -> Self {
        Self::unary(UnaryOp::Bool, self)
    }

    /// The same bits read as signed.
    pub fn as_signed(self) -> Self {
        Self::unary(UnaryOp::AsSigned, self)
    }

    /// The same bits read as unsigned.
    pub fn as_unsigned(self) -> Self {
        Self::unary(UnaryOp::AsUnsigned, self)
    }

    /// `self == rhs`
    pub fn is_eq(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Eq, self, rhs)
    }

    /// `self != rhs`
    pub fn is_ne(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Ne, self, rhs)
    }

    /// `self < rhs`
    pub fn lt(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Lt, self, rhs)
    }

    /// `self <= rhs`
    pub fn le(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Le, self, rhs)
    }

    /// `self > rhs`
    pub fn gt(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Gt, self, rhs)
    }

    /// `self >= rhs`
    pub fn ge(self, rhs: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Ge, self, rhs)
    }

    /// Infers the result shape, checking every signal reference, static slice
    /// and intermediate width along the way.
    pub fn shape(&self, signals: &Arena<SignalId, Signal>) -> Result<Shape, FragmentError> {
        let shape = match self {
            Expr::Const(value) => value.shape(),
            Expr::Signal(id) => signal_shape(signals, *id)?,
            Expr::Unary { op, operand } => {
                let inner = operand.shape(signals)?;
                match op {
                    UnaryOp::Not => inner.not(),
                    UnaryOp::Neg => inner.neg(),
                    UnaryOp::Bool => Shape::unsigned(1),
                    UnaryOp::AsSigned => Shape::signed(inner.width),
                    UnaryOp::AsUnsigned => Shape::unsigned(inner.width),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let (a, b) = (lhs.shape(signals)?, rhs.shape(signals)?);
                match op {
                    BinaryOp::Add | BinaryOp::Sub => a.add(b),
                    BinaryOp::Mul => a.mul(b),
                    BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => a.bitwise(b),
                    BinaryOp::Shl => a.shl(b)?,
                    BinaryOp::Shr => a.shr(b)?,
                    _ => Shape::unsigned(1),
                }
            }
            Expr::Mux {
                sel,
                if_true,
                if_false,
            } => {
                sel.shape(signals)?;
                if_true.shape(signals)?.union(if_false.shape(signals)?)
            }
            Expr::Slice { base, start, end } => {
                let width = base.shape(signals)?.width;
                check_slice(*start, *end, width)?;
                Shape::unsigned(end - start)
            }
            Expr::Part {
                base,
                offset,
                width,
            } => {
                base.shape(signals)?;
                offset.shape(signals)?;
                Shape::unsigned(*width)
            }
            Expr::Cat(parts) => {
                let mut total = 0u64;
                for part in parts {
                    total += u64::from(part.shape(signals)?.width);
                }
                Shape::unsigned(narrow_width(total)?)
            }
            Expr::Repl { value, count } => {
                let width = u64::from(value.shape(signals)?.width) * u64::from(*count);
                Shape::unsigned(narrow_width(width)?)
            }
            Expr::Index { elements, index } => {
                index.shape(signals)?;
                let mut shapes = elements.iter().map(|e| e.shape(signals));
                let first = shapes.next().ok_or(FragmentError::EmptyArray)??;
                shapes.try_fold(first, |acc, s| s.map(|s| acc.union(s)))?
            }
        };
        Ok(shape.checked()?)
    }

    /// Calls `f` for every signal this expression reads.
    pub fn for_each_signal(&self, f: &mut dyn FnMut(SignalId)) {
        match self {
            Expr::Const(_) => {}
            Expr::Signal(id) => f(*id),
            Expr::Unary { operand, .. } => operand.for_each_signal(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each_signal(f);
                rhs.for_each_signal(f);
            }
            Expr::Mux {
                sel,
                if_true,
                if_false,
            } => {
                sel.for_each_signal(f);
                if_true.for_each_signal(f);
                if_false.for_each_signal(f);
            }
            Expr::Slice { base, .. } | Expr::Repl { value: base, .. } => base.for_each_signal(f),
            Expr::Part { base, offset, .. } => {
                base.for_each_signal(f);
                offset.for_each_signal(f);
            }
            Expr::Cat(parts) => parts.iter().for_each(|p| p.for_each_signal(f)),
            Expr::Index { elements, index } => {
                elements.iter().for_each(|e| e.for_each_signal(f));
                index.for_each_signal(f);
            }
        }
    }
}

pub(crate) fn signal_shape(
    signals: &Arena<SignalId, Signal>,
    id: SignalId,
) -> Result<Shape, FragmentError> {
    signals
        .try_get(id)
        .map(|s| s.shape)
        .ok_or_else(|| FragmentError::UnknownSignal(id.to_string()))
}

pub(crate) fn check_slice(start: u32, end: u32, width: u32) -> Result<(), FragmentError> {
    if start > end || end > width {
        return Err(FragmentError::SliceOutOfRange { start, end, width });
    }
    Ok(())
}

pub(crate) fn narrow_width(width: u64) -> Result<u32, ShapeError> {
    u32::try_from(width)
        .ok()
        .and_then(|w| Shape::unsigned(w).checked().ok())
        .map(|s| s.width)
        .ok_or(ShapeError::WidthOverflow {
            width,
            max: tessera_common::MAX_WIDTH,
        })
}

impl From<SignalId> for Expr {
    fn from(id: SignalId) -> Self {
        Expr::Signal(id)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Const(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Const(Value::int(value))
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::unary(UnaryOp::Not, self)
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Neg, self)
    }
}

macro_rules! impl_expr_op {
    ($trait:ident, $method:ident, $op:ident) => {
        impl<R: Into<Expr>> $trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::binary(BinaryOp::$op, self, rhs)
            }
        }
    };
}

impl_expr_op!(Add, add, Add);
impl_expr_op!(Sub, sub, Sub);
impl_expr_op!(Mul, mul, Mul);
impl_expr_op!(BitAnd, bitand, And);
impl_expr_op!(BitOr, bitor, Or);
impl_expr_op!(BitXor, bitxor, Xor);
impl_expr_op!(Shl, shl, Shl);
impl_expr_op!(Shr, shr, Shr);
