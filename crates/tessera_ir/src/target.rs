//! Assignable locations.
//!
//! A [`Target`] names bits of one or more signals: a whole signal, a static
//! slice, a runtime part-select, an array element chosen at runtime, or a
//! concatenation of targets. Targets never own storage; the simulator resolves
//! them against its value table each time an assignment executes.

use serde::{Deserialize, Serialize};

use crate::arena::Arena;
use crate::error::FragmentError;
use crate::expr::{check_slice, narrow_width, signal_shape, Expr};
use crate::ids::SignalId;
use crate::signal::Signal;

/// The left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Target {
    /// Every bit of a signal.
    Signal(SignalId),
    /// Bits `start..end` of `base`.
    Slice {
        /// Sliced target.
        base: Box<Target>,
        /// First bit.
        start: u32,
        /// One past the last bit.
        end: u32,
    },
    /// A `width`-bit window of `base` at a runtime offset.
    Part {
        /// Selected target.
        base: Box<Target>,
        /// Runtime bit offset, clamped into range.
        offset: Expr,
        /// Window width.
        width: u32,
    },
    /// One of `elements`, chosen at runtime; out-of-range indices clamp.
    Index {
        /// Candidate targets.
        elements: Vec<Target>,
        /// Runtime index.
        index: Expr,
    },
    /// Several targets written as one value, first target least significant.
    Cat(Vec<Target>),
}

impl Target {
    /// Bits `start..end` of this target.
    pub fn slice(self, start: u32, end: u32) -> Self {
        Target::Slice {
            base: Box::new(self),
            start,
            end,
        }
    }

    /// Bit `index` of this target.
    pub fn bit(self, index: u32) -> Self {
        self.slice(index, index.saturating_add(1))
    }

    /// A `width`-bit window at a runtime offset.
    pub fn part(self, offset: impl Into<Expr>, width: u32) -> Self {
        Target::Part {
            base: Box::new(self),
            offset: offset.into(),
            width,
        }
    }

    /// Concatenation of targets, first target least significant.
    pub fn cat(parts: impl IntoIterator<Item = impl Into<Target>>) -> Self {
        Target::Cat(parts.into_iter().map(Into::into).collect())
    }

    /// The expression reading the same bits.
    pub fn to_expr(&self) -> Expr {
        match self {
            Target::Signal(id) => Expr::Signal(*id),
            Target::Slice { base, start, end } => base.to_expr().slice(*start, *end),
            Target::Part {
                base,
                offset,
                width,
            } => base.to_expr().part(offset.clone(), *width),
            Target::Index { elements, index } => Expr::Index {
                elements: elements.iter().map(Target::to_expr).collect(),
                index: Box::new(index.clone()),
            },
            Target::Cat(parts) => Expr::Cat(parts.iter().map(Target::to_expr).collect()),
        }
    }

    /// The widest number of bits this target can address, validating slices,
    /// signal references and the runtime offset/index expressions.
    pub fn static_width(&self, signals: &Arena<SignalId, Signal>) -> Result<u32, FragmentError> {
        match self {
            Target::Signal(id) => Ok(signal_shape(signals, *id)?.width),
            Target::Slice { base, start, end } => {
                check_slice(*start, *end, base.static_width(signals)?)?;
                Ok(end - start)
            }
            Target::Part {
                base,
                offset,
                width,
            } => {
                base.static_width(signals)?;
                offset.shape(signals)?;
                Ok(*width)
            }
            Target::Index { elements, index } => {
                index.shape(signals)?;
                if elements.is_empty() {
                    return Err(FragmentError::EmptyArray);
                }
                elements.iter().try_fold(0, |widest, element| {
                    Ok(widest.max(element.static_width(signals)?))
                })
            }
            Target::Cat(parts) => {
                let mut total = 0u64;
                for part in parts {
                    total += u64::from(part.static_width(signals)?);
                }
                Ok(narrow_width(total)?)
            }
        }
    }

    /// Calls `f` for every signal an assignment to this target may change.
    pub fn for_each_driven(&self, f: &mut dyn FnMut(SignalId)) {
        match self {
            Target::Signal(id) => f(*id),
            Target::Slice { base, .. } | Target::Part { base, .. } => base.for_each_driven(f),
            Target::Index { elements, .. } => elements.iter().for_each(|e| e.for_each_driven(f)),
            Target::Cat(parts) => parts.iter().for_each(|p| p.for_each_driven(f)),
        }
    }

    /// Calls `f` for every signal read while resolving this target's address.
    pub fn for_each_read(&self, f: &mut dyn FnMut(SignalId)) {
        match self {
            Target::Signal(_) => {}
            Target::Slice { base, .. } => base.for_each_read(f),
            Target::Part { base, offset, .. } => {
                base.for_each_read(f);
                offset.for_each_signal(f);
            }
            Target::Index { elements, index } => {
                elements.iter().for_each(|e| e.for_each_read(f));
                index.for_each_signal(f);
            }
            Target::Cat(parts) => parts.iter().for_each(|p| p.for_each_read(f)),
        }
    }
}

impl From<SignalId> for Target {
    fn from(id: SignalId) -> Self {
        Target::Signal(id)
    }
}

impl TryFrom<Expr> for Target {
    type Error = FragmentError;

    /// Converts the addressing subset of expressions into a target.
    fn try_from(expr: Expr) -> Result<Self, Self::Error> {
        match expr {
            Expr::Signal(id) => Ok(Target::Signal(id)),
            Expr::Slice { base, start, end } => Ok(Target::try_from(*base)?.slice(start, end)),
            Expr::Part {
                base,
                offset,
                width,
            } => Ok(Target::try_from(*base)?.part(*offset, width)),
            Expr::Index { elements, index } => Ok(Target::Index {
                elements: elements
                    .into_iter()
                    .map(Target::try_from)
                    .collect::<Result<_, _>>()?,
                index: *index,
            }),
            Expr::Cat(parts) => Ok(Target::Cat(
                parts
                    .into_iter()
                    .map(Target::try_from)
                    .collect::<Result<_, _>>()?,
            )),
            other => Err(FragmentError::NotAssignable(format!("{other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::Shape;

    fn signals() -> (Arena<SignalId, Signal>, SignalId, SignalId) {
        let mut arena = Arena::new();
        let y = arena.alloc(Signal::new("y", Shape::unsigned(8)));
        let a = arena.alloc(Signal::new("a", Shape::unsigned(3)));
        (arena, y, a)
    }

    #[test]
    fn static_widths() {
        let (arena, y, a) = signals();
        assert_eq!(Target::from(y).static_width(&arena).unwrap(), 8);
        assert_eq!(Target::from(y).slice(2, 4).static_width(&arena).unwrap(), 2);
        assert_eq!(Target::from(y).part(a, 3).static_width(&arena).unwrap(), 3);
        assert_eq!(Target::cat([y, a]).static_width(&arena).unwrap(), 11);
        let idx = Target::Index {
            elements: vec![y.into(), a.into()],
            index: Expr::from(a),
        };
        assert_eq!(idx.static_width(&arena).unwrap(), 8);
    }

    #[test]
    fn slice_out_of_range() {
        let (arena, _, a) = signals();
        assert!(matches!(
            Target::from(a).slice(1, 4).static_width(&arena),
            Err(FragmentError::SliceOutOfRange { .. })
        ));
    }

    #[test]
    fn empty_index_rejected() {
        let (arena, _, a) = signals();
        let idx = Target::Index {
            elements: vec![],
            index: Expr::from(a),
        };
        assert_eq!(idx.static_width(&arena), Err(FragmentError::EmptyArray));
    }

    #[test]
    fn expr_conversion_roundtrip() {
        let (_, y, a) = signals();
        let target = Target::from(y).part(a, 3).bit(1);
        let back = Target::try_from(target.to_expr()).unwrap();
        assert_eq!(back, target);
    }

    #[test]
    fn non_storage_expressions_are_not_assignable() {
        let (_, y, _) = signals();
        let err = Target::try_from(Expr::from(y) + 1i64).unwrap_err();
        assert!(matches!(err, FragmentError::NotAssignable(_)));
        assert!(Target::try_from(Expr::constant(3)).is_err());
    }

    #[test]
    fn driven_and_read_signals() {
        let (_, y, a) = signals();
        let target = Target::cat([Target::from(y).part(a, 2), Target::from(a)]);
        let mut driven = Vec::new();
        target.for_each_driven(&mut |id| driven.push(id));
        assert_eq!(driven, vec![y, a]);
        let mut read = Vec::new();
        target.for_each_read(&mut |id| read.push(id));
        assert_eq!(read, vec![a]);
    }
}
