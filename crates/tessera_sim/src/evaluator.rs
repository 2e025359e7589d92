//! Expression evaluator and statement executor.
//!
//! [`eval_expr`] recursively evaluates an IR [`Expr`] into a [`Value`],
//! reading committed signal values from the [`SignalTable`]. [`exec_statement`]
//! executes a [`Statement`] tree, collecting writes in a [`PendingUpdates`]
//! buffer for the caller to commit once the pass is complete.
//!
//! Runtime addresses never fail: part-select offsets clamp into
//! `[0, width - part_width]` and array indices clamp into `[0, len - 1]`.

use tessera_common::{Shape, Value};
use tessera_ir::{BinaryOp, Expr, Fragment, SignalId, Statement, Target, UnaryOp};

use crate::error::SimError;
use crate::state::{PendingUpdates, SignalTable};

/// Read-only view used while evaluating one pass.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    /// Declarations, for shapes and reset values.
    pub fragment: &'a Fragment,
    /// Committed values; reads never observe pending writes.
    pub values: &'a SignalTable,
}

impl<'a> EvalContext<'a> {
    /// A context reading `values`.
    pub fn new(fragment: &'a Fragment, values: &'a SignalTable) -> Self {
        Self { fragment, values }
    }

    fn signal_width(&self, id: SignalId) -> u32 {
        self.fragment.signal(id).shape.width
    }
}

/// Clamps a runtime offset so a `width`-bit window fits in `total` bits.
///
/// Returns `None` when the window is wider than the whole value.
pub fn clamp_offset(offset: &Value, width: u32, total: u32) -> Option<u32> {
    let max = total.checked_sub(width)?;
    let raw = offset.to_i64_saturating().clamp(0, i64::from(max));
    Some(raw as u32)
}

/// Clamps a runtime index into `0..len`. `len` must be non-zero.
pub fn clamp_index(index: &Value, len: usize) -> usize {
    let last = len.saturating_sub(1);
    let raw = index.to_i64_saturating();
    if raw <= 0 {
        0
    } else {
        usize::try_from(raw).map_or(last, |i| i.min(last))
    }
}

/// Evaluates an expression against committed signal values.
pub fn eval_expr(ctx: &EvalContext<'_>, expr: &Expr) -> Result<Value, SimError> {
    match expr {
        Expr::Const(value) => Ok(value.clone()),

        Expr::Signal(id) => Ok(ctx.values.get(*id).clone()),

        Expr::Unary { op, operand } => {
            let val = eval_expr(ctx, operand)?;
            Ok(match op {
                UnaryOp::Not => val.not(),
                UnaryOp::Neg => val.neg(),
                UnaryOp::Bool => val.boolean(),
                UnaryOp::AsSigned => val.as_signed(),
                UnaryOp::AsUnsigned => val.as_unsigned(),
            })
        }

        Expr::Binary { op, lhs, rhs } => {
            let l = eval_expr(ctx, lhs)?;
            let r = eval_expr(ctx, rhs)?;
            eval_binary(*op, &l, &r)
        }

        Expr::Mux {
            sel,
            if_true,
            if_false,
        } => {
            let sel = eval_expr(ctx, sel)?;
            let a = eval_expr(ctx, if_true)?;
            let b = eval_expr(ctx, if_false)?;
            Ok(Value::mux(&sel, &a, &b))
        }

        Expr::Slice { base, start, end } => {
            let val = eval_expr(ctx, base)?;
            if *start > *end || *end > val.width() {
                return Ok(Value::zero(Shape::unsigned(end.saturating_sub(*start))));
            }
            Ok(val.slice(*start, *end))
        }

        Expr::Part {
            base,
            offset,
            width,
        } => {
            let val = eval_expr(ctx, base)?;
            let off = eval_expr(ctx, offset)?;
            Ok(match clamp_offset(&off, *width, val.width()) {
                Some(start) => val.slice(start, start + width),
                None => Value::zero(Shape::unsigned(*width)),
            })
        }

        Expr::Cat(parts) => {
            let values = parts
                .iter()
                .map(|p| eval_expr(ctx, p))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::cat(&values))
        }

        Expr::Repl { value, count } => Ok(eval_expr(ctx, value)?.repl(*count)),

        Expr::Index { elements, index } => {
            let shape = expr.shape(ctx.fragment.signals())?;
            let idx = eval_expr(ctx, index)?;
            let Some(element) = elements.get(clamp_index(&idx, elements.len())) else {
                return Ok(Value::zero(shape));
            };
            Ok(eval_expr(ctx, element)?.cast(shape))
        }
    }
}

fn eval_binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, SimError> {
    Ok(match op {
        BinaryOp::Add => l.add(r),
        BinaryOp::Sub => l.sub(r),
        BinaryOp::Mul => l.mul(r),
        BinaryOp::And => l.and(r),
        BinaryOp::Or => l.or(r),
        BinaryOp::Xor => l.xor(r),
        BinaryOp::Shl => l.shl(r)?,
        BinaryOp::Shr => l.shr(r)?,
        BinaryOp::Eq => l.cmp_eq(r),
        BinaryOp::Ne => l.cmp_ne(r),
        BinaryOp::Lt => l.cmp_lt(r),
        BinaryOp::Le => l.cmp_le(r),
        BinaryOp::Gt => l.cmp_gt(r),
        BinaryOp::Ge => l.cmp_ge(r),
    })
}

/// Executes a statement, collecting its writes into `pending`.
pub fn exec_statement(
    ctx: &EvalContext<'_>,
    stmt: &Statement,
    pending: &mut PendingUpdates,
) -> Result<(), SimError> {
    match stmt {
        Statement::Assign { target, value } => {
            let val = eval_expr(ctx, value)?;
            assign(ctx, target, &val, pending)
        }

        Statement::Switch { test, cases } => {
            let test = eval_expr(ctx, test)?;
            if let Some(case) = cases.iter().find(|c| c.matches(&test)) {
                for s in &case.body {
                    exec_statement(ctx, s, pending)?;
                }
            }
            Ok(())
        }

        Statement::Sequence(stmts) => {
            for s in stmts {
                exec_statement(ctx, s, pending)?;
            }
            Ok(())
        }
    }
}

/// Writes `value`, resized to the target's runtime width, into `target`.
///
/// The value is sign- or zero-extended by its own signedness, or truncated.
pub fn assign(
    ctx: &EvalContext<'_>,
    target: &Target,
    value: &Value,
    pending: &mut PendingUpdates,
) -> Result<(), SimError> {
    let width = target_width(ctx, target)?;
    let bits = value.cast(Shape::unsigned(width));
    write_at(ctx, target, 0, &bits, pending)
}

/// The number of bits `target` addresses with the current signal values.
pub fn target_width(ctx: &EvalContext<'_>, target: &Target) -> Result<u32, SimError> {
    Ok(match target {
        Target::Signal(id) => ctx.signal_width(*id),
        Target::Slice { start, end, .. } => end.saturating_sub(*start),
        Target::Part { width, .. } => *width,
        Target::Index { elements, index } => {
            let idx = eval_expr(ctx, index)?;
            match elements.get(clamp_index(&idx, elements.len())) {
                Some(element) => target_width(ctx, element)?,
                None => 0,
            }
        }
        Target::Cat(parts) => {
            let mut total = 0u32;
            for part in parts {
                total = total.saturating_add(target_width(ctx, part)?);
            }
            total
        }
    })
}

/// The low `width` bits of `bits`, or all of them if it is narrower.
fn clip(bits: &Value, width: u32) -> Value {
    bits.slice(0, bits.width().min(width))
}

/// Writes `bits` into `target` starting at bit `offset` of the target.
/// Bits past the end of the target are dropped.
fn write_at(
    ctx: &EvalContext<'_>,
    target: &Target,
    offset: u32,
    bits: &Value,
    pending: &mut PendingUpdates,
) -> Result<(), SimError> {
    match target {
        Target::Signal(id) => {
            pending.write(ctx.values, *id, offset, bits);
            Ok(())
        }

        Target::Slice { base, start, end } => {
            let room = end.saturating_sub(*start).saturating_sub(offset);
            let at = start.saturating_add(offset);
            write_at(ctx, base, at, &clip(bits, room), pending)
        }

        Target::Part {
            base,
            offset: part_offset,
            width,
        } => {
            let total = target_width(ctx, base)?;
            let off = eval_expr(ctx, part_offset)?;
            // A window wider than its base addresses nothing.
            let Some(start) = clamp_offset(&off, *width, total) else {
                return Ok(());
            };
            let room = width.saturating_sub(offset);
            write_at(ctx, base, start + offset, &clip(bits, room), pending)
        }

        Target::Index { elements, index } => {
            let idx = eval_expr(ctx, index)?;
            match elements.get(clamp_index(&idx, elements.len())) {
                Some(element) => write_at(ctx, element, offset, bits, pending),
                None => Ok(()),
            }
        }

        Target::Cat(parts) => {
            let end = offset.saturating_add(bits.width());
            let mut pos = 0u32;
            for part in parts {
                let part_width = target_width(ctx, part)?;
                let part_end = pos.saturating_add(part_width);
                let lo = offset.max(pos);
                let hi = end.min(part_end);
                if lo < hi {
                    let chunk = bits.slice(lo - offset, hi - offset);
                    write_at(ctx, part, lo - pos, &chunk, pending)?;
                }
                pos = part_end;
            }
            Ok(())
        }
    }
}
