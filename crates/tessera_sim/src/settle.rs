//! Combinational settlement and clocked-domain updates.
//!
//! [`settle`] iterates the combinational statements to a fixed point. Every
//! pass evaluates all statements against the values committed by the previous
//! pass, starting each combinational signal from its reset value, and then
//! commits the whole pass at once. A pass that changes nothing ends the
//! iteration; reaching the pass ceiling first is a combinational loop.
//!
//! [`apply_clock_edges`] runs the clocked statements of every domain that saw
//! an active edge, all reading the same pre-edge snapshot.

use std::collections::BTreeSet;

use tessera_common::SimTime;
use tessera_ir::{DomainId, Fragment, SignalId};
use tracing::trace;

use crate::error::SimError;
use crate::evaluator::{exec_statement, EvalContext};
use crate::state::{PendingUpdates, SignalTable};

/// Result of a successful settlement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settled {
    /// Evaluation passes run, including the final unchanged one.
    pub passes: u32,
    /// Signals whose committed value changed, in ID order.
    pub changed: BTreeSet<SignalId>,
}

/// Iterates combinational logic until no signal changes.
///
/// `time` is only used to label a [`SimError::CombinationalLoop`].
pub fn settle(
    fragment: &Fragment,
    values: &mut SignalTable,
    max_passes: u32,
    time: SimTime,
) -> Result<Settled, SimError> {
    let comb = fragment.comb_signals();
    let mut settled = Settled::default();
    loop {
        settled.passes += 1;
        let mut pending = PendingUpdates::new();
        for &id in &comb {
            pending.preset(id, fragment.signal(id).reset.clone());
        }
        let ctx = EvalContext::new(fragment, values);
        for stmt in fragment.comb_statements() {
            exec_statement(&ctx, stmt, &mut pending)?;
        }
        let changed = values.commit(pending);
        trace!(pass = settled.passes, changed = changed.len(), "settlement pass");
        if changed.is_empty() {
            return Ok(settled);
        }
        if settled.passes >= max_passes {
            return Err(SimError::CombinationalLoop {
                time,
                passes: max_passes,
                signals: changed
                    .iter()
                    .map(|&id| fragment.signal(id).name.clone())
                    .collect(),
            });
        }
        settled.changed.extend(changed);
    }
}

/// Runs the clocked statements of `domains` once, reading one shared snapshot.
///
/// A domain whose reset signal is high restores the reset value of every
/// signal it drives, except those marked reset-less. Returns the signals that
/// changed.
pub fn apply_clock_edges(
    fragment: &Fragment,
    values: &mut SignalTable,
    domains: &[DomainId],
) -> Result<Vec<SignalId>, SimError> {
    let mut pending = PendingUpdates::new();
    let ctx = EvalContext::new(fragment, values);
    for &domain in domains {
        for stmt in fragment.clocked_statements(domain) {
            exec_statement(&ctx, stmt, &mut pending)?;
        }
        let in_reset = fragment.domains()[domain]
            .rst
            .is_some_and(|rst| !values.get(rst).is_zero());
        if in_reset {
            for id in fragment.clocked_signals(domain) {
                let signal = fragment.signal(id);
                if !signal.reset_less {
                    pending.preset(id, signal.reset.clone());
                }
            }
        }
    }
    Ok(values.commit(pending))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::{Shape, Value};
    use tessera_ir::{ClockDomain, Expr, FragmentBuilder, Signal, Statement, Target};

    #[test]
    fn chain_settles_and_rerun_takes_one_pass() {
        let mut b = FragmentBuilder::new();
        let a = b.add_signal(Signal::new("a", Shape::unsigned(4)).with_reset(3i64));
        let x = b.signal("x", Shape::unsigned(5));
        let y = b.signal("y", Shape::unsigned(6));
        // declared out of dependency order on purpose
        b.comb(Statement::assign(y, Expr::from(x) + 1i64));
        b.comb(Statement::assign(x, Expr::from(a) + 1i64));
        let frag = b.build().unwrap();
        let mut values = SignalTable::from_resets(&frag);

        let first = settle(&frag, &mut values, 100, SimTime::ZERO).unwrap();
        assert_eq!(values.get(y).to_u64(), 5);
        assert_eq!(first.passes, 3);
        assert_eq!(first.changed, BTreeSet::from([x, y]));

        let again = settle(&frag, &mut values, 100, SimTime::ZERO).unwrap();
        assert_eq!(again.passes, 1);
        assert!(again.changed.is_empty());
    }

    #[test]
    fn unassigned_branches_fall_back_to_reset() {
        let mut b = FragmentBuilder::new();
        let en = b.signal("en", Shape::unsigned(1));
        let y = b.add_signal(Signal::new("y", Shape::unsigned(4)).with_reset(9i64));
        b.comb(Statement::when(en, vec![Statement::assign(y, 2i64)]));
        let frag = b.build().unwrap();
        let mut values = SignalTable::from_resets(&frag);

        settle(&frag, &mut values, 10, SimTime::ZERO).unwrap();
        assert_eq!(values.get(y).to_u64(), 9);

        let mut pending = PendingUpdates::new();
        pending.preset(en, Value::from_bool(true));
        values.commit(pending);
        settle(&frag, &mut values, 10, SimTime::ZERO).unwrap();
        assert_eq!(values.get(y).to_u64(), 2);

        let mut pending = PendingUpdates::new();
        pending.preset(en, Value::from_bool(false));
        values.commit(pending);
        settle(&frag, &mut values, 10, SimTime::ZERO).unwrap();
        assert_eq!(values.get(y).to_u64(), 9);
    }

    #[test]
    fn oscillator_hits_ceiling() {
        let mut b = FragmentBuilder::new();
        let s = b.signal("s", Shape::unsigned(1));
        b.comb(Statement::assign(s, !Expr::from(s)));
        let frag = b.build().unwrap();
        let mut values = SignalTable::from_resets(&frag);

        let err = settle(&frag, &mut values, 50, SimTime::from_ns(2)).unwrap_err();
        match err {
            SimError::CombinationalLoop {
                time,
                passes,
                signals,
            } => {
                assert_eq!(time, SimTime::from_ns(2));
                assert_eq!(passes, 50);
                assert_eq!(signals, vec!["s".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_feeding_slices_converge() {
        let mut b = FragmentBuilder::new();
        let a = b.add_signal(Signal::new("a", Shape::unsigned(1)).with_reset(1i64));
        let y = b.signal("y", Shape::unsigned(2));
        b.comb(Statement::assign(Target::from(y).bit(0), a));
        b.comb(Statement::assign(Target::from(y).bit(1), Expr::from(y).bit(0)));
        let frag = b.build().unwrap();
        let mut values = SignalTable::from_resets(&frag);
        let settled = settle(&frag, &mut values, 10, SimTime::ZERO).unwrap();
        assert_eq!(values.get(y).to_u64(), 0b11);
        assert_eq!(settled.passes, 3);
    }

    #[test]
    fn clocked_update_and_sync_reset() {
        let mut b = FragmentBuilder::new();
        let clk = b.signal("clk", Shape::unsigned(1));
        let rst = b.signal("rst", Shape::unsigned(1));
        let count = b.add_signal(Signal::new("count", Shape::unsigned(4)).with_reset(1i64));
        let seen = b.add_signal(Signal::new("seen", Shape::unsigned(4)).reset_less());
        let sync = b.domain(ClockDomain::new("sync", clk).with_reset(rst));
        b.sync(sync, Statement::assign(count, Expr::from(count) + 1i64));
        b.sync(sync, Statement::assign(seen, count));
        let frag = b.build().unwrap();
        let mut values = SignalTable::from_resets(&frag);

        let changed = apply_clock_edges(&frag, &mut values, &[sync]).unwrap();
        assert_eq!(changed, vec![count, seen]);
        assert_eq!(values.get(count).to_u64(), 2);
        assert_eq!(values.get(seen).to_u64(), 1, "reads the pre-edge snapshot");

        let mut pending = PendingUpdates::new();
        pending.preset(rst, Value::from_bool(true));
        values.commit(pending);
        apply_clock_edges(&frag, &mut values, &[sync]).unwrap();
        assert_eq!(values.get(count).to_u64(), 1);
        assert_eq!(values.get(seen).to_u64(), 2, "reset-less signals keep updating");
    }
}
