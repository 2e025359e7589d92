//! Signal storage owned by the simulator.
//!
//! [`SignalTable`] holds the committed value of every signal, indexed by
//! [`SignalId`]. Statement execution never writes it directly: assignments go
//! to a [`PendingUpdates`] buffer, which merges partial writes and is
//! committed in one step once the whole pass has run.

use std::collections::BTreeMap;

use tessera_common::Value;
use tessera_ir::{ArenaId, Fragment, SignalId};

/// Committed signal values.
#[derive(Debug, Clone)]
pub struct SignalTable {
    values: Vec<Value>,
}

impl SignalTable {
    /// Every signal at its reset value.
    pub fn from_resets(fragment: &Fragment) -> Self {
        Self {
            values: fragment
                .signals()
                .values()
                .map(|s| s.reset.clone())
                .collect(),
        }
    }

    /// The committed value of `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not belong to the fragment the table was built from.
    pub fn get(&self, id: SignalId) -> &Value {
        &self.values[id.index()]
    }

    /// Number of signals.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the fragment has no signals.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All values, indexed by signal.
    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    /// Stores `value`, returning `true` if the bits changed.
    pub fn set(&mut self, id: SignalId, value: Value) -> bool {
        let slot = &mut self.values[id.index()];
        if slot.same_bits(&value) {
            return false;
        }
        *slot = value;
        true
    }

    /// Commits every pending value and returns the signals that changed, in ID order.
    pub fn commit(&mut self, pending: PendingUpdates) -> Vec<SignalId> {
        pending
            .slots
            .into_iter()
            .filter_map(|(id, value)| self.set(id, value).then_some(id))
            .collect()
    }
}

/// Values written during one evaluation pass, not yet visible to reads.
///
/// The first write to a signal copies its committed value, so untouched bits
/// keep what they had; later writes to the same bits win.
#[derive(Debug, Clone, Default)]
pub struct PendingUpdates {
    slots: BTreeMap<SignalId, Value>,
}

impl PendingUpdates {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts `id` from `value` instead of its committed value.
    pub fn preset(&mut self, id: SignalId, value: Value) {
        self.slots.insert(id, value);
    }

    /// Overwrites the bits of `id` starting at `offset` with `bits`.
    pub fn write(&mut self, table: &SignalTable, id: SignalId, offset: u32, bits: &Value) {
        self.slots
            .entry(id)
            .or_insert_with(|| table.get(id).clone())
            .set_slice(offset, bits);
    }

    /// The pending value of `id`, if it has one.
    pub fn get(&self, id: SignalId) -> Option<&Value> {
        self.slots.get(&id)
    }

    /// Returns `true` if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::Shape;
    use tessera_ir::{FragmentBuilder, Signal};

    fn table() -> (SignalTable, SignalId, SignalId) {
        let mut b = FragmentBuilder::new();
        let a = b.add_signal(Signal::new("a", Shape::unsigned(8)).with_reset(0xffi64));
        let c = b.signal("c", Shape::signed(4));
        let frag = b.build().unwrap();
        (SignalTable::from_resets(&frag), a, c)
    }

    #[test]
    fn starts_from_resets() {
        let (table, a, c) = table();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(a).to_u64(), 0xff);
        assert!(table.get(c).is_zero());
        assert!(table.get(c).is_signed());
    }

    #[test]
    fn partial_writes_merge_with_committed_value() {
        let (mut table, a, _) = table();
        let mut pending = PendingUpdates::new();
        pending.write(&table, a, 2, &Value::constant(0, 1));
        pending.write(&table, a, 4, &Value::constant(0b01, 2));
        assert_eq!(table.get(a).to_u64(), 0xff, "pending writes are invisible");
        let changed = table.commit(pending);
        assert_eq!(changed, vec![a]);
        assert_eq!(table.get(a).to_u64(), 0b1101_1011);
    }

    #[test]
    fn later_writes_win() {
        let (mut table, a, _) = table();
        let mut pending = PendingUpdates::new();
        pending.write(&table, a, 0, &Value::constant(0, 8));
        pending.write(&table, a, 0, &Value::constant(0b11, 2));
        table.commit(pending);
        assert_eq!(table.get(a).to_u64(), 0b11);
    }

    #[test]
    fn preset_replaces_the_starting_value() {
        let (mut table, a, c) = table();
        let mut pending = PendingUpdates::new();
        pending.preset(c, Value::constant(-1, 4));
        pending.write(&table, c, 3, &Value::constant(0, 1));
        let changed = table.commit(pending);
        assert_eq!(changed, vec![c]);
        assert_eq!(table.get(c).to_i64_saturating(), 7);
        assert_eq!(table.get(a).to_u64(), 0xff);
    }

    #[test]
    fn unchanged_commit_reports_nothing() {
        let (mut table, a, _) = table();
        let mut pending = PendingUpdates::new();
        pending.write(&table, a, 0, &Value::constant(0xff, 8));
        assert!(table.commit(pending).is_empty());
    }
}
