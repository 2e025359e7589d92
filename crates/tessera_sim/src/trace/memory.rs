//! In-memory trace capture for tests and embedding.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tessera_common::{SimTime, Value};

use super::{ChangeTracker, TraceError, TraceSignal, TraceSink};

#[derive(Debug, Default)]
struct Recorded {
    positions: HashMap<String, usize>,
    histories: Vec<Vec<(SimTime, Value)>>,
    samples: u64,
    finished: bool,
}

/// Records every value change of the traced signals in memory.
///
/// The sink itself is handed to the simulator; keep a [`MemoryHandle`] from
/// [`handle`](Self::handle) to read the recording back.
#[derive(Debug)]
pub struct MemorySink {
    name: String,
    shared: Rc<RefCell<Recorded>>,
    tracker: ChangeTracker,
}

/// Read access to what a [`MemorySink`] recorded.
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    shared: Rc<RefCell<Recorded>>,
}

impl MemorySink {
    /// Creates an empty recording named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Rc::default(),
            tracker: ChangeTracker::default(),
        }
    }

    /// A handle that shares this sink's recording.
    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl TraceSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&mut self, time: SimTime, signals: &[TraceSignal]) -> Result<(), TraceError> {
        let mut rec = self.shared.borrow_mut();
        rec.positions = signals
            .iter()
            .enumerate()
            .map(|(pos, s)| (s.name.clone(), pos))
            .collect();
        rec.histories = signals
            .iter()
            .map(|s| vec![(time, s.initial.clone())])
            .collect();
        self.tracker = ChangeTracker::new(signals);
        Ok(())
    }

    fn sample(&mut self, time: SimTime, values: &[Value]) -> Result<(), TraceError> {
        let mut rec = self.shared.borrow_mut();
        rec.samples += 1;
        for (pos, value) in self.tracker.changes(values) {
            rec.histories[pos].push((time, value.clone()));
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), TraceError> {
        self.shared.borrow_mut().finished = true;
        Ok(())
    }
}

impl MemoryHandle {
    /// Value changes of `name` in time order, starting with its value when
    /// the sink was attached. `None` if the signal was not traced.
    pub fn history(&self, name: &str) -> Option<Vec<(SimTime, Value)>> {
        let rec = self.shared.borrow();
        let pos = *rec.positions.get(name)?;
        Some(rec.histories[pos].clone())
    }

    /// The value `name` held at the end of instant `fs`.
    pub fn value_at(&self, name: &str, fs: u64) -> Option<Value> {
        let rec = self.shared.borrow();
        let pos = *rec.positions.get(name)?;
        rec.histories[pos]
            .iter()
            .rev()
            .find(|(time, _)| time.fs <= fs)
            .map(|(_, value)| value.clone())
    }

    /// Names of the traced signals, sorted.
    pub fn signal_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.shared.borrow().positions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of samples received.
    pub fn samples(&self) -> u64 {
        self.shared.borrow().samples
    }

    /// Whether the simulator closed the sink.
    pub fn is_finished(&self) -> bool {
        self.shared.borrow().finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::Shape;
    use tessera_ir::SignalId;

    #[test]
    fn records_changes_against_initial_values() {
        let mut sink = MemorySink::new("mem");
        let handle = sink.handle();
        let shape = Shape::unsigned(2);
        sink.begin(SimTime::ZERO, &[TraceSignal {
            id: SignalId::from_raw(1),
            name: "q".into(),
            shape,
            initial: Value::zero(shape),
        }])
        .unwrap();

        let other = Value::zero(Shape::unsigned(8));
        for (fs, q) in [(0, 0), (10, 2), (20, 2), (30, 1)] {
            sink.sample(SimTime::from_fs(fs), &[other.clone(), Value::from_u64(q, shape)])
                .unwrap();
        }
        sink.finish().unwrap();

        let history = handle.history("q").unwrap();
        let times: Vec<u64> = history.iter().map(|(t, _)| t.fs).collect();
        assert_eq!(times, vec![0, 10, 30]);
        assert_eq!(handle.value_at("q", 25).unwrap().to_u64(), 2);
        assert_eq!(handle.value_at("q", 5).unwrap().to_u64(), 0);
        assert!(handle.history("missing").is_none());
        assert_eq!(handle.signal_names(), vec!["q".to_string()]);
        assert_eq!(handle.samples(), 4);
        assert!(handle.is_finished());
    }
}
