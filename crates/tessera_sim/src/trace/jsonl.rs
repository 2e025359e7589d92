//! JSON Lines output: one JSON object per line.
//!
//! The first line is a header listing the traced signals with their shapes
//! and the values they held when tracing began. Every later line is one
//! instant with the signals that changed in it:
//!
//! ```text
//! {"type":"header","time_fs":0,"signals":[{"name":"clk","width":1,"signed":false,"initial":"0"}]}
//! {"type":"change","time_fs":500000,"values":{"clk":"1"}}
//! ```
//!
//! Values are binary strings, most significant bit first.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tessera_common::{SimTime, Value};

use super::{open_trace_file, ChangeTracker, TraceError, TraceSignal, TraceSink, TraceWrite};

#[derive(Serialize)]
struct SignalRecord<'a> {
    name: &'a str,
    width: u32,
    signed: bool,
    initial: String,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record<'a> {
    Header { time_fs: u64, signals: Vec<SignalRecord<'a>> },
    Change { time_fs: u64, values: BTreeMap<&'a str, String> },
}

/// JSON Lines writer over any [`TraceWrite`] destination.
pub struct JsonLinesSink<W: TraceWrite> {
    name: String,
    writer: W,
    names: Vec<String>,
    tracker: ChangeTracker,
}

impl JsonLinesSink<Box<dyn TraceWrite>> {
    /// Creates a JSON Lines file at `path`, gzip-compressed when `compress` is set.
    pub fn create(path: &Path, compress: bool) -> Result<Self, TraceError> {
        let writer = open_trace_file(path, compress)?;
        Ok(Self::new(path.display().to_string(), writer))
    }
}

impl<W: TraceWrite> JsonLinesSink<W> {
    /// Creates a sink named `name` writing to `writer`.
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            writer,
            names: Vec::new(),
            tracker: ChangeTracker::default(),
        }
    }

    /// The underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }
}

fn write_record(writer: &mut impl TraceWrite, record: &Record<'_>) -> Result<(), TraceError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    writer.write_all(&line)?;
    Ok(())
}

impl<W: TraceWrite> TraceSink for JsonLinesSink<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&mut self, time: SimTime, signals: &[TraceSignal]) -> Result<(), TraceError> {
        let header = Record::Header {
            time_fs: time.fs,
            signals: signals
                .iter()
                .map(|s| SignalRecord {
                    name: &s.name,
                    width: s.shape.width,
                    signed: s.shape.signed,
                    initial: s.initial.to_string(),
                })
                .collect(),
        };
        write_record(&mut self.writer, &header)?;
        self.names = signals.iter().map(|s| s.name.clone()).collect();
        self.tracker = ChangeTracker::new(signals);
        Ok(())
    }

    fn sample(&mut self, time: SimTime, values: &[Value]) -> Result<(), TraceError> {
        let changes = self.tracker.changes(values);
        if changes.is_empty() {
            return Ok(());
        }
        let record = Record::Change {
            time_fs: time.fs,
            values: changes
                .into_iter()
                .map(|(pos, value)| (self.names[pos].as_str(), value.to_string()))
                .collect(),
        };
        write_record(&mut self.writer, &record)
    }

    fn finish(&mut self) -> Result<(), TraceError> {
        self.writer.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tessera_common::Shape;
    use tessera_ir::SignalId;

    fn signals() -> Vec<TraceSignal> {
        vec![
            TraceSignal {
                id: SignalId::from_raw(0),
                name: "a".into(),
                shape: Shape::unsigned(4),
                initial: Value::from_u64(3, Shape::unsigned(4)),
            },
            TraceSignal {
                id: SignalId::from_raw(1),
                name: "b".into(),
                shape: Shape::signed(2),
                initial: Value::from_i64(-1, Shape::signed(2)),
            },
        ]
    }

    fn lines(sink: &JsonLinesSink<Vec<u8>>) -> Vec<serde_json::Value> {
        String::from_utf8(sink.get_ref().clone())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn header_then_changes() {
        let mut sink = JsonLinesSink::new("mem", Vec::new());
        sink.begin(SimTime::ZERO, &signals()).unwrap();
        let values = [
            Value::from_u64(3, Shape::unsigned(4)),
            Value::from_i64(1, Shape::signed(2)),
        ];
        sink.sample(SimTime::from_fs(0), &values).unwrap();
        sink.sample(SimTime::from_fs(10), &values).unwrap();
        sink.finish().unwrap();

        let lines = lines(&sink);
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            serde_json::json!({
                "type": "header",
                "time_fs": 0,
                "signals": [
                    {"name": "a", "width": 4, "signed": false, "initial": "0011"},
                    {"name": "b", "width": 2, "signed": true, "initial": "11"},
                ]
            })
        );
        assert_eq!(
            lines[1],
            serde_json::json!({"type": "change", "time_fs": 0, "values": {"b": "01"}})
        );
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl TraceWrite for Broken {}

    #[test]
    fn write_failure_surfaces_as_trace_error() {
        let mut sink = JsonLinesSink::new("broken", Broken);
        let err = sink.begin(SimTime::ZERO, &signals()).unwrap_err();
        assert!(matches!(err, TraceError::Io(_)));
        assert!(err.to_string().contains("disk full"), "{err}");
    }
}
