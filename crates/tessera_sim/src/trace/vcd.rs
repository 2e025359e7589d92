//! Value Change Dump output.
//!
//! [`VcdSink`] writes the IEEE 1364 text format: a header declaring every
//! traced signal, the initial values under `$dumpvars`, then a `#<fs>`
//! timestamp followed by one line per changed signal. Files open in GTKWave,
//! Surfer and other waveform viewers.

use std::path::Path;

use tessera_common::{SimTime, Value};

use super::{open_trace_file, ChangeTracker, TraceError, TraceSignal, TraceSink, TraceWrite};

/// VCD writer over any [`TraceWrite`] destination.
///
/// Identifier codes use printable ASCII starting from `!`; signals past the
/// 94th get multi-character codes.
pub struct VcdSink<W: TraceWrite> {
    name: String,
    scope: String,
    writer: W,
    codes: Vec<(String, u32)>,
    tracker: ChangeTracker,
    current_time: Option<u64>,
}

impl VcdSink<Box<dyn TraceWrite>> {
    /// Creates a VCD file at `path`, gzip-compressed when `compress` is set.
    pub fn create(path: &Path, compress: bool) -> Result<Self, TraceError> {
        let writer = open_trace_file(path, compress)?;
        Ok(Self::new(path.display().to_string(), writer))
    }
}

impl<W: TraceWrite> VcdSink<W> {
    /// Creates a sink named `name` writing to `writer`.
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            name: name.into(),
            scope: "top".into(),
            writer,
            codes: Vec::new(),
            tracker: ChangeTracker::default(),
            current_time: None,
        }
    }

    /// Sets the module scope the signals are declared in. Defaults to `top`.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// The underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    fn make_id_code(index: u32) -> String {
        let mut code = String::new();
        let mut idx = index;
        loop {
            code.push((b'!' + (idx % 94) as u8) as char);
            idx /= 94;
            if idx == 0 {
                break;
            }
            idx -= 1;
        }
        code
    }

    fn write_value(&mut self, pos: usize, value: &Value) -> Result<(), TraceError> {
        let (code, width) = &self.codes[pos];
        if *width == 1 {
            writeln!(self.writer, "{}{code}", if value.bit(0) { '1' } else { '0' })?;
        } else if *width == 0 {
            writeln!(self.writer, "b0 {code}")?;
        } else {
            writeln!(self.writer, "b{value} {code}")?;
        }
        Ok(())
    }
}

impl<W: TraceWrite> TraceSink for VcdSink<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&mut self, time: SimTime, signals: &[TraceSignal]) -> Result<(), TraceError> {
        writeln!(self.writer, "$date")?;
        writeln!(self.writer, "  Simulation date")?;
        writeln!(self.writer, "$end")?;
        writeln!(self.writer, "$version")?;
        writeln!(self.writer, "  Tessera logic simulator")?;
        writeln!(self.writer, "$end")?;
        writeln!(self.writer, "$timescale")?;
        writeln!(self.writer, "  1fs")?;
        writeln!(self.writer, "$end")?;
        writeln!(self.writer, "$scope module {} $end", self.scope)?;
        self.codes.clear();
        for (index, signal) in signals.iter().enumerate() {
            let code = Self::make_id_code(index as u32);
            let width = signal.shape.width;
            let name: String = signal
                .name
                .chars()
                .map(|c| if c.is_whitespace() { '_' } else { c })
                .collect();
            writeln!(self.writer, "$var wire {width} {code} {name} $end")?;
            self.codes.push((code, width));
        }
        writeln!(self.writer, "$upscope $end")?;
        writeln!(self.writer, "$enddefinitions $end")?;

        writeln!(self.writer, "#{}", time.fs)?;
        writeln!(self.writer, "$dumpvars")?;
        for (pos, signal) in signals.iter().enumerate() {
            self.write_value(pos, &signal.initial)?;
        }
        writeln!(self.writer, "$end")?;
        self.current_time = Some(time.fs);
        self.tracker = ChangeTracker::new(signals);
        Ok(())
    }

    fn sample(&mut self, time: SimTime, values: &[Value]) -> Result<(), TraceError> {
        let changes = self.tracker.changes(values);
        if changes.is_empty() {
            return Ok(());
        }
        if self.current_time != Some(time.fs) {
            writeln!(self.writer, "#{}", time.fs)?;
            self.current_time = Some(time.fs);
        }
        for (pos, value) in changes {
            self.write_value(pos, value)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), TraceError> {
        self.writer.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::Shape;
    use tessera_ir::SignalId;

    type Sink = VcdSink<Vec<u8>>;

    fn signals() -> Vec<TraceSignal> {
        vec![
            TraceSignal {
                id: SignalId::from_raw(0),
                name: "clk".into(),
                shape: Shape::unsigned(1),
                initial: Value::from_bool(false),
            },
            TraceSignal {
                id: SignalId::from_raw(1),
                name: "count".into(),
                shape: Shape::unsigned(4),
                initial: Value::constant(0, 4),
            },
        ]
    }

    fn output(sink: &Sink) -> String {
        String::from_utf8(sink.get_ref().clone()).unwrap()
    }

    #[test]
    fn id_codes() {
        assert_eq!(Sink::make_id_code(0), "!");
        assert_eq!(Sink::make_id_code(1), "\"");
        assert_eq!(Sink::make_id_code(93), "~");
        assert_eq!(Sink::make_id_code(94).len(), 2);
    }

    #[test]
    fn header_declares_signals_and_initial_values() {
        let mut sink = Sink::new("mem", Vec::new()).with_scope("dut");
        sink.begin(SimTime::ZERO, &signals()).unwrap();
        let out = output(&sink);
        assert!(out.contains("$timescale\n  1fs\n$end"));
        assert!(out.contains("$scope module dut $end"));
        assert!(out.contains("$var wire 1 ! clk $end"));
        assert!(out.contains("$var wire 4 \" count $end"));
        assert!(out.contains("$enddefinitions $end\n#0\n$dumpvars\n0!\nb0000 \"\n$end\n"));
    }

    #[test]
    fn samples_write_only_changes() {
        let mut sink = Sink::new("mem", Vec::new());
        sink.begin(SimTime::ZERO, &signals()).unwrap();
        let header_len = output(&sink).len();

        let unchanged = [Value::from_bool(false), Value::constant(0, 4)];
        sink.sample(SimTime::from_fs(500), &unchanged).unwrap();
        assert_eq!(output(&sink).len(), header_len, "no timestamp without changes");

        let rising = [Value::from_bool(true), Value::constant(0, 4)];
        sink.sample(SimTime::from_fs(1000), &rising).unwrap();
        let counted = [Value::from_bool(true), Value::constant(5, 4)];
        sink.sample(SimTime::from_fs(1000), &counted).unwrap();
        sink.finish().unwrap();

        let out = output(&sink);
        assert!(out.ends_with("#1000\n1!\nb0101 \"\n"));
        assert_eq!(out.matches("#1000").count(), 1);
    }
}
