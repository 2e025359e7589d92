//! Trace sinks: read-only observers of the simulation timeline.
//!
//! The simulator announces the traced signals once through
//! [`TraceSink::begin`], then hands every sink the settled value table after
//! each simulated instant through [`TraceSink::sample`]. Sinks keep their own
//! writers and their own change tracking, so several can run side by side.
//!
//! A sink that returns an error is disabled and the failure is recorded as a
//! [`TraceFailure`]; the simulation itself carries on.

pub mod jsonl;
pub mod memory;
pub mod vcd;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tessera_common::{Shape, SimTime, Value};
use tessera_ir::SignalId;

pub use jsonl::JsonLinesSink;
pub use memory::{MemoryHandle, MemorySink};
pub use vcd::VcdSink;

/// Errors a sink can report.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// Writing the destination failed.
    #[error("trace I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded.
    #[error("trace encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Metadata for one traced signal, sent once before the first sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSignal {
    /// Signal ID, for indexing sample tables.
    pub id: SignalId,
    /// Signal name.
    pub name: String,
    /// Width and signedness.
    pub shape: Shape,
    /// Value after the initial settlement.
    pub initial: Value,
}

/// A sink that stopped receiving samples because it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFailure {
    /// Name of the failing sink.
    pub sink: String,
    /// Instant at which it failed.
    pub time: SimTime,
    /// The error, rendered.
    pub message: String,
}

/// A consumer of the signal timeline.
pub trait TraceSink {
    /// Name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Receives the traced signals and the time they are first observed,
    /// which is later than zero for a sink attached mid-run. Called once,
    /// before any sample.
    fn begin(&mut self, time: SimTime, signals: &[TraceSignal]) -> Result<(), TraceError>;

    /// Receives the settled value of every signal, indexed by [`SignalId`],
    /// after an instant completes. Times never decrease.
    fn sample(&mut self, time: SimTime, values: &[Value]) -> Result<(), TraceError>;

    /// Flushes and completes the output. Called once, after the last sample.
    fn finish(&mut self) -> Result<(), TraceError>;
}

/// A byte destination for file-backed sinks that knows how to complete itself.
pub trait TraceWrite: Write {
    /// Completes the stream. Plain writers just flush.
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl TraceWrite for Vec<u8> {}

impl TraceWrite for File {}

impl<W: Write> TraceWrite for BufWriter<W> {}

impl<W: Write> TraceWrite for GzEncoder<W> {
    fn close(&mut self) -> io::Result<()> {
        self.try_finish()?;
        self.get_mut().flush()
    }
}

impl TraceWrite for Box<dyn TraceWrite> {
    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Creates `path` for writing, gzip-compressed when `compress` is set.
pub fn open_trace_file(path: &Path, compress: bool) -> Result<Box<dyn TraceWrite>, TraceError> {
    let writer = BufWriter::new(File::create(path)?);
    Ok(if compress {
        Box::new(GzEncoder::new(writer, Compression::default()))
    } else {
        Box::new(writer)
    })
}

/// Tracks the last value reported per traced signal and yields changes.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChangeTracker {
    last: Vec<(SignalId, Value)>,
}

impl ChangeTracker {
    pub(crate) fn new(signals: &[TraceSignal]) -> Self {
        Self {
            last: signals.iter().map(|s| (s.id, s.initial.clone())).collect(),
        }
    }

    /// Positions (into the `begin` list) and new values of changed signals.
    pub(crate) fn changes<'v>(&mut self, values: &'v [Value]) -> Vec<(usize, &'v Value)> {
        let mut out = Vec::new();
        for (pos, (id, last)) in self.last.iter_mut().enumerate() {
            let Some(now) = values.get(id.as_raw() as usize) else {
                continue;
            };
            if !now.same_bits(last) {
                *last = now.clone();
                out.push((pos, now));
            }
        }
        out
    }
}
