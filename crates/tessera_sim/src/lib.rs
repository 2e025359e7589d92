//! Simulation core for the Tessera logic simulator.
//!
//! This crate runs a validated [`Fragment`](tessera_ir::Fragment): combinational
//! statements settle to a fixed point after every change, clocked statements
//! run on the active edges of their domains, and testbench [`Process`]es drive
//! and observe signals through a suspend/resume protocol. Settled values are
//! streamed to any number of [`TraceSink`]s.
//!
//! # Usage
//!
//! ```ignore
//! use tessera_sim::{simulate, Testbench};
//!
//! let config = tessera_config::load_config(project_dir)?;
//! let bench = Testbench::new("adder")
//!     .write(a, Value::constant(12, 4))
//!     .write(b, Value::constant(11, 4))
//!     .expect(y, Value::int(-9));
//! let report = simulate(fragment, &config, vec![Box::new(bench)])?;
//! println!("simulation ended at {}", report.final_time);
//! ```
//!
//! # Modules
//!
//! - `error`: simulation error types
//! - `state`: committed signal values and pending updates
//! - `evaluator`: expression evaluation and statement execution
//! - `settle`: the fixed-point settlement engine and clock-edge updates
//! - `process`: the process protocol
//! - `testbench`: scripted processes
//! - `scheduler`: the event queue, delta rounds and clock generators
//! - `trace`: trace sinks (VCD, JSON Lines, in-memory)

#![warn(missing_docs)]

pub mod error;
pub mod evaluator;
pub mod process;
pub mod scheduler;
pub mod settle;
pub mod state;
pub mod testbench;
pub mod trace;

use tessera_config::{SimConfig, TraceFormat};
use tessera_ir::Fragment;

pub use error::SimError;
pub use process::{Command, Process, ProcessError, ProcessId, Resume, Step};
pub use scheduler::{RunReport, Simulator};
pub use settle::{settle, Settled};
pub use state::{PendingUpdates, SignalTable};
pub use testbench::Testbench;
pub use trace::{
    JsonLinesSink, MemoryHandle, MemorySink, TraceError, TraceFailure, TraceSignal, TraceSink,
    VcdSink,
};

/// High-level entry point: simulates `fragment` with `processes` to completion.
///
/// Settlement and delta ceilings and the time limit come from `config`. Every
/// `[[trace]]` destination is opened as a sink; one that cannot be created is
/// reported in [`RunReport::trace_failures`] and the run goes ahead without it.
/// All sinks are completed before returning.
pub fn simulate(
    fragment: Fragment,
    config: &SimConfig,
    processes: Vec<Box<dyn Process>>,
) -> Result<RunReport, SimError> {
    let mut sim = Simulator::new(fragment, config);

    for trace in &config.trace {
        let opened: Result<Box<dyn TraceSink>, TraceError> = match trace.format {
            TraceFormat::Vcd => VcdSink::create(&trace.path, trace.compress)
                .map(|sink| Box::new(sink) as Box<dyn TraceSink>),
            TraceFormat::Jsonl => JsonLinesSink::create(&trace.path, trace.compress)
                .map(|sink| Box::new(sink) as Box<dyn TraceSink>),
        };
        let sink = match opened {
            Ok(sink) => sink,
            Err(err) => {
                sim.record_trace_failure(trace.path.display().to_string(), &err);
                continue;
            }
        };
        match &trace.signals {
            Some(names) => sim.add_sink_filtered(sink, names)?,
            None => sim.add_sink(sink)?,
        }
    }

    for process in processes {
        sim.add_boxed_process(process)?;
    }

    let mut report = sim.run()?;
    sim.close();
    report.trace_failures = sim.trace_failures().to_vec();
    Ok(report)
}
