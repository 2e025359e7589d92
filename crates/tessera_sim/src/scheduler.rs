//! The discrete-event scheduler.
//!
//! [`Simulator`] owns the signal table, the event queue, the registered
//! processes, the clock generators and the trace sinks. Time advances from one
//! scheduled instant to the next. Within an instant:
//!
//! 1. processes due at the instant resume in registration order, each running
//!    until its next suspension point;
//! 2. clock generators due at the instant toggle their clocks together, and
//!    active edges run the clocked statements of their domains;
//! 3. processes that yielded a zero delay, or whose awaited edge fired, form
//!    the next delta round, repeated until no process is ready;
//! 4. every trace sink samples the settled values.
//!
//! Every write and every clock update is followed by settlement, so processes
//! always observe settled values.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tessera_common::{SimTime, Value};
use tessera_config::SimConfig;
use tessera_ir::{combinational_cycles, DomainId, Driver, Expr, Fragment, SignalId, Target};
use tracing::{debug, info, trace, warn};

use crate::error::SimError;
use crate::evaluator::{assign, eval_expr, EvalContext};
use crate::process::{Command, Process, ProcessError, ProcessId, Resume, Step};
use crate::settle::{apply_clock_edges, settle};
use crate::state::{PendingUpdates, SignalTable};
use crate::trace::{TraceError, TraceFailure, TraceSignal, TraceSink};

/// Summary of a finished [`Simulator::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Time of the last simulated instant.
    pub final_time: SimTime,
    /// Whether the run ended through [`Simulator::stop`] or [`Command::Stop`].
    pub stopped: bool,
    /// Number of instants simulated so far.
    pub instants: u64,
    /// Settlement passes run so far.
    pub settle_passes: u64,
    /// Trace sinks that failed and were disabled.
    pub trace_failures: Vec<TraceFailure>,
}

/// What a queue entry wakes. Processes sort before clocks at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Wake {
    Process(ProcessId),
    Clock(usize),
}

struct ProcessSlot {
    name: String,
    body: Box<dyn Process>,
    started: bool,
    passive: bool,
    done: bool,
}

#[derive(Debug, Clone, Copy)]
struct ClockGen {
    domain: DomainId,
    clk: SignalId,
    high_fs: u64,
    low_fs: u64,
    next_level: bool,
}

struct SinkSlot {
    sink: Box<dyn TraceSink>,
    signals: Option<Vec<SignalId>>,
    active: bool,
}

/// A simulation of one [`Fragment`] driven by testbench processes.
pub struct Simulator {
    fragment: Fragment,
    values: SignalTable,
    now: SimTime,
    queue: BinaryHeap<Reverse<(u64, Wake)>>,
    processes: Vec<ProcessSlot>,
    clocks: Vec<ClockGen>,
    clock_levels: Vec<bool>,
    tick_waiters: Vec<Vec<ProcessId>>,
    sinks: Vec<SinkSlot>,
    trace_failures: Vec<TraceFailure>,
    max_settle_passes: u32,
    max_deltas: u32,
    time_limit: Option<SimTime>,
    initialized: bool,
    stopped: bool,
    closed: bool,
    instants: u64,
    settle_passes: u64,
}

impl Simulator {
    /// Creates a simulator at time zero with every signal at its reset value.
    ///
    /// Ceilings and the time limit come from `config.simulation`; trace
    /// destinations in `config.trace` are opened by [`simulate`](crate::simulate).
    pub fn new(fragment: Fragment, config: &SimConfig) -> Self {
        for cycle in combinational_cycles(&fragment) {
            let names: Vec<&str> = cycle
                .iter()
                .map(|&id| fragment.signal(id).name.as_str())
                .collect();
            warn!(signals = ?names, "combinational cycle; settlement may not converge");
        }
        let domains = fragment.domains().len();
        Self {
            values: SignalTable::from_resets(&fragment),
            fragment,
            now: SimTime::ZERO,
            queue: BinaryHeap::new(),
            processes: Vec::new(),
            clocks: Vec::new(),
            clock_levels: vec![false; domains],
            tick_waiters: vec![Vec::new(); domains],
            sinks: Vec::new(),
            trace_failures: Vec::new(),
            max_settle_passes: config.simulation.max_settle_passes.max(1),
            max_deltas: config.simulation.max_deltas,
            time_limit: config.simulation.time_limit,
            initialized: false,
            stopped: false,
            closed: false,
            instants: 0,
            settle_passes: 0,
        }
    }

    /// Sets the settlement pass ceiling.
    pub fn set_max_settle_passes(&mut self, max: u32) {
        self.max_settle_passes = max.max(1);
    }

    /// Sets the ceiling on delta rounds per instant.
    pub fn set_max_deltas(&mut self, max: u32) {
        self.max_deltas = max;
    }

    /// Makes [`run`](Self::run) return once the next instant would pass `limit`.
    pub fn set_time_limit(&mut self, limit: Option<SimTime>) {
        self.time_limit = limit;
    }

    /// The simulated fragment.
    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    /// Current simulated time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Current value of a signal.
    ///
    /// # Panics
    ///
    /// Panics if the ID does not belong to the simulated fragment.
    pub fn value(&self, id: SignalId) -> &Value {
        self.values.get(id)
    }

    /// Current value of the signal called `name`.
    pub fn value_of(&self, name: &str) -> Result<&Value, SimError> {
        let id = self.find_signal(name)?;
        Ok(self.values.get(id))
    }

    /// Looks up a signal by name.
    pub fn find_signal(&self, name: &str) -> Result<SignalId, SimError> {
        self.fragment
            .find_signal(name)
            .ok_or_else(|| SimError::UnknownSignal(name.to_string()))
    }

    /// Trace sinks that failed so far.
    pub fn trace_failures(&self) -> &[TraceFailure] {
        &self.trace_failures
    }

    /// Whether [`stop`](Self::stop) has been requested.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Registers a process. It first runs at the current instant.
    pub fn add_process(&mut self, process: impl Process + 'static) -> Result<ProcessId, SimError> {
        self.add_boxed_process(Box::new(process))
    }

    /// Registers an already boxed process.
    pub fn add_boxed_process(&mut self, body: Box<dyn Process>) -> Result<ProcessId, SimError> {
        self.ensure_open()?;
        let id = ProcessId::from_raw(self.processes.len() as u32);
        let name = body
            .name()
            .map_or_else(|| id.to_string(), str::to_string);
        debug!(process = %name, "registered process");
        self.processes.push(ProcessSlot {
            name,
            body,
            started: false,
            passive: false,
            done: false,
        });
        self.queue.push(Reverse((self.now.fs, Wake::Process(id))));
        Ok(id)
    }

    /// Drives the clock of `domain` with a square wave of `period_fs`.
    ///
    /// The clock starts low and first rises `phase_fs` after the current time,
    /// half a period when `None`. Clock generators are passive: they never
    /// keep [`run`](Self::run) going on their own.
    pub fn add_clock(
        &mut self,
        domain: DomainId,
        period_fs: u64,
        phase_fs: Option<u64>,
    ) -> Result<(), SimError> {
        self.ensure_open()?;
        let Some(decl) = self.fragment.domains().try_get(domain) else {
            return Err(SimError::InvalidClock {
                domain: domain.to_string(),
                reason: "no such domain".into(),
            });
        };
        let invalid = |reason: &str| SimError::InvalidClock {
            domain: decl.name.clone(),
            reason: reason.to_string(),
        };
        if period_fs < 2 {
            return Err(invalid("period must be at least 2 fs"));
        }
        if self.clocks.iter().any(|c| c.clk == decl.clk) {
            return Err(invalid("clock signal is already driven by a generator"));
        }
        if self.fragment.driver(decl.clk).is_some() {
            return Err(invalid("clock signal is driven by logic"));
        }

        let high_fs = period_fs / 2;
        let clock = ClockGen {
            domain,
            clk: decl.clk,
            high_fs,
            low_fs: period_fs - high_fs,
            next_level: true,
        };
        let first = self.now.fs.saturating_add(phase_fs.unwrap_or(high_fs));
        debug!(domain = %decl.name, period_fs, first_edge_fs = first, "added clock");
        self.queue.push(Reverse((first, Wake::Clock(self.clocks.len()))));
        self.clocks.push(clock);
        Ok(())
    }

    /// Attaches a sink that traces every signal.
    pub fn add_sink(&mut self, sink: Box<dyn TraceSink>) -> Result<(), SimError> {
        self.attach_sink(sink, None)
    }

    /// Attaches a sink that traces only the named signals.
    pub fn add_sink_filtered<S: AsRef<str>>(
        &mut self,
        sink: Box<dyn TraceSink>,
        names: &[S],
    ) -> Result<(), SimError> {
        let ids = names
            .iter()
            .map(|name| self.find_signal(name.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_sink(sink, Some(ids))
    }

    fn attach_sink(
        &mut self,
        sink: Box<dyn TraceSink>,
        signals: Option<Vec<SignalId>>,
    ) -> Result<(), SimError> {
        self.ensure_open()?;
        self.sinks.push(SinkSlot {
            sink,
            signals,
            active: true,
        });
        if self.initialized {
            self.begin_sink(self.sinks.len() - 1);
        }
        Ok(())
    }

    /// Records a sink that could not even be created.
    pub(crate) fn record_trace_failure(&mut self, sink: String, error: &TraceError) {
        let failure = TraceFailure {
            sink,
            time: self.now,
            message: error.to_string(),
        };
        warn!(sink = %failure.sink, time = %failure.time, error = %failure.message, "trace sink disabled");
        self.trace_failures.push(failure);
    }

    /// Cancels all pending events. Unfinished processes are abandoned.
    pub fn stop(&mut self) {
        if !self.stopped {
            debug!(time = %self.now, "simulation stopped");
        }
        self.stopped = true;
        self.queue.clear();
        for waiters in &mut self.tick_waiters {
            waiters.clear();
        }
    }

    /// Stops the simulation and completes every trace sink.
    ///
    /// Dropping the simulator does the same.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.stop();
        self.closed = true;
        for idx in 0..self.sinks.len() {
            if !self.sinks[idx].active {
                continue;
            }
            if let Err(err) = self.sinks[idx].sink.finish() {
                self.disable_sink(idx, &err);
            }
        }
    }

    /// Simulates the next scheduled instant.
    ///
    /// Returns `false` when nothing was left to simulate: the queue is empty,
    /// the simulator was stopped, or the next instant lies past the time limit.
    pub fn step(&mut self) -> Result<bool, SimError> {
        self.step_within(self.time_limit.map(|t| t.fs))
    }

    /// Runs until no non-passive process remains, the queue drains, the time
    /// limit is reached or the simulation is stopped.
    pub fn run(&mut self) -> Result<RunReport, SimError> {
        if self.closed {
            return Err(SimError::Finalized);
        }
        self.initialize()?;
        while !self.stopped {
            if !self.has_active_processes() {
                break;
            }
            if !self.step()? {
                if self.queue.is_empty() && !self.stopped {
                    warn!(
                        time = %self.now,
                        waiting = %self.active_process_names().join(", "),
                        "no further events; processes are still waiting"
                    );
                }
                break;
            }
        }
        let report = self.report();
        info!(
            final_time = %report.final_time,
            instants = report.instants,
            settle_passes = report.settle_passes,
            stopped = report.stopped,
            trace_failures = report.trace_failures.len(),
            "simulation finished"
        );
        Ok(report)
    }

    /// Simulates every instant up to and including `deadline_fs`, passive
    /// activity included, then moves the current time to the deadline.
    pub fn run_until(&mut self, deadline_fs: u64) -> Result<RunReport, SimError> {
        if self.closed {
            return Err(SimError::Finalized);
        }
        self.initialize()?;
        while self.step_within(Some(deadline_fs))? {}
        if !self.stopped && deadline_fs > self.now.fs {
            self.now = self.now.advance_to(deadline_fs);
        }
        Ok(self.report())
    }

    fn report(&self) -> RunReport {
        RunReport {
            final_time: self.now,
            stopped: self.stopped,
            instants: self.instants,
            settle_passes: self.settle_passes,
            trace_failures: self.trace_failures.clone(),
        }
    }

    fn ensure_open(&self) -> Result<(), SimError> {
        if self.stopped || self.closed {
            Err(SimError::Finalized)
        } else {
            Ok(())
        }
    }

    fn has_active_processes(&self) -> bool {
        self.processes.iter().any(|p| !p.done && !p.passive)
    }

    fn active_process_names(&self) -> Vec<&str> {
        self.processes
            .iter()
            .filter(|p| !p.done && !p.passive)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Settles the reset state and announces the traced signals. Runs once.
    fn initialize(&mut self) -> Result<(), SimError> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;
        let settled = settle(
            &self.fragment,
            &mut self.values,
            self.max_settle_passes,
            self.now,
        )?;
        self.settle_passes += u64::from(settled.passes);
        self.clock_levels = self
            .fragment
            .domains()
            .values()
            .map(|d| self.values.get(d.clk).bit(0))
            .collect();
        for idx in 0..self.sinks.len() {
            self.begin_sink(idx);
        }
        Ok(())
    }

    fn step_within(&mut self, bound_fs: Option<u64>) -> Result<bool, SimError> {
        if self.stopped || self.closed {
            return Ok(false);
        }
        self.initialize()?;
        let Some(&Reverse((fs, _))) = self.queue.peek() else {
            return Ok(false);
        };
        if bound_fs.is_some_and(|bound| fs > bound) {
            return Ok(false);
        }

        self.now = self.now.advance_to(fs);
        let mut ready = Vec::new();
        let mut toggles = Vec::new();
        while let Some(&Reverse((at, wake))) = self.queue.peek() {
            if at != fs {
                break;
            }
            self.queue.pop();
            match wake {
                Wake::Process(id) => ready.push(id),
                Wake::Clock(idx) => toggles.push(idx),
            }
        }
        debug!(time = %self.now, processes = ready.len(), clocks = toggles.len(), "instant");

        let mut deltas = 0u32;
        let mut round = ready;
        loop {
            let mut next_round = Vec::new();
            let mut pending = round.into_iter();
            while let Some(id) = pending.next() {
                if let Err(err) = self.run_process(id, &mut next_round) {
                    self.requeue(fs, pending.chain(next_round), &toggles);
                    return Err(err);
                }
                if self.stopped {
                    break;
                }
            }
            if !toggles.is_empty() && !self.stopped {
                let due = std::mem::take(&mut toggles);
                if let Err(err) = self.toggle_clocks(&due, &mut next_round) {
                    self.requeue(fs, next_round, &[]);
                    return Err(err);
                }
            }
            if next_round.is_empty() || self.stopped {
                break;
            }
            deltas += 1;
            if deltas > self.max_deltas {
                self.requeue(fs, next_round, &[]);
                return Err(SimError::DeltaCycleLimit {
                    time: self.now,
                    max_deltas: self.max_deltas,
                });
            }
            self.now = self.now.next_delta();
            next_round.sort_unstable();
            next_round.dedup();
            round = next_round;
        }

        self.instants += 1;
        self.sample_sinks();
        Ok(true)
    }

    /// Puts work popped for instant `fs` back on the queue after a failure,
    /// so a caller that resumes the run still sees it.
    fn requeue(
        &mut self,
        fs: u64,
        processes: impl IntoIterator<Item = ProcessId>,
        toggles: &[usize],
    ) {
        for id in processes {
            self.queue.push(Reverse((fs, Wake::Process(id))));
        }
        for &idx in toggles {
            self.queue.push(Reverse((fs, Wake::Clock(idx))));
        }
    }

    /// Resumes one process until it suspends, finishes or fails. A process
    /// that fails is finished.
    fn run_process(
        &mut self,
        id: ProcessId,
        next_round: &mut Vec<ProcessId>,
    ) -> Result<(), SimError> {
        let result = self.drive_process(id, next_round);
        if result.is_err() {
            self.processes[id.as_raw() as usize].done = true;
        }
        result
    }

    fn drive_process(
        &mut self,
        id: ProcessId,
        next_round: &mut Vec<ProcessId>,
    ) -> Result<(), SimError> {
        let idx = id.as_raw() as usize;
        if self.processes[idx].done {
            return Ok(());
        }
        let mut input = if self.processes[idx].started {
            Resume::Ready
        } else {
            self.processes[idx].started = true;
            Resume::Start
        };
        loop {
            let step = match self.processes[idx].body.resume(input) {
                Ok(step) => step,
                Err(err) => return Err(self.process_failure(idx, err)),
            };
            let command = match step {
                Step::Done => {
                    debug!(process = %self.processes[idx].name, time = %self.now, "process finished");
                    self.processes[idx].done = true;
                    return Ok(());
                }
                Step::Yield(command) => command,
            };
            input = match command {
                Command::Read(expr) => Resume::Value(self.read(idx, &expr)?),
                Command::Write(target, value) => {
                    self.write(idx, &target, &value, next_round)?;
                    Resume::Ready
                }
                Command::Delay(0) => {
                    next_round.push(id);
                    return Ok(());
                }
                Command::Delay(fs) => {
                    let at = self.now.fs.saturating_add(fs);
                    self.queue.push(Reverse((at, Wake::Process(id))));
                    return Ok(());
                }
                Command::Tick(domain) => {
                    let Some(waiters) = self.tick_waiters.get_mut(domain.as_raw() as usize)
                    else {
                        return Err(self.protocol(idx, format!("tick on unknown domain {domain}")));
                    };
                    waiters.push(id);
                    return Ok(());
                }
                Command::Passive => {
                    self.processes[idx].passive = true;
                    Resume::Ready
                }
                Command::Stop => {
                    self.processes[idx].done = true;
                    self.stop();
                    return Ok(());
                }
            };
        }
    }

    fn process_failure(&self, idx: usize, err: ProcessError) -> SimError {
        let process = self.processes[idx].name.clone();
        match err {
            ProcessError::Assertion(message) => SimError::AssertionFailure {
                process,
                time: self.now,
                message,
            },
            ProcessError::Failed(reason) => SimError::ProcessFailed {
                process,
                time: self.now,
                reason,
            },
        }
    }

    fn protocol(&self, idx: usize, reason: String) -> SimError {
        SimError::ProcessProtocol {
            process: self.processes[idx].name.clone(),
            reason,
        }
    }

    fn read(&self, idx: usize, expr: &Expr) -> Result<Value, SimError> {
        expr.shape(self.fragment.signals())
            .map_err(|e| self.protocol(idx, format!("invalid read: {e}")))?;
        eval_expr(&EvalContext::new(&self.fragment, &self.values), expr)
    }

    fn write(
        &mut self,
        idx: usize,
        target: &Target,
        value: &Value,
        next_round: &mut Vec<ProcessId>,
    ) -> Result<(), SimError> {
        target
            .static_width(self.fragment.signals())
            .map_err(|e| self.protocol(idx, format!("invalid write: {e}")))?;
        let mut comb_driven = None;
        target.for_each_driven(&mut |id| {
            if comb_driven.is_none() && self.fragment.driver(id) == Some(Driver::Comb) {
                comb_driven = Some(id);
            }
        });
        if let Some(id) = comb_driven {
            let name = &self.fragment.signal(id).name;
            return Err(self.protocol(
                idx,
                format!("cannot write '{name}': it is driven by combinational logic"),
            ));
        }

        let mut pending = PendingUpdates::new();
        assign(
            &EvalContext::new(&self.fragment, &self.values),
            target,
            value,
            &mut pending,
        )?;
        self.values.commit(pending);
        self.propagate(next_round)
    }

    /// Applies the due clock toggles as one update.
    fn toggle_clocks(
        &mut self,
        toggles: &[usize],
        next_round: &mut Vec<ProcessId>,
    ) -> Result<(), SimError> {
        let mut pending = PendingUpdates::new();
        for &idx in toggles {
            let clock = &mut self.clocks[idx];
            trace!(domain = %clock.domain, level = clock.next_level, "clock toggle");
            pending.preset(clock.clk, Value::from_bool(clock.next_level));
            let hold = if clock.next_level {
                clock.high_fs
            } else {
                clock.low_fs
            };
            clock.next_level = !clock.next_level;
            let at = self.now.fs.saturating_add(hold);
            self.queue.push(Reverse((at, Wake::Clock(idx))));
        }
        self.values.commit(pending);
        self.propagate(next_round)
    }

    /// Settles, then applies active clock edges and settles again until no
    /// further edge fires. Processes waiting on a fired edge join `next_round`.
    fn propagate(&mut self, next_round: &mut Vec<ProcessId>) -> Result<(), SimError> {
        let mut rounds = 0u32;
        loop {
            let settled = settle(
                &self.fragment,
                &mut self.values,
                self.max_settle_passes,
                self.now,
            )?;
            self.settle_passes += u64::from(settled.passes);

            let fired = self.fired_domains();
            if fired.is_empty() {
                return Ok(());
            }
            rounds += 1;
            if rounds > self.max_deltas {
                return Err(SimError::DeltaCycleLimit {
                    time: self.now,
                    max_deltas: self.max_deltas,
                });
            }
            for &domain in &fired {
                debug!(domain = %self.fragment.domains()[domain].name, time = %self.now, "clock edge");
            }
            apply_clock_edges(&self.fragment, &mut self.values, &fired)?;
            for domain in fired {
                next_round.append(&mut self.tick_waiters[domain.as_raw() as usize]);
            }
        }
    }

    /// Domains whose clock made an active transition since the last check.
    fn fired_domains(&mut self) -> Vec<DomainId> {
        let mut fired = Vec::new();
        for (domain, decl) in self.fragment.domains().iter() {
            let level = self.values.get(decl.clk).bit(0);
            let prev = std::mem::replace(&mut self.clock_levels[domain.as_raw() as usize], level);
            if decl.edge.fired(prev, level) {
                fired.push(domain);
            }
        }
        fired
    }

    fn begin_sink(&mut self, idx: usize) {
        let signals: Vec<TraceSignal> = match &self.sinks[idx].signals {
            Some(ids) => ids.iter().map(|&id| self.trace_signal(id)).collect(),
            None => self
                .fragment
                .signals()
                .iter()
                .map(|(id, _)| self.trace_signal(id))
                .collect(),
        };
        if let Err(err) = self.sinks[idx].sink.begin(self.now, &signals) {
            self.disable_sink(idx, &err);
        }
    }

    fn trace_signal(&self, id: SignalId) -> TraceSignal {
        let signal = self.fragment.signal(id);
        TraceSignal {
            id,
            name: signal.name.clone(),
            shape: signal.shape,
            initial: self.values.get(id).clone(),
        }
    }

    fn sample_sinks(&mut self) {
        for idx in 0..self.sinks.len() {
            if !self.sinks[idx].active {
                continue;
            }
            if let Err(err) = self.sinks[idx].sink.sample(self.now, self.values.as_slice()) {
                self.disable_sink(idx, &err);
            }
        }
    }

    fn disable_sink(&mut self, idx: usize, err: &TraceError) {
        self.sinks[idx].active = false;
        let name = self.sinks[idx].sink.name().to_string();
        self.record_trace_failure(name, err);
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.close();
    }
}
