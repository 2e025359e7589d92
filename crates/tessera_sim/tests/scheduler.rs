//! Scheduler behaviour: process ordering, delta rounds, clocks, stopping,
//! failures and trace sinks.

use std::fs;
use std::io::Read;

use tessera_common::{Shape, SimTime, Value};
use tessera_config::{load_config_from_str, SimConfig};
use tessera_ir::{ClockDomain, DomainId, Expr, Fragment, FragmentBuilder, SignalId, Statement};
use tessera_sim::{
    simulate, Command, JsonLinesSink, MemorySink, Process, ProcessError, Resume, SimError,
    Simulator, Step, Testbench, TraceError, TraceSignal, TraceSink, VcdSink,
};

/// `x` is driven by processes, `y = x + 1` combinationally.
fn incrementer() -> (Fragment, SignalId, SignalId) {
    let mut b = FragmentBuilder::new();
    let x = b.signal("x", Shape::unsigned(4));
    let y = b.signal("y", Shape::unsigned(5));
    b.comb(Statement::assign(y, Expr::from(x) + 1i64));
    (b.build().unwrap(), x, y)
}

/// An 8-bit counter in domain `sync` with synchronous reset.
fn counter() -> (Fragment, DomainId, SignalId, SignalId) {
    let mut b = FragmentBuilder::new();
    let clk = b.signal("clk", Shape::unsigned(1));
    let rst = b.signal("rst", Shape::unsigned(1));
    let count = b.signal("count", Shape::unsigned(8));
    let sync = b.domain(ClockDomain::new("sync", clk).with_reset(rst));
    b.sync(sync, Statement::assign(count, Expr::from(count) + 1i64));
    (b.build().unwrap(), sync, rst, count)
}

fn config() -> SimConfig {
    SimConfig::default()
}

#[test]
fn same_instant_writes_follow_registration_order() {
    let (frag, x, y) = incrementer();
    let mut sim = Simulator::new(frag, &config());
    sim.add_process(Testbench::new("first").write(x, 1i64)).unwrap();
    sim.add_process(Testbench::new("second").write(x, 2i64)).unwrap();
    sim.add_process(Testbench::new("observer").settle().expect(x, 2i64).expect(y, 3i64))
        .unwrap();
    sim.run().unwrap();
    assert_eq!(sim.value(x).to_u64(), 2);
}

#[test]
fn reads_after_a_write_see_settled_logic() {
    let (frag, x, y) = incrementer();
    let mut sim = Simulator::new(frag, &config());
    sim.add_process(Testbench::new("tb").write(x, 6i64).expect(y, 7i64))
        .unwrap();
    sim.run().unwrap();
}

#[test]
fn zero_delay_resumes_after_other_processes_of_the_instant() {
    let (frag, x, _) = incrementer();
    let mut sim = Simulator::new(frag, &config());
    // registered first, but its read happens in the next delta round
    sim.add_process(Testbench::new("reader").settle().expect(x, 5i64))
        .unwrap();
    sim.add_process(Testbench::new("writer").write(x, 5i64)).unwrap();
    let report = sim.run().unwrap();
    assert_eq!(report.instants, 1);
    assert_eq!(report.final_time, SimTime { fs: 0, delta: 1 });
}

#[test]
fn delays_advance_time() {
    let (frag, x, y) = incrementer();
    let mut sim = Simulator::new(frag, &config());
    let memory = MemorySink::new("memory");
    let history = memory.handle();
    sim.add_sink(Box::new(memory)).unwrap();
    sim.add_process(
        Testbench::new("tb")
            .delay(10)
            .write(x, 3i64)
            .delay(15)
            .write(x, 9i64),
    )
    .unwrap();
    let report = sim.run().unwrap();
    assert_eq!(report.final_time.fs, 25);
    assert_eq!(report.instants, 3);

    let ys: Vec<(u64, u64)> = history
        .history("y")
        .unwrap()
        .iter()
        .map(|(t, v)| (t.fs, v.to_u64()))
        .collect();
    assert_eq!(ys, vec![(0, 1), (10, 4), (25, 10)]);
    assert_eq!(history.value_at("x", 20).unwrap().to_u64(), 3);
}

#[test]
fn clocked_logic_with_synchronous_reset() {
    let (frag, sync, rst, count) = counter();
    let mut sim = Simulator::new(frag, &config());
    sim.add_clock(sync, 10, None).unwrap();
    sim.add_process(
        Testbench::new("tb")
            .write(rst, 1i64)
            .tick(sync)
            .expect_named("in reset", count, 0i64)
            .write(rst, 0i64)
            .ticks(sync, 3)
            .expect_named("counting", count, 3i64),
    )
    .unwrap();
    let report = sim.run().unwrap();
    assert_eq!(report.final_time.fs, 35);
    assert!(!report.stopped);
}

#[test]
fn negative_edge_domains() {
    let mut b = FragmentBuilder::new();
    let clk = b.signal("clk", Shape::unsigned(1));
    let q = b.signal("q", Shape::unsigned(4));
    let neg = b.domain(ClockDomain::new("neg", clk).with_edge(tessera_ir::Edge::Neg));
    b.sync(neg, Statement::assign(q, Expr::from(q) + 1i64));
    let frag = b.build().unwrap();

    let mut sim = Simulator::new(frag, &config());
    sim.add_clock(neg, 10, None).unwrap();
    sim.run_until(31).unwrap();
    // falling edges at 10, 20, 30
    assert_eq!(sim.value(q).to_u64(), 3);
}

#[test]
fn process_driven_clock_fires_edges() {
    let (frag, sync, _, count) = counter();
    let clk = frag.domains()[sync].clk;
    let mut sim = Simulator::new(frag, &config());
    let mut bench = Testbench::new("clocker");
    for _ in 0..4 {
        bench = bench.write(clk, 1i64).delay(5).write(clk, 0i64).delay(5);
    }
    sim.add_process(bench.expect(count, 4i64)).unwrap();
    sim.run().unwrap();
}

#[test]
fn stop_abandons_remaining_work() {
    let (frag, x, _) = incrementer();
    let mut sim = Simulator::new(frag, &config());
    sim.add_process(Testbench::new("stopper").delay(10).stop())
        .unwrap();
    sim.add_process(Testbench::new("late").delay(100).write(x, 1i64))
        .unwrap();
    let report = sim.run().unwrap();
    assert!(report.stopped);
    assert_eq!(report.final_time.fs, 10);
    assert_eq!(sim.value(x).to_u64(), 0);
    assert!(matches!(
        sim.add_process(Testbench::new("more")),
        Err(SimError::Finalized)
    ));
}

#[test]
fn close_finalizes() {
    let (frag, _, _) = incrementer();
    let mut sim = Simulator::new(frag, &config());
    sim.close();
    assert!(matches!(sim.run(), Err(SimError::Finalized)));
    assert!(matches!(
        sim.add_process(Testbench::new("tb")),
        Err(SimError::Finalized)
    ));
}

#[test]
fn assertion_failure_names_process_and_time() {
    let (frag, x, y) = incrementer();
    let mut sim = Simulator::new(frag, &config());
    sim.add_process(
        Testbench::new("checker")
            .delay(40)
            .write(x, 2i64)
            .expect_named("y", y, 4i64),
    )
    .unwrap();
    match sim.run().unwrap_err() {
        SimError::AssertionFailure {
            process,
            time,
            message,
        } => {
            assert_eq!(process, "checker");
            assert_eq!(time.fs, 40);
            assert_eq!(message, "y: expected 4 (100), got 3 (00011)");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn writing_combinational_signals_is_a_protocol_error() {
    let (frag, _, y) = incrementer();
    let mut sim = Simulator::new(frag, &config());
    sim.add_process(Testbench::new("bad").write(y, 1i64)).unwrap();
    let err = sim.run().unwrap_err();
    assert_eq!(
        err.to_string(),
        "protocol violation by bad: cannot write 'y': it is driven by combinational logic"
    );
}

#[test]
fn reading_unknown_signals_is_a_protocol_error() {
    let (frag, _, _) = incrementer();
    let mut sim = Simulator::new(frag, &config());
    sim.add_process(Testbench::new("bad").expect(SignalId::from_raw(42), 0i64))
        .unwrap();
    assert!(matches!(
        sim.run(),
        Err(SimError::ProcessProtocol { .. })
    ));
}

#[test]
fn combinational_loop_is_fatal() {
    let mut b = FragmentBuilder::new();
    let en = b.signal("en", Shape::unsigned(1));
    let s = b.signal("s", Shape::unsigned(1));
    b.comb(Statement::when(en, vec![Statement::assign(s, !Expr::from(s))]));
    let frag = b.build().unwrap();

    let mut cfg = config();
    cfg.simulation.max_settle_passes = 16;
    let mut sim = Simulator::new(frag, &cfg);
    sim.add_process(Testbench::new("tb").delay(5).write(en, 1i64))
        .unwrap();
    match sim.run().unwrap_err() {
        SimError::CombinationalLoop {
            time,
            passes,
            signals,
        } => {
            assert_eq!(time.fs, 5);
            assert_eq!(passes, 16);
            assert_eq!(signals, vec!["s".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn endless_zero_delays_hit_the_delta_ceiling() {
    let (frag, _, _) = incrementer();
    let mut cfg = config();
    cfg.simulation.max_deltas = 8;
    let mut sim = Simulator::new(frag, &cfg);
    sim.add_process(|_: Resume| -> Result<Step, ProcessError> {
        Ok(Step::Yield(Command::Delay(0)))
    })
    .unwrap();
    assert!(matches!(
        sim.run(),
        Err(SimError::DeltaCycleLimit { max_deltas: 8, .. })
    ));
}

#[test]
fn time_limit_bounds_run() {
    let (frag, _, _) = incrementer();
    let cfg = load_config_from_str("[simulation]\ntime_limit = \"100fs\"\n").unwrap();
    let mut sim = Simulator::new(frag, &cfg);
    sim.add_process(|_: Resume| -> Result<Step, ProcessError> {
        Ok(Step::Yield(Command::Delay(30)))
    })
    .unwrap();
    let report = sim.run().unwrap();
    assert_eq!(report.final_time.fs, 90);
    assert!(!report.stopped);
}

#[test]
fn passive_processes_do_not_keep_run_alive() {
    let (frag, x, _) = incrementer();
    let mut sim = Simulator::new(frag, &config());
    sim.add_process(|input: Resume| -> Result<Step, ProcessError> {
        Ok(Step::Yield(match input {
            Resume::Start => Command::Passive,
            _ => Command::Delay(7),
        }))
    })
    .unwrap();
    sim.add_process(Testbench::new("main").delay(20).write(x, 1i64))
        .unwrap();
    let report = sim.run().unwrap();
    assert_eq!(report.final_time.fs, 20);
}

#[test]
fn waiting_on_an_unclocked_domain_stalls_quietly() {
    let (frag, sync, _, count) = counter();
    let mut sim = Simulator::new(frag, &config());
    sim.add_process(Testbench::new("tb").tick(sync).expect(count, 1i64))
        .unwrap();
    let report = sim.run().unwrap();
    assert_eq!(report.instants, 1);
    assert_eq!(sim.value(count).to_u64(), 0);
}

struct FailingSink;

impl TraceSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn begin(&mut self, _: SimTime, _: &[TraceSignal]) -> Result<(), TraceError> {
        Ok(())
    }

    fn sample(&mut self, time: SimTime, _: &[Value]) -> Result<(), TraceError> {
        if time.fs >= 10 {
            return Err(std::io::Error::other("device unplugged").into());
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), TraceError> {
        Ok(())
    }
}

#[test]
fn sinks_run_side_by_side_and_failures_are_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let vcd_path = dir.path().join("wave.vcd");
    let jsonl_path = dir.path().join("wave.jsonl.gz");

    let (frag, x, _) = incrementer();
    let mut sim = Simulator::new(frag, &config());
    sim.add_sink(Box::new(VcdSink::create(&vcd_path, false).unwrap()))
        .unwrap();
    sim.add_sink_filtered(Box::new(JsonLinesSink::create(&jsonl_path, true).unwrap()), &["y"])
        .unwrap();
    sim.add_sink(Box::new(FailingSink)).unwrap();
    sim.add_process(
        Testbench::new("tb")
            .write(x, 1i64)
            .delay(10)
            .write(x, 2i64)
            .delay(10)
            .write(x, 3i64),
    )
    .unwrap();
    let report = sim.run().unwrap();
    sim.close();

    assert_eq!(report.final_time.fs, 20);
    assert_eq!(report.trace_failures.len(), 1);
    let failure = &report.trace_failures[0];
    assert_eq!(failure.sink, "failing");
    assert_eq!(failure.time.fs, 10);
    assert!(failure.message.contains("device unplugged"));

    let vcd = fs::read_to_string(&vcd_path).unwrap();
    assert!(vcd.contains("$var wire 4 ! x $end"));
    assert!(vcd.contains("$var wire 5 \" y $end"));
    assert!(vcd.contains("$dumpvars\nb0000 !\nb00001 \"\n$end\nb0001 !\nb00010 \"\n"));
    assert!(vcd.contains("#20\nb0011 !\nb00100 \"\n"));

    let mut text = String::new();
    flate2::read::GzDecoder::new(fs::File::open(&jsonl_path).unwrap())
        .read_to_string(&mut text)
        .unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0]["signals"][0]["name"], "y");
    assert_eq!(lines[0]["signals"][0]["initial"], "00001");
    assert_eq!(lines[3]["time_fs"], 20);
    assert_eq!(lines[3]["values"]["y"], "00100");
}

#[test]
fn filtering_by_unknown_name_is_rejected() {
    let (frag, _, _) = incrementer();
    let mut sim = Simulator::new(frag, &config());
    let err = sim
        .add_sink_filtered(Box::new(MemorySink::new("m")), &["nope"])
        .unwrap_err();
    assert_eq!(err.to_string(), "unknown signal 'nope'");
}

#[test]
fn simulate_opens_configured_traces() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("run.vcd");
    let bad = dir.path().join("missing").join("run.jsonl");
    let text = format!(
        "[simulation]\nmax_deltas = 100\n\n\
         [[trace]]\npath = {good:?}\n\n\
         [[trace]]\npath = {bad:?}\nformat = \"jsonl\"\n"
    );
    let cfg = load_config_from_str(&text).unwrap();

    let (frag, x, _) = incrementer();
    let bench = Testbench::new("tb").write(x, 4i64).delay(3).write(x, 5i64);
    let processes: Vec<Box<dyn Process>> = vec![Box::new(bench)];
    let report = simulate(frag, &cfg, processes).unwrap();

    assert_eq!(report.final_time.fs, 3);
    assert_eq!(report.trace_failures.len(), 1);
    assert_eq!(report.trace_failures[0].sink, bad.display().to_string());
    let vcd = fs::read_to_string(&good).unwrap();
    assert!(vcd.contains("#3\n"));
}

#[test]
fn memory_sink_is_finished_on_drop() {
    let (frag, x, _) = incrementer();
    let memory = MemorySink::new("memory");
    let handle = memory.handle();
    {
        let mut sim = Simulator::new(frag, &config());
        sim.add_sink(Box::new(memory)).unwrap();
        sim.add_process(Testbench::new("tb").write(x, 1i64)).unwrap();
        sim.run().unwrap();
        assert!(!handle.is_finished());
    }
    assert!(handle.is_finished());
    assert_eq!(handle.samples(), 1);
}

#[test]
fn failed_process_leaves_other_processes_runnable() {
    let (frag, x, y) = incrementer();
    let mut sim = Simulator::new(frag, &config());
    sim.add_process(Testbench::new("failing").expect(y, 7i64))
        .unwrap();
    sim.add_process(Testbench::new("independent").write(x, 3i64))
        .unwrap();

    match sim.run().unwrap_err() {
        SimError::AssertionFailure { process, .. } => assert_eq!(process, "failing"),
        other => panic!("unexpected error: {other}"),
    }
    let report = sim.run().unwrap();
    assert_eq!(sim.value(x).to_u64(), 3);
    assert_eq!(report.final_time.fs, 0);
    assert_eq!(report.instants, 1);
}

#[test]
fn failed_process_does_not_lose_clock_toggles() {
    let (frag, sync, _, count) = counter();
    let mut sim = Simulator::new(frag, &config());
    sim.add_clock(sync, 10, None).unwrap();
    // fails at 5 fs, the instant of the first rising edge
    sim.add_process(Testbench::new("failing").delay(5).expect(count, 9i64))
        .unwrap();
    assert!(matches!(
        sim.run(),
        Err(SimError::AssertionFailure { .. })
    ));
    sim.run_until(100).unwrap();
    // rising edges at 5, 15, ..., 95
    assert_eq!(sim.value(count).to_u64(), 10);
}

#[test]
fn zero_settle_ceiling_in_code_is_clamped() {
    let (frag, x, y) = incrementer();
    let mut cfg = config();
    cfg.simulation.max_settle_passes = 0;
    let mut sim = Simulator::new(frag, &cfg);
    sim.add_process(Testbench::new("tb").write(x, 3i64).expect(y, 4i64))
        .unwrap();
    sim.run().unwrap();
}

#[test]
fn late_sink_history_starts_when_attached() {
    let (frag, x, y) = incrementer();
    let mut sim = Simulator::new(frag, &config());
    sim.add_process(
        Testbench::new("tb")
            .write(x, 1i64)
            .delay(20)
            .write(x, 2i64),
    )
    .unwrap();
    sim.run_until(10).unwrap();

    let memory = MemorySink::new("late");
    let history = memory.handle();
    sim.add_sink(Box::new(memory)).unwrap();
    sim.run().unwrap();

    let ys: Vec<(u64, u64)> = history
        .history("y")
        .unwrap()
        .iter()
        .map(|(t, v)| (t.fs, v.to_u64()))
        .collect();
    assert_eq!(ys, vec![(10, 2), (20, 3)]);
    assert!(history.value_at("y", 5).is_none());
}
