//! Simulation error types.
//!
//! All errors that can occur while constructing or running a simulation are
//! variants of [`SimError`]. Trace sink failures are deliberately absent: they
//! are collected as [`TraceFailure`](crate::trace::TraceFailure)s and never
//! abort a run.

use tessera_common::{ShapeError, SimTime};
use tessera_config::ConfigError;
use tessera_ir::FragmentError;

/// Errors that can occur during simulation setup or execution.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The fragment failed validation.
    #[error("malformed fragment: {0}")]
    MalformedFragment(#[from] FragmentError),

    /// Combinational logic kept changing until the pass ceiling was reached.
    #[error(
        "combinational loop: no fixed point after {passes} passes at {time}; still changing: {}",
        .signals.join(", ")
    )]
    CombinationalLoop {
        /// Instant at which settlement was attempted.
        time: SimTime,
        /// The pass ceiling that was reached.
        passes: u32,
        /// Signals that changed during the last pass.
        signals: Vec<String>,
    },

    /// A process reported a failed check.
    #[error("assertion failed in {process} at {time}: {message}")]
    AssertionFailure {
        /// Name of the failing process.
        process: String,
        /// Instant of the failure.
        time: SimTime,
        /// Message supplied by the process.
        message: String,
    },

    /// A process failed for a reason other than an assertion.
    #[error("process {process} failed at {time}: {reason}")]
    ProcessFailed {
        /// Name of the failing process.
        process: String,
        /// Instant of the failure.
        time: SimTime,
        /// Description supplied by the process.
        reason: String,
    },

    /// A process issued a command the simulator cannot honor.
    #[error("protocol violation by {process}: {reason}")]
    ProcessProtocol {
        /// Name of the offending process.
        process: String,
        /// What was wrong with the command.
        reason: String,
    },

    /// Too many zero-delay rounds within one instant.
    #[error("delta cycle limit exceeded at {time} (max {max_deltas} deltas)")]
    DeltaCycleLimit {
        /// The instant that did not quiesce.
        time: SimTime,
        /// The configured ceiling.
        max_deltas: u32,
    },

    /// The simulator was stopped or closed and no longer accepts work.
    #[error("simulator has been finalized")]
    Finalized,

    /// A name did not match any signal of the fragment.
    #[error("unknown signal '{0}'")]
    UnknownSignal(String),

    /// A clock generator could not be attached.
    #[error("invalid clock for domain '{domain}': {reason}")]
    InvalidClock {
        /// Domain name, or its ID when the domain does not exist.
        domain: String,
        /// Why the clock was rejected.
        reason: String,
    },

    /// An operator produced a value wider than supported.
    #[error("evaluation error: {0}")]
    Shape(#[from] ShapeError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_fragment_display() {
        let e = SimError::from(FragmentError::DuplicateSignal("a".into()));
        assert_eq!(
            e.to_string(),
            "malformed fragment: duplicate signal name 'a'"
        );
    }

    #[test]
    fn combinational_loop_display() {
        let e = SimError::CombinationalLoop {
            time: SimTime::from_ns(3),
            passes: 10_000,
            signals: vec!["p".into(), "q".into()],
        };
        assert_eq!(
            e.to_string(),
            "combinational loop: no fixed point after 10000 passes at 3 ns; still changing: p, q"
        );
    }

    #[test]
    fn assertion_failure_display() {
        let e = SimError::AssertionFailure {
            process: "bench".into(),
            time: SimTime::from_ns(10),
            message: "y != 3".into(),
        };
        assert_eq!(e.to_string(), "assertion failed in bench at 10 ns: y != 3");
    }

    #[test]
    fn process_failed_display() {
        let e = SimError::ProcessFailed {
            process: "bench".into(),
            time: SimTime::ZERO,
            reason: "fixture missing".into(),
        };
        assert_eq!(e.to_string(), "process bench failed at 0 fs: fixture missing");
    }

    #[test]
    fn protocol_display() {
        let e = SimError::ProcessProtocol {
            process: "process0".into(),
            reason: "signal 'y' is driven by combinational logic".into(),
        };
        assert_eq!(
            e.to_string(),
            "protocol violation by process0: signal 'y' is driven by combinational logic"
        );
    }

    #[test]
    fn delta_limit_display() {
        let e = SimError::DeltaCycleLimit {
            time: SimTime::from_ns(5),
            max_deltas: 100,
        };
        assert_eq!(
            e.to_string(),
            "delta cycle limit exceeded at 5 ns (max 100 deltas)"
        );
    }

    #[test]
    fn finalized_and_unknown_signal_display() {
        assert_eq!(
            SimError::Finalized.to_string(),
            "simulator has been finalized"
        );
        assert_eq!(
            SimError::UnknownSignal("zz".into()).to_string(),
            "unknown signal 'zz'"
        );
    }

    #[test]
    fn invalid_clock_display() {
        let e = SimError::InvalidClock {
            domain: "sync".into(),
            reason: "period must be at least 2 fs".into(),
        };
        assert_eq!(
            e.to_string(),
            "invalid clock for domain 'sync': period must be at least 2 fs"
        );
    }

    #[test]
    fn config_error_is_transparent() {
        let e = SimError::from(ConfigError::MissingField("trace.path".into()));
        assert_eq!(e.to_string(), "missing required field: trace.path");
    }
}
