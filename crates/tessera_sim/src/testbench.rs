//! Scripted testbench processes.
//!
//! A [`Testbench`] is a [`Process`] built from a flat list of actions: writes,
//! delays, clock ticks and value checks. It keeps a cursor into the list and
//! turns each action into the matching [`Command`].

use std::cmp::Ordering;

use tessera_common::Value;
use tessera_ir::{DomainId, Expr, Target};

use crate::process::{Command, Process, ProcessError, Resume, Step};

#[derive(Debug, Clone)]
enum Action {
    Command(Command),
    Expect {
        label: String,
        expr: Expr,
        expected: Value,
    },
}

/// A process that plays back a fixed script.
///
/// ```ignore
/// let bench = Testbench::new("adder")
///     .write(a, Value::constant(12, 4))
///     .write(b, Value::constant(11, 4))
///     .settle()
///     .expect(y, Value::int(23));
/// sim.add_process(bench)?;
/// ```
#[derive(Debug, Clone)]
pub struct Testbench {
    name: String,
    actions: Vec<Action>,
    cursor: usize,
    pending_check: Option<(String, Value)>,
}

impl Testbench {
    /// An empty script.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            cursor: 0,
            pending_check: None,
        }
    }

    fn push(mut self, command: Command) -> Self {
        self.actions.push(Action::Command(command));
        self
    }

    /// Drives `value` onto `target`.
    pub fn write(self, target: impl Into<Target>, value: impl Into<Value>) -> Self {
        self.push(Command::Write(target.into(), value.into()))
    }

    /// Waits `fs` femtoseconds.
    pub fn delay(self, fs: u64) -> Self {
        self.push(Command::Delay(fs))
    }

    /// Waits one delta round.
    pub fn settle(self) -> Self {
        self.delay(0)
    }

    /// Waits for the next active edge of `domain`.
    pub fn tick(self, domain: DomainId) -> Self {
        self.push(Command::Tick(domain))
    }

    /// Waits for `count` active edges of `domain`.
    pub fn ticks(mut self, domain: DomainId, count: usize) -> Self {
        for _ in 0..count {
            self = self.tick(domain);
        }
        self
    }

    /// Marks the script as passive from this point on.
    pub fn passive(self) -> Self {
        self.push(Command::Passive)
    }

    /// Stops the simulation.
    pub fn stop(self) -> Self {
        self.push(Command::Stop)
    }

    /// Fails with an assertion unless `expr` equals `expected` numerically.
    pub fn expect(self, expr: impl Into<Expr>, expected: impl Into<Value>) -> Self {
        let label = format!("check {}", self.actions.len());
        self.expect_named(label, expr, expected)
    }

    /// Like [`expect`](Self::expect), with a label for the failure message.
    pub fn expect_named(
        mut self,
        label: impl Into<String>,
        expr: impl Into<Expr>,
        expected: impl Into<Value>,
    ) -> Self {
        self.actions.push(Action::Expect {
            label: label.into(),
            expr: expr.into(),
            expected: expected.into(),
        });
        self
    }

    /// Number of scripted actions.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if the script has no actions.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Process for Testbench {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn resume(&mut self, input: Resume) -> Result<Step, ProcessError> {
        if let Some((label, expected)) = self.pending_check.take() {
            let Resume::Value(actual) = input else {
                return Err(ProcessError::Failed(format!(
                    "{label}: expected a read result, got {input:?}"
                )));
            };
            if actual.compare(&expected) != Ordering::Equal {
                return Err(ProcessError::Assertion(format!(
                    "{label}: expected {} ({expected}), got {} ({actual})",
                    expected.to_i64_saturating(),
                    actual.to_i64_saturating(),
                )));
            }
        }

        let Some(action) = self.actions.get(self.cursor) else {
            return Ok(Step::Done);
        };
        self.cursor += 1;
        Ok(Step::Yield(match action {
            Action::Command(command) => command.clone(),
            Action::Expect {
                label,
                expr,
                expected,
            } => {
                self.pending_check = Some((label.clone(), expected.clone()));
                Command::Read(expr.clone())
            }
        }))
    }
}
