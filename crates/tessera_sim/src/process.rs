//! The cooperative process protocol.
//!
//! A process is a state machine the scheduler drives by message passing: each
//! call to [`Process::resume`] receives a [`Resume`] describing the outcome of
//! the previous command and returns the next [`Step`]. Processes never touch
//! signal storage directly; every read and write goes through a [`Command`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_common::Value;
use tessera_ir::{DomainId, Expr, Target};

/// An action requested by a process.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Evaluate an expression against the latest settled values.
    /// Resumes immediately with [`Resume::Value`].
    Read(Expr),
    /// Write a value into a target, resized to the target's width, then settle.
    /// Resumes immediately with [`Resume::Ready`].
    Write(Target, Value),
    /// Suspend for the given number of femtoseconds. Zero resumes in the next
    /// delta round of the current instant.
    Delay(u64),
    /// Suspend until the next active edge of a domain has been applied.
    Tick(DomainId),
    /// Stop counting this process as keeping [`run`](crate::Simulator::run) alive.
    Passive,
    /// Stop the simulation. The process is abandoned.
    Stop,
}

/// What the scheduler hands back to a process.
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    /// First activation.
    Start,
    /// Result of a [`Command::Read`].
    Value(Value),
    /// The previous command completed.
    Ready,
}

/// What a process returns from [`Process::resume`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Issue a command.
    Yield(Command),
    /// The process has finished.
    Done,
}

/// Failures a process can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    /// A check made by the process did not hold.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// The process could not continue.
    #[error("{0}")]
    Failed(String),
}

/// A suspendable unit of testbench logic.
pub trait Process {
    /// Name used in errors and logs; the scheduler picks one when `None`.
    fn name(&self) -> Option<&str> {
        None
    }

    /// Advances the process to its next command.
    fn resume(&mut self, input: Resume) -> Result<Step, ProcessError>;
}

impl<F> Process for F
where
    F: FnMut(Resume) -> Result<Step, ProcessError>,
{
    fn resume(&mut self, input: Resume) -> Result<Step, ProcessError> {
        self(input)
    }
}

/// Handle to a registered process.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct ProcessId(u32);

impl ProcessId {
    /// Creates an ID from a raw registration index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw registration index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "process{}", self.0)
    }
}
