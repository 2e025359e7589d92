//! Clock domains: which signal clocks a group of statements, on which edge,
//! and which signal resets them.

use serde::{Deserialize, Serialize};

use crate::ids::SignalId;

/// Active clock edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Edge {
    /// 0 → 1.
    #[default]
    Pos,
    /// 1 → 0.
    Neg,
}

impl Edge {
    /// Returns `true` if a clock moving from `prev` to `now` is an active edge.
    pub fn fired(self, prev: bool, now: bool) -> bool {
        match self {
            Edge::Pos => !prev && now,
            Edge::Neg => prev && !now,
        }
    }
}

/// A clock domain declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockDomain {
    /// Unique domain name.
    pub name: String,
    /// 1-bit clock signal.
    pub clk: SignalId,
    /// Optional 1-bit synchronous reset, active high.
    pub rst: Option<SignalId>,
    /// Which clock transition updates the domain.
    pub edge: Edge,
}

impl ClockDomain {
    /// A positive-edge domain without reset.
    pub fn new(name: impl Into<String>, clk: SignalId) -> Self {
        Self {
            name: name.into(),
            clk,
            rst: None,
            edge: Edge::Pos,
        }
    }

    /// Adds a synchronous reset signal.
    pub fn with_reset(mut self, rst: SignalId) -> Self {
        self.rst = Some(rst);
        self
    }

    /// Selects the active edge.
    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edge = edge;
        self
    }
}
