//! Fragments: the validated unit handed to the simulator.
//!
//! A [`Fragment`] owns its signals, its clock domains, and two kinds of
//! statements: combinational statements (re-evaluated until the design
//! settles) and clocked statements (run once per active edge of their
//! domain). Fragments are assembled with a [`FragmentBuilder`], whose
//! [`build`](FragmentBuilder::build) step rejects malformed input.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tessera_common::Shape;

use crate::arena::{Arena, ArenaId};
use crate::domain::ClockDomain;
use crate::error::FragmentError;
use crate::ids::{DomainId, SignalId};
use crate::signal::Signal;
use crate::stmt::Statement;

/// Which logic drives a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Driver {
    /// Combinational statements.
    Comb,
    /// Clocked statements of a domain.
    Clocked(DomainId),
}

/// A validated set of signals, domains and statements.
///
/// Deserialization goes through [`FragmentBuilder::build`], so a fragment
/// read from JSON is checked like one assembled in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "FragmentBuilder")]
pub struct Fragment {
    signals: Arena<SignalId, Signal>,
    domains: Arena<DomainId, ClockDomain>,
    comb: Vec<Statement>,
    clocked: Vec<Vec<Statement>>,
    drivers: Vec<Option<Driver>>,
}

impl Fragment {
    /// All signals.
    pub fn signals(&self) -> &Arena<SignalId, Signal> {
        &self.signals
    }

    /// A signal by ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID does not belong to this fragment.
    pub fn signal(&self, id: SignalId) -> &Signal {
        &self.signals[id]
    }

    /// Looks a signal up by name.
    pub fn find_signal(&self, name: &str) -> Option<SignalId> {
        self.signals
            .iter()
            .find(|(_, s)| s.name == name)
            .map(|(id, _)| id)
    }

    /// All clock domains, in declaration order.
    pub fn domains(&self) -> &Arena<DomainId, ClockDomain> {
        &self.domains
    }

    /// Looks a domain up by name.
    pub fn find_domain(&self, name: &str) -> Option<DomainId> {
        self.domains
            .iter()
            .find(|(_, d)| d.name == name)
            .map(|(id, _)| id)
    }

    /// Top-level combinational statements.
    pub fn comb_statements(&self) -> &[Statement] {
        &self.comb
    }

    /// Clocked statements of `domain`.
    pub fn clocked_statements(&self, domain: DomainId) -> &[Statement] {
        self.clocked.get(domain.index()).map_or(&[], Vec::as_slice)
    }

    /// The logic driving `id`, or `None` for undriven (input) signals.
    pub fn driver(&self, id: SignalId) -> Option<Driver> {
        self.drivers.get(id.index()).copied().flatten()
    }

    /// Combinationally driven signals, in ID order.
    pub fn comb_signals(&self) -> Vec<SignalId> {
        self.signals_driven_by(Driver::Comb)
    }

    /// Signals driven by the clocked statements of `domain`, in ID order.
    pub fn clocked_signals(&self, domain: DomainId) -> Vec<SignalId> {
        self.signals_driven_by(Driver::Clocked(domain))
    }

    fn signals_driven_by(&self, driver: Driver) -> Vec<SignalId> {
        self.drivers
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == Some(driver))
            .map(|(i, _)| SignalId::from_raw(i as u32))
            .collect()
    }
}

/// Incrementally assembles a [`Fragment`].
#[derive(Debug, Default, Deserialize)]
pub struct FragmentBuilder {
    signals: Arena<SignalId, Signal>,
    domains: Arena<DomainId, ClockDomain>,
    comb: Vec<Statement>,
    clocked: Vec<Vec<Statement>>,
}

impl FragmentBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a signal that resets to zero.
    pub fn signal(&mut self, name: impl Into<String>, shape: Shape) -> SignalId {
        self.add_signal(Signal::new(name, shape))
    }

    /// Declares a fully described signal.
    pub fn add_signal(&mut self, signal: Signal) -> SignalId {
        self.signals.alloc(signal)
    }

    /// Declares a clock domain.
    pub fn domain(&mut self, domain: ClockDomain) -> DomainId {
        self.clocked.push(Vec::new());
        self.domains.alloc(domain)
    }

    /// Adds a combinational statement.
    pub fn comb(&mut self, stmt: impl Into<Statement>) -> &mut Self {
        self.comb.push(stmt.into());
        self
    }

    /// Adds a statement clocked by `domain`.
    ///
    /// # Panics
    ///
    /// Panics if `domain` was not returned by this builder.
    pub fn sync(&mut self, domain: DomainId, stmt: impl Into<Statement>) -> &mut Self {
        self.clocked[domain.index()].push(stmt.into());
        self
    }

    /// Validates everything and produces the fragment.
    pub fn build(self) -> Result<Fragment, FragmentError> {
        if self.clocked.len() > self.domains.len() {
            return Err(FragmentError::UnknownDomain(
                DomainId::from_raw(self.domains.len() as u32).to_string(),
            ));
        }
        let mut clocked = self.clocked;
        clocked.resize_with(self.domains.len(), Vec::new);
        let this = Self { clocked, ..self };
        this.validate()
    }

    fn validate(self) -> Result<Fragment, FragmentError> {
        let mut names = HashSet::new();
        for signal in self.signals.values() {
            if !names.insert(signal.name.as_str()) {
                return Err(FragmentError::DuplicateSignal(signal.name.clone()));
            }
            if signal.reset.shape() != signal.shape {
                return Err(FragmentError::ResetShape {
                    signal: signal.name.clone(),
                    expected: signal.shape,
                    found: signal.reset.shape(),
                });
            }
        }

        let mut domain_names = HashSet::new();
        for domain in self.domains.values() {
            if !domain_names.insert(domain.name.as_str()) {
                return Err(FragmentError::DuplicateDomain(domain.name.clone()));
            }
            let controls = std::iter::once(("clock", domain.clk))
                .chain(domain.rst.map(|rst| ("reset", rst)));
            for (role, id) in controls {
                let signal = self
                    .signals
                    .try_get(id)
                    .ok_or_else(|| FragmentError::UnknownSignal(id.to_string()))?;
                if signal.shape.width != 1 {
                    return Err(FragmentError::ControlWidth {
                        domain: domain.name.clone(),
                        role,
                        signal: signal.name.clone(),
                        width: signal.shape.width,
                    });
                }
            }
        }

        let mut drivers: Vec<Option<Driver>> = vec![None; self.signals.len()];
        let groups = std::iter::once((Driver::Comb, &self.comb)).chain(
            self.clocked
                .iter()
                .enumerate()
                .map(|(i, stmts)| (Driver::Clocked(DomainId::from_raw(i as u32)), stmts)),
        );
        for (driver, stmts) in groups {
            for stmt in stmts {
                stmt.validate(&self.signals)?;
                let mut conflict = None;
                stmt.for_each_driven(&mut |id| {
                    let Some(slot) = drivers.get_mut(id.index()) else {
                        return;
                    };
                    let first = *slot.get_or_insert(driver);
                    if first != driver && conflict.is_none() {
                        conflict = Some((id, first));
                    }
                });
                if let Some((id, first)) = conflict {
                    return Err(FragmentError::ConflictingDrivers {
                        signal: self.signals[id].name.clone(),
                        first: self.describe(first).to_string(),
                        second: self.describe(driver).to_string(),
                    });
                }
            }
        }

        Ok(Fragment {
            signals: self.signals,
            domains: self.domains,
            comb: self.comb,
            clocked: self.clocked,
            drivers,
        })
    }

    fn describe(&self, driver: Driver) -> DriverName<'_> {
        DriverName(match driver {
            Driver::Comb => None,
            Driver::Clocked(d) => Some(self.domains[d].name.as_str()),
        })
    }
}

impl TryFrom<FragmentBuilder> for Fragment {
    type Error = FragmentError;

    fn try_from(builder: FragmentBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

struct DriverName<'a>(Option<&'a str>);

impl fmt::Display for DriverName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => f.write_str("comb"),
            Some(name) => write!(f, "domain '{name}'"),
        }
    }
}
