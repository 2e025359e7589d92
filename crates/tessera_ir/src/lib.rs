//! Design representation for the Tessera logic simulator.
//!
//! This crate defines [`Signal`]s, [`ClockDomain`]s, the [`Expr`] and
//! [`Target`] trees that read and address them, [`Statement`]s, and the
//! validated [`Fragment`] that ties them together. Runtime-indexed arrays and
//! records are available through [`Array`] and lower to plain expressions.

#![warn(missing_docs)]

pub mod arena;
pub mod array;
pub mod domain;
pub mod error;
pub mod expr;
pub mod fragment;
pub mod graph;
pub mod ids;
pub mod signal;
pub mod stmt;
pub mod target;

pub use arena::{Arena, ArenaId};
pub use array::{Array, ArrayProxy, Item, Record};
pub use domain::{ClockDomain, Edge};
pub use error::FragmentError;
pub use expr::{BinaryOp, Expr, UnaryOp};
pub use fragment::{Driver, Fragment, FragmentBuilder};
pub use graph::{comb_dependency_graph, combinational_cycles};
pub use ids::{DomainId, SignalId};
pub use signal::Signal;
pub use stmt::{Pattern, Statement, SwitchCase};
pub use target::Target;
