//! Statements: assignments, switches and sequences.
//!
//! Within one evaluation pass, statements run in order and later assignments
//! to the same bits win. A [`Statement::Switch`] runs the body of the first
//! case whose pattern matches; a case with no patterns always matches.

use serde::{Deserialize, Serialize};
use tessera_common::{Shape, Value};

use crate::arena::Arena;
use crate::error::FragmentError;
use crate::expr::Expr;
use crate::ids::SignalId;
use crate::signal::Signal;
use crate::target::Target;

/// A switch case pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    /// Matches a condition equal to this value.
    Value(Value),
    /// MSB-first bit string of `0`, `1` and `-` (don't care); spaces are ignored.
    Bits(String),
}

impl Pattern {
    fn digits(bits: &str) -> impl Iterator<Item = char> + '_ {
        bits.chars().filter(|c| !c.is_whitespace())
    }

    /// Checks the pattern against the width of the switch condition.
    pub fn validate(&self, condition: Shape) -> Result<(), FragmentError> {
        match self {
            Pattern::Value(value) => {
                let resized = value.cast(Shape {
                    width: condition.width,
                    signed: value.is_signed(),
                });
                if resized != *value {
                    return Err(FragmentError::PatternWidth {
                        pattern: value.to_i64_saturating().to_string(),
                        expected: condition.width,
                    });
                }
            }
            Pattern::Bits(bits) => {
                if Self::digits(bits).any(|c| !matches!(c, '0' | '1' | '-')) {
                    return Err(FragmentError::InvalidPattern(bits.clone()));
                }
                if Self::digits(bits).count() != condition.width as usize {
                    return Err(FragmentError::PatternWidth {
                        pattern: bits.clone(),
                        expected: condition.width,
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns `true` if `test` matches. Assumes the pattern was validated
    /// against `test`'s width.
    pub fn matches(&self, test: &Value) -> bool {
        match self {
            Pattern::Value(value) => value.cast(test.shape()).same_bits(test),
            Pattern::Bits(bits) => {
                let width = test.width();
                Self::digits(bits).enumerate().all(|(k, c)| {
                    let Some(pos) = (width as usize).checked_sub(k + 1) else {
                        return false;
                    };
                    match c {
                        '0' => !test.bit(pos as u32),
                        '1' => test.bit(pos as u32),
                        _ => true,
                    }
                })
            }
        }
    }
}

impl From<i64> for Pattern {
    fn from(value: i64) -> Self {
        Pattern::Value(Value::int(value))
    }
}

impl From<Value> for Pattern {
    fn from(value: Value) -> Self {
        Pattern::Value(value)
    }
}

impl From<&str> for Pattern {
    fn from(bits: &str) -> Self {
        Pattern::Bits(bits.to_string())
    }
}

/// One arm of a switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// Alternatives; empty means "always matches".
    pub patterns: Vec<Pattern>,
    /// Statements run when the case is taken.
    pub body: Vec<Statement>,
}

impl SwitchCase {
    /// A case taken when any of `patterns` matches.
    pub fn new<P: Into<Pattern>>(
        patterns: impl IntoIterator<Item = P>,
        body: Vec<Statement>,
    ) -> Self {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            body,
        }
    }

    /// A case that is always taken when reached.
    pub fn otherwise(body: Vec<Statement>) -> Self {
        Self {
            patterns: Vec::new(),
            body,
        }
    }

    /// Returns `true` if this case is taken for `test`.
    pub fn matches(&self, test: &Value) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(test))
    }
}

/// A statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// Writes `value`, resized to the target's width, into `target`.
    Assign {
        /// Destination bits.
        target: Target,
        /// Source expression.
        value: Expr,
    },
    /// Runs the first matching case.
    Switch {
        /// Condition.
        test: Expr,
        /// Cases in priority order.
        cases: Vec<SwitchCase>,
    },
    /// Runs statements in order.
    Sequence(Vec<Statement>),
}

impl Statement {
    /// `target = value`.
    pub fn assign(target: impl Into<Target>, value: impl Into<Expr>) -> Self {
        Statement::Assign {
            target: target.into(),
            value: value.into(),
        }
    }

    /// A switch over `test`.
    pub fn switch(test: impl Into<Expr>, cases: Vec<SwitchCase>) -> Self {
        Statement::Switch {
            test: test.into(),
            cases,
        }
    }

    /// `if cond { then } else { otherwise }`.
    pub fn if_else(
        cond: impl Into<Expr>,
        then: Vec<Statement>,
        otherwise: Vec<Statement>,
    ) -> Self {
        Self::switch(
            cond.into().boolean(),
            vec![
                SwitchCase::new([1i64], then),
                SwitchCase::otherwise(otherwise),
            ],
        )
    }

    /// `if cond { then }`.
    pub fn when(cond: impl Into<Expr>, then: Vec<Statement>) -> Self {
        Self::if_else(cond, then, Vec::new())
    }

    /// Validates every expression, target and pattern in the statement.
    pub fn validate(&self, signals: &Arena<SignalId, Signal>) -> Result<(), FragmentError> {
        match self {
            Statement::Assign { target, value } => {
                target.static_width(signals)?;
                value.shape(signals)?;
            }
            Statement::Switch { test, cases } => {
                let shape = test.shape(signals)?;
                for case in cases {
                    for pattern in &case.patterns {
                        pattern.validate(shape)?;
                    }
                    for stmt in &case.body {
                        stmt.validate(signals)?;
                    }
                }
            }
            Statement::Sequence(stmts) => {
                for stmt in stmts {
                    stmt.validate(signals)?;
                }
            }
        }
        Ok(())
    }

    /// Calls `f` for every signal this statement may assign.
    pub fn for_each_driven(&self, f: &mut dyn FnMut(SignalId)) {
        match self {
            Statement::Assign { target, .. } => target.for_each_driven(f),
            Statement::Switch { cases, .. } => cases
                .iter()
                .flat_map(|c| c.body.iter())
                .for_each(|s| s.for_each_driven(f)),
            Statement::Sequence(stmts) => stmts.iter().for_each(|s| s.for_each_driven(f)),
        }
    }

    /// Calls `f` for every signal this statement may read, including switch
    /// conditions and runtime addresses of targets.
    pub fn for_each_read(&self, f: &mut dyn FnMut(SignalId)) {
        match self {
            Statement::Assign { target, value } => {
                target.for_each_read(f);
                value.for_each_signal(f);
            }
            Statement::Switch { test, cases } => {
                test.for_each_signal(f);
                cases
                    .iter()
                    .flat_map(|c| c.body.iter())
                    .for_each(|s| s.for_each_read(f));
            }
            Statement::Sequence(stmts) => stmts.iter().for_each(|s| s.for_each_read(f)),
        }
    }
}

impl From<Vec<Statement>> for Statement {
    fn from(stmts: Vec<Statement>) -> Self {
        Statement::Sequence(stmts)
    }
}
