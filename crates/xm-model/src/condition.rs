//! Transition preconditions.
//!
//! A condition is a tree: a time expression, a negation, a comparison
//! between agent variables and literals, or two sub-conditions joined by a
//! logical operator.  The tree is an owned value — no back-pointers — so
//! copies are plain clones.
//!
//! Evaluation reads agent variables through a [`MemoryIterator`] positioned
//! at the row under test; mixed int/double comparisons promote to double.
//! Time expressions validate but do not evaluate; lowering a model that
//! branches on time fails `NotImplemented` upstream.

use std::collections::BTreeSet;
use std::fmt;

use xm_core::ScalarValue;
use xm_exec::RowGuard;
use xm_mem::{MemError, MemoryIterator};

/// Value comparison operators (`EQ NEQ LEQ GEQ LT GT` in model files).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CompareOp {
    Eq,
    Neq,
    Leq,
    Geq,
    Lt,
    Gt,
}

impl CompareOp {
    pub fn parse(token: &str) -> Option<CompareOp> {
        match token {
            "EQ" => Some(CompareOp::Eq),
            "NEQ" => Some(CompareOp::Neq),
            "LEQ" => Some(CompareOp::Leq),
            "GEQ" => Some(CompareOp::Geq),
            "LT" => Some(CompareOp::Lt),
            "GT" => Some(CompareOp::Gt),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            CompareOp::Eq => "EQ",
            CompareOp::Neq => "NEQ",
            CompareOp::Leq => "LEQ",
            CompareOp::Geq => "GEQ",
            CompareOp::Lt => "LT",
            CompareOp::Gt => "GT",
        }
    }
}

/// Operators joining nested conditions (`AND OR`).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LogicOp {
    And,
    Or,
}

impl LogicOp {
    pub fn parse(token: &str) -> Option<LogicOp> {
        match token {
            "AND" => Some(LogicOp::And),
            "OR" => Some(LogicOp::Or),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            LogicOp::And => "AND",
            LogicOp::Or => "OR",
        }
    }
}

/// A comparison operand: an agent variable or a literal.
#[derive(Clone, PartialEq, Debug)]
pub enum Operand {
    Var(String),
    Int(i64),
    Double(f64),
}

impl Operand {
    /// Parse a textual operand: a numeric literal, else a variable name.
    pub fn parse(text: &str) -> Operand {
        let text = text.trim();
        if let Ok(i) = text.parse::<i64>() {
            Operand::Int(i)
        } else if let Ok(d) = text.parse::<f64>() {
            Operand::Double(d)
        } else {
            Operand::Var(text.to_owned())
        }
    }

    fn value(&self, cursor: &MemoryIterator<'_>) -> Result<ScalarValue, MemError> {
        match self {
            Operand::Var(name) => cursor.value(name),
            Operand::Int(i) => Ok(ScalarValue::Int(*i)),
            Operand::Double(d) => Ok(ScalarValue::Double(*d)),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(name) => write!(f, "a.{name}"),
            Operand::Int(i) => write!(f, "{i}"),
            Operand::Double(d) => write!(f, "{d}"),
        }
    }
}

/// A transition precondition tree.
#[derive(Clone, PartialEq, Debug)]
pub enum Condition {
    /// `<time>` expression over a declared time unit; validated but not
    /// evaluated by the execution core.
    Time { unit: String, phase: Option<i64> },
    Not(Box<Condition>),
    Compare {
        lhs: Operand,
        op: CompareOp,
        rhs: Operand,
    },
    Nested {
        lhs: Box<Condition>,
        op: LogicOp,
        rhs: Box<Condition>,
    },
}

impl Condition {
    /// Collect the agent variables the condition reads.
    pub fn read_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Condition::Time { .. } => {}
            Condition::Not(inner) => inner.read_vars(out),
            Condition::Compare { lhs, rhs, .. } => {
                if let Operand::Var(name) = lhs {
                    out.insert(name.clone());
                }
                if let Operand::Var(name) = rhs {
                    out.insert(name.clone());
                }
            }
            Condition::Nested { lhs, rhs, .. } => {
                lhs.read_vars(out);
                rhs.read_vars(out);
            }
        }
    }

    /// `true` if any node of the tree is a time expression.
    pub fn uses_time(&self) -> bool {
        match self {
            Condition::Time { .. } => true,
            Condition::Not(inner) => inner.uses_time(),
            Condition::Compare { .. } => false,
            Condition::Nested { lhs, rhs, .. } => lhs.uses_time() || rhs.uses_time(),
        }
    }

    /// Evaluate against the agent row the cursor is positioned at.
    pub fn eval(&self, cursor: &MemoryIterator<'_>) -> Result<bool, MemError> {
        match self {
            Condition::Time { unit, .. } => Err(MemError::InvalidOperation(format!(
                "time condition on unit {unit:?} has no runtime semantics"
            ))),
            Condition::Not(inner) => Ok(!inner.eval(cursor)?),
            Condition::Compare { lhs, op, rhs } => {
                let l = lhs.value(cursor)?;
                let r = rhs.value(cursor)?;
                Ok(compare(l, *op, r))
            }
            Condition::Nested { lhs, op, rhs } => {
                let l = lhs.eval(cursor)?;
                let r = rhs.eval(cursor)?;
                Ok(match op {
                    LogicOp::And => l && r,
                    LogicOp::Or => l || r,
                })
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Time { unit, phase } => match phase {
                Some(p) => write!(f, "time({unit}, {p})"),
                None => write!(f, "time({unit})"),
            },
            Condition::Not(inner) => write!(f, "not({inner})"),
            Condition::Compare { lhs, op, rhs } => write!(f, "({lhs} {} {rhs})", op.token()),
            Condition::Nested { lhs, op, rhs } => write!(f, "({lhs} {} {rhs})", op.token()),
        }
    }
}

impl RowGuard for Condition {
    fn test(&self, cursor: &MemoryIterator<'_>) -> Result<bool, MemError> {
        self.eval(cursor)
    }
}

/// Numeric comparison with int→double promotion on mixed operands.
fn compare(lhs: ScalarValue, op: CompareOp, rhs: ScalarValue) -> bool {
    match (lhs, rhs) {
        (ScalarValue::Int(l), ScalarValue::Int(r)) => compare_ord(l, op, r),
        (l, r) => {
            let l = match l {
                ScalarValue::Int(v) => v as f64,
                ScalarValue::Double(v) => v,
            };
            let r = match r {
                ScalarValue::Int(v) => v as f64,
                ScalarValue::Double(v) => v,
            };
            compare_ord(l, op, r)
        }
    }
}

fn compare_ord<T: PartialOrd>(l: T, op: CompareOp, r: T) -> bool {
    match op {
        CompareOp::Eq => l == r,
        CompareOp::Neq => l != r,
        CompareOp::Leq => l <= r,
        CompareOp::Geq => l >= r,
        CompareOp::Lt => l < r,
        CompareOp::Gt => l > r,
    }
}
