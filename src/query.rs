//! The query plan that filter lowering writes into.
//!
//! A [`FesQuery`] is created for one compilation, filled by the AST lowering
//! code, and turned into an immutable [`CompiledQuery`] by [`FesQuery::finalize`].
//! The executor applies the result in order: annotations, lookups, ordering.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FesError, Result};
use crate::geometry::GeometryValue;
use crate::gml::Distance;
use crate::lookups::LookupKind;

/// A plain scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Type untyped text: integer, then float, then string.
    ///
    /// Digits with a leading zero (`007`, `0612345678`) are codes, not numbers,
    /// and stay strings.
    pub fn infer(text: &str) -> Self {
        let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
        let mut leading = digits.chars();
        if leading.next() == Some('0') && leading.next().is_some_and(|c| c.is_ascii_digit()) {
            return Scalar::String(text.to_string());
        }
        if let Ok(i) = text.parse::<i64>() {
            return Scalar::Integer(i);
        }
        // f64::from_str also accepts "inf" and "NaN", which are strings here
        let numeric = text.chars().any(|c| c.is_ascii_digit())
            && text
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
        if numeric {
            if let Ok(f) = text.parse::<f64>() {
                return Scalar::Float(f);
            }
        }
        Scalar::String(text.to_string())
    }

    /// The value as text, without the quoting `Display` adds to strings.
    pub fn as_text(&self) -> String {
        match self {
            Scalar::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("NULL"),
            Scalar::Boolean(b) => write!(f, "{b}"),
            Scalar::Integer(i) => write!(f, "{i}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::String(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
        }
    }
}

/// A lowered right-hand-side value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Scalar(Scalar),
    /// Reference to a field path (`a__b`) or an annotation alias.
    Field(String),
    Function { name: String, args: Vec<Value> },
    Arithmetic {
        op: ArithmeticOp,
        lhs: Box<Value>,
        rhs: Box<Value>,
    },
    Geometry(GeometryValue),
    Distance(Distance),
    /// Several operands for one lookup, e.g. `(low, high)` or `(geometry, distance)`.
    Tuple(Vec<Value>),
}

impl Value {
    pub fn field(path: impl Into<String>) -> Self {
        Value::Field(path.into())
    }

    /// Number of operands the lookup receives.
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Value::Tuple(items) => items.iter().collect(),
            other => vec![other],
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        Value::Scalar(scalar)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{s}"),
            Value::Field(path) => write!(f, "F({path})"),
            Value::Function { name, args } => {
                let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                write!(f, "{}({})", name, args.join(", "))
            }
            Value::Arithmetic { op, lhs, rhs } => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
            Value::Geometry(g) => write!(f, "{}", g.ewkt()),
            Value::Distance(d) => write!(f, "{d}"),
            Value::Tuple(items) => {
                let items: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "({})", items.join(", "))
            }
        }
    }
}

/// One `subject__lookup = value` comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lookup {
    pub subject: String,
    pub kind: LookupKind,
    pub value: Value,
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}__{} = {}", self.subject, self.kind, self.value)
    }
}

/// A boolean predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Lookup(Lookup),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn lookup(subject: impl Into<String>, kind: LookupKind, value: impl Into<Value>) -> Self {
        Condition::Lookup(Lookup {
            subject: subject.into(),
            kind,
            value: value.into(),
        })
    }

    pub fn and(self, other: Condition) -> Self {
        match self {
            Condition::And(mut items) => {
                items.push(other);
                Condition::And(items)
            }
            first => Condition::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Condition) -> Self {
        match self {
            Condition::Or(mut items) => {
                items.push(other);
                Condition::Or(items)
            }
            first => Condition::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// Combine many conditions with AND; `None` when there are none.
    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Option<Self> {
        conditions.into_iter().reduce(Condition::and)
    }

    /// Combine many conditions with OR; `None` when there are none.
    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Option<Self> {
        conditions.into_iter().reduce(Condition::or)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, items: &[Condition], sep: &str| {
            let parts: Vec<String> = items.iter().map(|c| format!("({c})")).collect();
            f.write_str(&parts.join(sep))
        };
        match self {
            Condition::Lookup(lookup) => write!(f, "{lookup}"),
            Condition::And(items) => join(f, items, " AND "),
            Condition::Or(items) => join(f, items, " OR "),
            Condition::Not(inner) => write!(f, "NOT ({inner})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub path: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            descending: false,
        }
    }

    pub fn desc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            descending: true,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "-{}", self.path)
        } else {
            f.write_str(&self.path)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub alias: String,
    pub value: Value,
}

/// The finished plan handed to the executor.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CompiledQuery {
    pub annotations: Vec<Annotation>,
    /// Implicitly AND-ed together.
    pub lookups: Vec<Condition>,
    pub ordering: Vec<SortKey>,
}

impl CompiledQuery {
    pub fn annotation(&self, alias: &str) -> Option<&Value> {
        self.annotations
            .iter()
            .find(|a| a.alias == alias)
            .map(|a| &a.value)
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty() && self.lookups.is_empty() && self.ordering.is_empty()
    }
}

const ALIAS_PREFIX: &str = "@a";

/// Accumulator for one filter compilation.
///
/// Lowering code may `stash_extra_lookup` a constraint it cannot return itself;
/// the nearest enclosing comparison must merge it with
/// `consume_stashed_lookups`. Adding a top-level lookup or finalizing while a
/// stash is still pending is an internal error.
#[derive(Debug, Default)]
pub struct FesQuery {
    annotations: Vec<Annotation>,
    lookups: Vec<Condition>,
    extra_lookups: Vec<Condition>,
    ordering: Vec<SortKey>,
}

impl FesQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a computed value to a fresh alias (`@a1`, `@a2`, ...) and return it.
    ///
    /// The `@` keeps aliases apart from field paths, which never contain it.
    pub fn add_annotation(&mut self, value: Value) -> String {
        let alias = format!("{ALIAS_PREFIX}{}", self.annotations.len() + 1);
        tracing::debug!(alias = %alias, value = %value, "annotation added");
        self.annotations.push(Annotation {
            alias: alias.clone(),
            value,
        });
        alias
    }

    pub fn add_lookup(&mut self, condition: Condition) -> Result<()> {
        self.ensure_no_stash("add a lookup")?;
        self.lookups.push(condition);
        Ok(())
    }

    pub fn stash_extra_lookup(&mut self, condition: Condition) {
        self.extra_lookups.push(condition);
    }

    pub fn has_stashed_lookups(&self) -> bool {
        !self.extra_lookups.is_empty()
    }

    /// AND any stashed lookups into `result`, leaving the stash empty.
    pub fn consume_stashed_lookups(&mut self, result: Condition) -> Condition {
        if self.extra_lookups.is_empty() {
            return result;
        }
        let extra = std::mem::take(&mut self.extra_lookups);
        extra.into_iter().fold(result, Condition::and)
    }

    /// Build `subject__lookup = value`, merging pending stashed lookups.
    pub fn build_compare(&mut self, subject: impl Into<String>, kind: LookupKind, value: Value) -> Condition {
        let condition = Condition::lookup(subject, kind, value);
        self.consume_stashed_lookups(condition)
    }

    pub fn add_sort(&mut self, keys: impl IntoIterator<Item = SortKey>) {
        self.ordering.extend(keys);
    }

    pub fn finalize(self) -> Result<CompiledQuery> {
        self.ensure_no_stash("finalize the query")?;
        Ok(CompiledQuery {
            annotations: self.annotations,
            lookups: self.lookups,
            ordering: self.ordering,
        })
    }

    fn ensure_no_stash(&self, action: &str) -> Result<()> {
        if self.extra_lookups.is_empty() {
            return Ok(());
        }
        let pending: Vec<String> = self.extra_lookups.iter().map(ToString::to_string).collect();
        tracing::error!(pending = ?pending, "stashed lookups were never consumed");
        Err(FesError::Invariant(format!(
            "cannot {} while stashed lookups are unconsumed: {}",
            action,
            pending.join(", ")
        )))
    }
}
