//! Lookup operators and their rendering for the SQL executor.
//!
//! Every comparison in a compiled plan names a lookup (`exact`, `lt`,
//! `intersects`, ...). Most are standard; four are FES specific and have to be
//! registered with the executor before it can run a plan that uses them:
//! `fes_like`, `fes_ilike`, `fes_notequal` and `fes_notwithin`.

use std::collections::HashMap;
use std::fmt;

use sea_query::{Alias, BinOper, Expr, Func, Keyword, SimpleExpr};
use serde::Serialize;

use crate::error::{FesError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "&'static str")]
pub enum LookupKind {
    Exact,
    IExact,
    NotEqual,
    Lt,
    Gt,
    Lte,
    Gte,
    Range,
    Like,
    ILike,
    IsNull,
    Equals,
    Disjoint,
    Touches,
    Within,
    Overlaps,
    Crosses,
    Intersects,
    Contains,
    DWithin,
    NotWithin,
}

impl LookupKind {
    /// The name the executor registers this lookup under.
    pub fn name(self) -> &'static str {
        match self {
            LookupKind::Exact => "exact",
            LookupKind::IExact => "iexact",
            LookupKind::NotEqual => "fes_notequal",
            LookupKind::Lt => "lt",
            LookupKind::Gt => "gt",
            LookupKind::Lte => "lte",
            LookupKind::Gte => "gte",
            LookupKind::Range => "range",
            LookupKind::Like => "fes_like",
            LookupKind::ILike => "fes_ilike",
            LookupKind::IsNull => "isnull",
            LookupKind::Equals => "equals",
            LookupKind::Disjoint => "disjoint",
            LookupKind::Touches => "touches",
            LookupKind::Within => "within",
            LookupKind::Overlaps => "overlaps",
            LookupKind::Crosses => "crosses",
            LookupKind::Intersects => "intersects",
            LookupKind::Contains => "contains",
            LookupKind::DWithin => "dwithin",
            LookupKind::NotWithin => "fes_notwithin",
        }
    }

    /// Lookups that are not built into a typical executor.
    pub fn is_custom(self) -> bool {
        self.name().starts_with("fes_")
    }

    /// The comparison to use when the two operands trade places.
    pub fn mirrored(self) -> Self {
        match self {
            LookupKind::Lt => LookupKind::Gt,
            LookupKind::Gt => LookupKind::Lt,
            LookupKind::Lte => LookupKind::Gte,
            LookupKind::Gte => LookupKind::Lte,
            other => other,
        }
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<LookupKind> for &'static str {
    fn from(kind: LookupKind) -> Self {
        kind.name()
    }
}

/// Builds the SQL expression for `lhs <lookup> rhs...`.
pub type LookupRenderer = fn(SimpleExpr, Vec<SimpleExpr>) -> SimpleExpr;

#[derive(Clone, Copy)]
struct LookupEntry {
    arity: usize,
    render: LookupRenderer,
}

/// The set of lookups an executor knows how to apply.
#[derive(Clone, Default)]
pub struct LookupRegistry {
    entries: HashMap<&'static str, LookupEntry>,
}

impl LookupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard comparisons plus the PostGIS spatial predicates.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("exact", 1, |l, r| Expr::expr(l).eq(first(r)));
        registry.register("iexact", 1, |l, r| {
            Expr::expr(Func::lower(l)).eq(Func::lower(first(r)))
        });
        registry.register("lt", 1, |l, r| Expr::expr(l).lt(first(r)));
        registry.register("gt", 1, |l, r| Expr::expr(l).gt(first(r)));
        registry.register("lte", 1, |l, r| Expr::expr(l).lte(first(r)));
        registry.register("gte", 1, |l, r| Expr::expr(l).gte(first(r)));
        registry.register("range", 2, |l, r| {
            let mut bounds = r.into_iter();
            let low = bounds.next().unwrap_or(SimpleExpr::Keyword(Keyword::Null));
            let high = bounds.next().unwrap_or(SimpleExpr::Keyword(Keyword::Null));
            Expr::expr(l).between(low, high)
        });
        registry.register("isnull", 1, |l, r| match first(r) {
            SimpleExpr::Value(sea_query::Value::Bool(Some(false))) => Expr::expr(l).is_not_null(),
            _ => Expr::expr(l).is_null(),
        });
        registry.register("equals", 1, |l, r| st_call("ST_Equals", l, r));
        registry.register("disjoint", 1, |l, r| st_call("ST_Disjoint", l, r));
        registry.register("touches", 1, |l, r| st_call("ST_Touches", l, r));
        registry.register("within", 1, |l, r| st_call("ST_Within", l, r));
        registry.register("overlaps", 1, |l, r| st_call("ST_Overlaps", l, r));
        registry.register("crosses", 1, |l, r| st_call("ST_Crosses", l, r));
        registry.register("intersects", 1, |l, r| st_call("ST_Intersects", l, r));
        registry.register("contains", 1, |l, r| st_call("ST_Contains", l, r));
        registry.register("dwithin", 2, |l, r| st_call("ST_DWithin", l, r));
        registry
    }

    /// Builtins plus the FES specific lookups.
    pub fn with_fes_lookups() -> Self {
        let mut registry = Self::builtin();
        register_fes_lookups(&mut registry);
        registry
    }

    pub fn register(&mut self, name: &'static str, arity: usize, render: LookupRenderer) {
        if self.entries.insert(name, LookupEntry { arity, render }).is_some() {
            tracing::debug!(lookup = name, "lookup renderer replaced");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn render(&self, kind: LookupKind, lhs: SimpleExpr, rhs: Vec<SimpleExpr>) -> Result<SimpleExpr> {
        let entry = self
            .entries
            .get(kind.name())
            .ok_or_else(|| FesError::UnsupportedLookup(kind.name().to_string()))?;
        if rhs.len() != entry.arity {
            return Err(FesError::Invariant(format!(
                "lookup '{}' expects {} operand(s), got {}",
                kind,
                entry.arity,
                rhs.len()
            )));
        }
        Ok((entry.render)(lhs, rhs))
    }
}

/// Register the lookups FES needs beyond the standard set.
pub fn register_fes_lookups(registry: &mut LookupRegistry) {
    registry.register("fes_like", 1, |l, r| {
        SimpleExpr::Binary(Box::new(l), BinOper::Like, Box::new(first(r)))
    });
    registry.register("fes_ilike", 1, |l, r| {
        SimpleExpr::Binary(
            Box::new(Func::lower(l).into()),
            BinOper::Like,
            Box::new(Func::lower(first(r)).into()),
        )
    });
    registry.register("fes_notequal", 1, |l, r| Expr::expr(l).ne(first(r)));
    registry.register("fes_notwithin", 2, |l, r| st_call("ST_DWithin", l, r).not());
}

fn first(values: Vec<SimpleExpr>) -> SimpleExpr {
    values
        .into_iter()
        .next()
        .unwrap_or(SimpleExpr::Keyword(Keyword::Null))
}

fn st_call(name: &str, lhs: SimpleExpr, rhs: Vec<SimpleExpr>) -> SimpleExpr {
    Func::cust(Alias::new(name)).arg(lhs).args(rhs).into()
}
