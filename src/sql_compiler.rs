//! SQL compiler that renders a compiled filter plan as a PostgreSQL/PostGIS query using sea-query.
//!
//! This is the reference executor for [`CompiledQuery`]: annotations become
//! `expr AS alias` projections, lookups become the `WHERE` clause and the
//! ordering becomes `ORDER BY`. A lookup subject that names an annotation is
//! replaced by the annotated expression itself.

use sea_query::{Alias, Asterisk, BinOper, Expr, Func, Iden, Keyword, Order, PostgresQueryBuilder, SelectStatement, SimpleExpr};

use crate::config::FeatureType;
use crate::error::{FesError, Result};
use crate::lookups::{LookupKind, LookupRegistry};
use crate::query::{ArithmeticOp, CompiledQuery, Condition, Lookup, Scalar, Value};

/// Configuration for SQL optimization
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    /// Minimum number of OR-ed equality lookups on one column before converting to an IN clause
    pub max_or_conditions_for_in: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_or_conditions_for_in: 3,
        }
    }
}

/// Table identifier wrapper
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub String);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        let _ = s.write_str(&self.0);
    }
}

/// Represents an optimization applied during compilation
#[derive(Debug, Clone, PartialEq)]
pub enum Optimization {
    OrToIn { field: String, value_count: usize },
}

/// Result of SQL compilation
#[derive(Debug)]
pub struct CompileResult {
    pub sql: String,
    /// The FES specific lookups the query relies on
    pub custom_lookups: Vec<LookupKind>,
    pub optimizations: Vec<Optimization>,
}

/// Renders compiled plans into SQL
pub struct SqlCompiler {
    config: OptimizationConfig,
    lookups: LookupRegistry,
}

impl Default for SqlCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlCompiler {
    /// Compiler with the built-in lookups plus the FES specific ones.
    pub fn new() -> Self {
        Self::with_lookups(LookupRegistry::with_fes_lookups())
    }

    pub fn with_lookups(lookups: LookupRegistry) -> Self {
        Self {
            config: OptimizationConfig::default(),
            lookups,
        }
    }

    pub fn with_config(mut self, config: OptimizationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn lookups_mut(&mut self) -> &mut LookupRegistry {
        &mut self.lookups
    }

    /// Render the plan as a SELECT on the feature type's table.
    pub fn compile(&self, plan: &CompiledQuery, feature_type: &FeatureType) -> Result<CompileResult> {
        let mut state = RenderState::default();

        let mut select = SelectStatement::new();
        select.column(Asterisk);
        select.from(TableName(feature_type.table_name()));

        for annotation in &plan.annotations {
            let expr = self.compile_value(&annotation.value, plan)?;
            select.expr_as(expr, Alias::new(annotation.alias.as_str()));
        }
        for condition in &plan.lookups {
            let expr = self.compile_condition(condition, plan, &mut state)?;
            select.and_where(expr);
        }
        for key in &plan.ordering {
            let order = if key.descending { Order::Desc } else { Order::Asc };
            select.order_by_expr(self.compile_subject(&key.path, plan)?, order);
        }

        let sql = select.to_string(PostgresQueryBuilder);
        tracing::debug!(table = %feature_type.table_name(), sql = %sql, "plan rendered");
        Ok(CompileResult {
            sql,
            custom_lookups: state.custom_lookups,
            optimizations: state.optimizations,
        })
    }

    fn compile_condition(&self, condition: &Condition, plan: &CompiledQuery, state: &mut RenderState) -> Result<SimpleExpr> {
        let expr = match condition {
            Condition::Lookup(lookup) => self.compile_lookup(lookup, plan, state)?,
            Condition::And(items) => self
                .compile_all(items, plan, state)?
                .into_iter()
                .reduce(|acc, expr| acc.and(expr))
                .unwrap_or_else(|| Expr::val(true).into()),
            Condition::Or(items) => {
                if let Some(in_expr) = self.try_optimize_or_to_in(items, plan, state)? {
                    in_expr
                } else {
                    self.compile_all(items, plan, state)?
                        .into_iter()
                        .reduce(|acc, expr| acc.or(expr))
                        .unwrap_or_else(|| Expr::val(false).into())
                }
            }
            Condition::Not(inner) => self.compile_condition(inner, plan, state)?.not(),
        };
        Ok(expr)
    }

    fn compile_all(&self, items: &[Condition], plan: &CompiledQuery, state: &mut RenderState) -> Result<Vec<SimpleExpr>> {
        items
            .iter()
            .map(|item| self.compile_condition(item, plan, state))
            .collect()
    }

    fn compile_lookup(&self, lookup: &Lookup, plan: &CompiledQuery, state: &mut RenderState) -> Result<SimpleExpr> {
        let lhs = self.compile_subject(&lookup.subject, plan)?;
        let rhs = lookup
            .value
            .operands()
            .into_iter()
            .map(|value| self.compile_value(value, plan))
            .collect::<Result<Vec<_>>>()?;
        let expr = self.lookups.render(lookup.kind, lhs, rhs)?;
        if lookup.kind.is_custom() && !state.custom_lookups.contains(&lookup.kind) {
            state.custom_lookups.push(lookup.kind);
        }
        Ok(expr)
    }

    /// Try to turn `a = 1 OR a = 2 OR a = 3` into `a IN (1, 2, 3)`
    fn try_optimize_or_to_in(&self, items: &[Condition], plan: &CompiledQuery, state: &mut RenderState) -> Result<Option<SimpleExpr>> {
        if items.len() < self.config.max_or_conditions_for_in {
            return Ok(None);
        }
        let mut subject = None;
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            let Condition::Lookup(Lookup {
                subject: field,
                kind: LookupKind::Exact,
                value: Value::Scalar(scalar),
            }) = item
            else {
                return Ok(None);
            };
            if matches!(scalar, Scalar::Null) || subject.is_some_and(|s: &String| s != field) {
                return Ok(None);
            }
            subject = Some(field);
            values.push(scalar_expr(scalar));
        }
        let Some(field) = subject else {
            return Ok(None);
        };
        state.optimizations.push(Optimization::OrToIn {
            field: field.clone(),
            value_count: values.len(),
        });
        Ok(Some(Expr::expr(self.compile_subject(field, plan)?).is_in(values)))
    }

    /// Annotation aliases are inlined, anything else is a column
    fn compile_subject(&self, subject: &str, plan: &CompiledQuery) -> Result<SimpleExpr> {
        match plan.annotation(subject) {
            Some(value) => self.compile_value(value, plan),
            None => Ok(column(subject)),
        }
    }

    fn compile_value(&self, value: &Value, plan: &CompiledQuery) -> Result<SimpleExpr> {
        let expr = match value {
            Value::Scalar(scalar) => scalar_expr(scalar),
            Value::Field(path) => self.compile_subject(path, plan)?,
            Value::Function { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.compile_value(arg, plan))
                    .collect::<Result<Vec<_>>>()?;
                Func::cust(Alias::new(name.as_str())).args(args).into()
            }
            Value::Arithmetic { op, lhs, rhs } => {
                let oper = match op {
                    ArithmeticOp::Add => BinOper::Add,
                    ArithmeticOp::Sub => BinOper::Sub,
                    ArithmeticOp::Mul => BinOper::Mul,
                    ArithmeticOp::Div => BinOper::Div,
                };
                SimpleExpr::Binary(
                    Box::new(self.compile_value(lhs, plan)?),
                    oper,
                    Box::new(self.compile_value(rhs, plan)?),
                )
            }
            Value::Geometry(geometry) => {
                let mut args: Vec<SimpleExpr> = vec![Expr::val(geometry.wkt()).into()];
                if let Some(srid) = geometry.srid {
                    args.push(Expr::val(srid).into());
                }
                Func::cust(Alias::new("ST_GeomFromText")).args(args).into()
            }
            // linear units in metres, degrees as given
            Value::Distance(distance) => Expr::val(distance.to_metres().unwrap_or(distance.value)).into(),
            Value::Tuple(_) => {
                return Err(FesError::Invariant(format!(
                    "operand tuple {value} can only appear as a lookup value"
                )));
            }
        };
        Ok(expr)
    }
}

#[derive(Default)]
struct RenderState {
    custom_lookups: Vec<LookupKind>,
    optimizations: Vec<Optimization>,
}

fn scalar_expr(scalar: &Scalar) -> SimpleExpr {
    match scalar {
        Scalar::Null => SimpleExpr::Keyword(Keyword::Null),
        Scalar::Boolean(b) => Expr::val(*b).into(),
        Scalar::Integer(i) => Expr::val(*i).into(),
        Scalar::Float(f) => Expr::val(*f).into(),
        Scalar::String(s) => Expr::val(s.as_str()).into(),
    }
}

/// `a__b__c` is column `c` of relation `b`
fn column(path: &str) -> SimpleExpr {
    match path.rsplit_once("__") {
        Some((relations, name)) => {
            let relation = relations.rsplit("__").next().unwrap_or(relations);
            Expr::col((ColumnName(relation.to_string()), ColumnName(name.to_string()))).into()
        }
        None => Expr::col(ColumnName(path.to_string())).into(),
    }
}
