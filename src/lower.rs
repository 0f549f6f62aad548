//! Lowering of the AST into a [`FesQuery`].
//!
//! Every expression can be lowered two ways:
//!
//! * `lower_as_value` gives the right-hand side of a comparison: a scalar, a
//!   field reference or a computed value.
//! * `lower_as_subject` gives a name a lookup can be applied to. Field
//!   references are their own name; anything else is bound to a fresh alias
//!   with [`FesQuery::add_annotation`].
//!
//! Operators implement `lower_as_predicate` and return a [`Condition`]. Every
//! comparison goes through [`FesQuery::build_compare`], which merges lookups
//! stashed while its operands were lowered.

use crate::ast::{
    Between, BinaryComparison, BinaryOperator, ComparisonOperator, DistanceSpatial, Expression,
    Filter, FilterPredicate, Function, Geometry, IdOperator, Like, Literal, LiteralValue,
    LogicalOperator, MatchAction, Nil, NonIdOperator, Null, ResourceId, SortBy, SpatialOperand,
    SpatialOperator, BinarySpatial, TemporalOperand, TemporalOperator, TemporalPrimitive,
    ValueReference,
};
use crate::config::FeatureType;
use crate::crs::Reprojector;
use crate::error::{FesError, Result};
use crate::functions::{FunctionRegistry, FUNCTIONS};
use crate::geometry::GeometryValue;
use crate::lookups::LookupKind;
use crate::query::{CompiledQuery, Condition, FesQuery, Scalar, SortKey, Value};

/// Everything lowering needs to know about the target.
#[derive(Clone, Copy)]
pub struct CompileContext<'a> {
    pub feature_type: &'a FeatureType,
    pub functions: &'a FunctionRegistry,
    pub reprojector: Option<&'a dyn Reprojector>,
}

impl<'a> CompileContext<'a> {
    pub fn new(feature_type: &'a FeatureType) -> Self {
        Self {
            feature_type,
            functions: &FUNCTIONS,
            reprojector: None,
        }
    }

    pub fn with_functions(mut self, functions: &'a FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_reprojector(mut self, reprojector: &'a dyn Reprojector) -> Self {
        self.reprojector = Some(reprojector);
        self
    }
}

/// Compile a filter and sort order into an executable plan.
pub fn compile_query(
    ctx: &CompileContext<'_>,
    filter: Option<&Filter>,
    sort_by: Option<&SortBy>,
) -> Result<CompiledQuery> {
    let mut query = FesQuery::new();
    if let Some(filter) = filter {
        let condition = filter.lower_as_predicate(&mut query, ctx)?;
        query.add_lookup(condition)?;
    }
    if let Some(sort_by) = sort_by {
        sort_by.lower(&mut query, ctx)?;
    }
    let compiled = query.finalize()?;
    tracing::debug!(
        feature_type = %ctx.feature_type.name,
        annotations = compiled.annotations.len(),
        lookups = compiled.lookups.len(),
        ordering = compiled.ordering.len(),
        "filter compiled"
    );
    Ok(compiled)
}

impl Filter {
    pub fn compile(&self, ctx: &CompileContext<'_>) -> Result<CompiledQuery> {
        compile_query(ctx, Some(self), None)
    }

    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        match &self.predicate {
            FilterPredicate::Id(ids) => ids.lower_as_predicate(query, ctx),
            FilterPredicate::NonId(operator) => operator.lower_as_predicate(query, ctx),
        }
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

impl Expression {
    pub fn lower_as_value(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Value> {
        match self {
            Expression::Literal(literal) => literal.lower_as_value(ctx),
            Expression::ValueReference(reference) => reference.lower_as_value(query, ctx),
            Expression::Function(function) => function.lower_as_value(query, ctx),
            Expression::Arithmetic(operator) => operator.lower_as_value(query, ctx),
        }
    }

    pub fn lower_as_subject(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<String> {
        match self {
            Expression::ValueReference(reference) => reference.lower_as_subject(query, ctx),
            other => {
                let value = other.lower_as_value(query, ctx)?;
                Ok(query.add_annotation(value))
            }
        }
    }
}

impl Literal {
    pub fn lower_as_value(&self, ctx: &CompileContext<'_>) -> Result<Value> {
        match &self.value {
            LiteralValue::Scalar(scalar) => Ok(Value::Scalar(scalar.clone())),
            LiteralValue::Geometry(geometry) => Ok(Value::Geometry(geometry.resolve(ctx)?)),
        }
    }
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl ValueReference {
    /// The element names of a simple `a/b/c` path, without namespace prefixes.
    pub fn element_path(&self) -> Result<Vec<&str>> {
        self.xpath
            .split('/')
            .map(|segment| {
                let local = segment.rsplit_once(':').map_or(segment, |(_, local)| local);
                if is_identifier(local) {
                    Ok(local)
                } else {
                    Err(FesError::not_implemented(format!(
                        "XPath '{}' is not supported, only simple element paths are",
                        self.xpath
                    )))
                }
            })
            .collect()
    }

    pub fn lower_as_subject(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<String> {
        let segments = self.element_path()?;
        let resolved = ctx.feature_type.resolve_path(&segments);
        for (path, value) in resolved.condition {
            query.stash_extra_lookup(Condition::lookup(path, LookupKind::Exact, value));
        }
        Ok(resolved.path)
    }

    pub fn lower_as_value(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Value> {
        self.lower_as_subject(query, ctx).map(Value::Field)
    }
}

impl Function {
    pub fn lower_as_value(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Value> {
        let def = ctx.functions.resolve(&self.name)?;
        if self.arguments.len() != def.arguments.len() {
            return Err(FesError::parsing(format!(
                "function '{}' takes {} argument(s), got {}",
                def.name,
                def.arguments.len(),
                self.arguments.len()
            )));
        }
        let args = self
            .arguments
            .iter()
            .map(|arg| arg.lower_as_value(query, ctx))
            .collect::<Result<Vec<_>>>()?;
        Ok(def.build(args))
    }

    /// A function used as a filter on its own must return true.
    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        let value = self.lower_as_value(query, ctx)?;
        let alias = query.add_annotation(value);
        Ok(query.build_compare(alias, LookupKind::Exact, Scalar::Boolean(true).into()))
    }
}

impl BinaryOperator {
    pub fn lower_as_value(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Value> {
        Ok(Value::Arithmetic {
            op: self.op,
            lhs: Box::new(self.lhs.lower_as_value(query, ctx)?),
            rhs: Box::new(self.rhs.lower_as_value(query, ctx)?),
        })
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

impl NonIdOperator {
    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        match self {
            NonIdOperator::Comparison(comparison) => comparison.lower_as_predicate(query, ctx),
            NonIdOperator::Spatial(spatial) => spatial.lower_as_predicate(query, ctx),
            NonIdOperator::Temporal(temporal) => temporal.lower_as_predicate(query, ctx),
            NonIdOperator::Logical(logical) => logical.lower_as_predicate(query, ctx),
            NonIdOperator::Function(function) => function.lower_as_predicate(query, ctx),
        }
    }
}

impl ComparisonOperator {
    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        match self {
            ComparisonOperator::Binary(binary) => binary.lower_as_predicate(query, ctx),
            ComparisonOperator::Between(between) => between.lower_as_predicate(query, ctx),
            ComparisonOperator::Like(like) => like.lower_as_predicate(query, ctx),
            ComparisonOperator::Nil(nil) => nil.lower_as_predicate(query, ctx),
            ComparisonOperator::Null(null) => null.lower_as_predicate(query, ctx),
        }
    }
}

impl BinaryComparison {
    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        if self.match_action != MatchAction::Any {
            tracing::warn!(
                operator = self.operator.tag(),
                match_action = ?self.match_action,
                "matchAction is accepted but not applied"
            );
        }

        let mut kind = self.operator.lookup();
        // `<Literal/> < <ValueReference/>` becomes `field > literal`, no alias needed
        let (lhs, rhs) = match (&self.lhs, &self.rhs) {
            (Expression::Literal(_), Expression::ValueReference(_)) => {
                kind = kind.mirrored();
                (&self.rhs, &self.lhs)
            }
            _ => (&self.lhs, &self.rhs),
        };
        if !self.match_case && kind == LookupKind::Exact {
            kind = LookupKind::IExact;
        }

        let subject = lhs.lower_as_subject(query, ctx)?;
        let value = rhs.lower_as_value(query, ctx)?;
        Ok(query.build_compare(subject, kind, value))
    }
}

impl Between {
    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        let subject = self.expression.lower_as_subject(query, ctx)?;
        let lower = self.lower.lower_as_value(query, ctx)?;
        let upper = self.upper.lower_as_value(query, ctx)?;
        Ok(query.build_compare(subject, LookupKind::Range, Value::Tuple(vec![lower, upper])))
    }
}

impl Like {
    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        let pattern = match &self.pattern {
            Expression::Literal(Literal {
                value: LiteralValue::Scalar(_),
                raw,
                ..
            }) => raw.clone(),
            _ => {
                return Err(FesError::parsing(
                    "<PropertyIsLike> only supports a literal pattern",
                ));
            }
        };
        let subject = self.expression.lower_as_subject(query, ctx)?;
        let kind = if self.match_case {
            LookupKind::Like
        } else {
            LookupKind::ILike
        };
        let pattern = self.translate_pattern(&pattern);
        Ok(query.build_compare(subject, kind, Scalar::String(pattern).into()))
    }

    /// Rewrite the client's wildcard characters into SQL `LIKE` syntax.
    pub fn translate_pattern(&self, pattern: &str) -> String {
        let mut out = String::with_capacity(pattern.len() + 4);
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            if c == self.escape_char {
                // a trailing escape has nothing to escape and stands for itself
                push_literal(&mut out, chars.next().unwrap_or(c));
            } else if c == self.wild_card {
                out.push('%');
            } else if c == self.single_char {
                out.push('_');
            } else {
                push_literal(&mut out, c);
            }
        }
        out
    }
}

fn push_literal(out: &mut String, c: char) {
    if matches!(c, '%' | '_' | '\\') {
        out.push('\\');
    }
    out.push(c);
}

impl Nil {
    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        if let Some(reason) = &self.nil_reason {
            return Err(FesError::not_implemented(format!(
                "<PropertyIsNil> with nilReason '{reason}'"
            )));
        }
        let subject = self.expression.lower_as_subject(query, ctx)?;
        Ok(query.build_compare(subject, LookupKind::IsNull, Scalar::Boolean(true).into()))
    }
}

impl Null {
    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        let subject = self.expression.lower_as_subject(query, ctx)?;
        Ok(query.build_compare(subject, LookupKind::IsNull, Scalar::Boolean(true).into()))
    }
}

impl SpatialOperator {
    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        match self {
            SpatialOperator::Binary(binary) => binary.lower_as_predicate(query, ctx),
            SpatialOperator::Distance(distance) => distance.lower_as_predicate(query, ctx),
        }
    }
}

impl BinarySpatial {
    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        let subject = match &self.reference {
            Some(reference) => reference.lower_as_subject(query, ctx)?,
            None => ctx
                .feature_type
                .geometry_field()
                .ok_or_else(|| {
                    FesError::parsing(format!(
                        "<{}> without a <ValueReference> needs a default geometry field, feature type '{}' has none",
                        self.operator.tag(),
                        ctx.feature_type.name
                    ))
                })?
                .to_string(),
        };
        let value = match &self.operand {
            SpatialOperand::Geometry(geometry) => Value::Geometry(geometry.resolve(ctx)?),
            SpatialOperand::Expression(expression) => expression.lower_as_value(query, ctx)?,
        };
        Ok(query.build_compare(subject, self.operator.lookup(), value))
    }
}

impl DistanceSpatial {
    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        let subject = self.reference.lower_as_subject(query, ctx)?;
        let geometry = self.geometry.resolve(ctx)?;
        Ok(query.build_compare(
            subject,
            self.operator.lookup(),
            Value::Tuple(vec![Value::Geometry(geometry), Value::Distance(self.distance)]),
        ))
    }
}

impl TemporalOperator {
    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        match &self.operand {
            TemporalOperand::Primitive(primitive) => primitive.lower_as_value()?,
            TemporalOperand::Expression(expression) => expression.lower_as_value(query, ctx)?,
        };
        Err(FesError::not_implemented(format!(
            "temporal operator <{}>",
            self.operator.tag()
        )))
    }
}

impl TemporalPrimitive {
    pub fn lower_as_value(&self) -> Result<Value> {
        Err(FesError::not_implemented(format!(
            "GML temporal element <{}>",
            self.tag.local
        )))
    }
}

impl LogicalOperator {
    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        let lower_all = |operands: &[NonIdOperator], query: &mut FesQuery| {
            operands
                .iter()
                .map(|operand| operand.lower_as_predicate(query, ctx))
                .collect::<Result<Vec<_>>>()
        };
        let empty = || FesError::Invariant("logical operator without operands".to_string());
        match self {
            LogicalOperator::And(operands) => Condition::all(lower_all(operands, query)?).ok_or_else(empty),
            LogicalOperator::Or(operands) => Condition::any(lower_all(operands, query)?).ok_or_else(empty),
            LogicalOperator::Not(operand) => Ok(operand.lower_as_predicate(query, ctx)?.negate()),
        }
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

impl ResourceId {
    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        let unsupported = [
            ("previousRid", &self.previous_rid),
            ("version", &self.version),
            ("startDate", &self.start_date),
            ("endDate", &self.end_date),
        ];
        if let Some((name, _)) = unsupported.iter().find(|(_, value)| value.is_some()) {
            return Err(FesError::not_implemented(format!(
                "<ResourceId> attribute '{name}'"
            )));
        }
        Ok(query.build_compare(
            ctx.feature_type.primary_key.clone(),
            LookupKind::Exact,
            Scalar::infer(self.id()).into(),
        ))
    }
}

impl IdOperator {
    pub fn lower_as_predicate(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<Condition> {
        let conditions = self
            .ids
            .iter()
            .map(|rid| rid.lower_as_predicate(query, ctx))
            .collect::<Result<Vec<_>>>()?;
        Condition::any(conditions)
            .ok_or_else(|| FesError::Invariant("resource id list without identifiers".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Sorting and geometry
// ---------------------------------------------------------------------------

impl SortBy {
    pub fn lower(&self, query: &mut FesQuery, ctx: &CompileContext<'_>) -> Result<()> {
        let mut keys = Vec::with_capacity(self.properties.len());
        for property in &self.properties {
            let segments = property.value_reference.element_path()?;
            let resolved = ctx.feature_type.resolve_path(&segments);
            if !resolved.condition.is_empty() {
                return Err(FesError::not_implemented(format!(
                    "sorting on '{}', which only exists under a condition",
                    property.value_reference.xpath
                )));
            }
            keys.push(SortKey {
                path: resolved.path,
                descending: property.descending,
            });
        }
        query.add_sort(keys);
        Ok(())
    }
}

impl Geometry {
    /// Resolve the reference system against the feature type, reprojecting
    /// when the geometry is written in one of its alternative systems.
    pub fn resolve(&self, ctx: &CompileContext<'_>) -> Result<GeometryValue> {
        let feature_type = ctx.feature_type;
        let failure = |reason: String| FesError::CrsResolution {
            locator: self.locator.clone(),
            reason,
        };

        let Some(default) = feature_type.crs.as_ref() else {
            return match &self.crs {
                Some(crs) => Ok(self.value.clone().with_srid(crs.srid())),
                None => Err(failure(format!(
                    "no reference system given and feature type '{}' declares no default",
                    feature_type.name
                ))),
            };
        };

        let crs = match &self.crs {
            None => return Ok(self.value.clone().with_srid(default.srid())),
            Some(crs) if crs == default => return Ok(self.value.clone().with_srid(default.srid())),
            Some(crs) => crs,
        };

        if !feature_type.other_crs.contains(crs) {
            return Err(failure(format!(
                "{} is not supported by feature type '{}'",
                crs, feature_type.name
            )));
        }
        let reprojector = ctx
            .reprojector
            .ok_or_else(|| failure(format!("no reprojection available from {crs} to {default}")))?;
        tracing::debug!(locator = %self.locator, from = %crs, to = %default, "reprojecting geometry");
        let source = self.value.clone().with_srid(crs.srid());
        Ok(reprojector.reproject(&source, crs, default)?.with_srid(default.srid()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryComparisonName, DistanceOperatorName, SpatialOperatorName};
    use crate::config::FieldMapping;
    use crate::crs::Crs;
    use crate::geometry::Shape;
    use geo_types::point;
    use crate::gml::{Distance, DistanceUnit};
    use crate::query::ArithmeticOp;
    use std::collections::BTreeMap;

    fn feature_type() -> FeatureType {
        FeatureType::new("Feature")
            .with_crs(Crs::from_srid(28992))
            .with_other_crs(Crs::from_srid(4326))
            .with_geometry_field("geometry")
            .with_field(
                "phone",
                FieldMapping {
                    path: "contacts__value".into(),
                    condition: BTreeMap::from([("contacts__kind".into(), Scalar::String("phone".into()))]),
                },
            )
    }

    fn field(xpath: &str) -> Expression {
        Expression::ValueReference(ValueReference::new(xpath))
    }

    fn literal(value: Scalar) -> Expression {
        Expression::Literal(Literal::new(value))
    }

    fn compare(operator: BinaryComparisonName, lhs: Expression, rhs: Expression) -> Filter {
        Filter {
            predicate: FilterPredicate::NonId(NonIdOperator::Comparison(ComparisonOperator::Binary(
                BinaryComparison {
                    operator,
                    lhs,
                    rhs,
                    match_case: true,
                    match_action: MatchAction::Any,
                },
            ))),
        }
    }

    fn point(crs: Option<Crs>) -> Geometry {
        Geometry {
            value: GeometryValue::new(point!(x: 1.0, y: 2.0), crs.as_ref().map(Crs::srid)),
            crs,
            locator: "bbox".into(),
        }
    }

    struct Shift;

    impl Reprojector for Shift {
        fn reproject(&self, geometry: &GeometryValue, _: &Crs, _: &Crs) -> Result<GeometryValue> {
            let mut out = geometry.clone();
            if let Shape::Point(p) = &mut out.shape {
                p.0.x += 100.0;
            }
            Ok(out)
        }
    }

    #[test]
    fn test_literal_on_left_is_mirrored() {
        let ft = feature_type();
        let ctx = CompileContext::new(&ft);
        let filter = compare(BinaryComparisonName::LessThan, literal(Scalar::Integer(30)), field("DEPTH"));
        let plan = filter.compile(&ctx).unwrap();
        assert!(plan.annotations.is_empty());
        assert_eq!(plan.lookups, vec![Condition::lookup("DEPTH", LookupKind::Gt, Scalar::Integer(30))]);
    }

    #[test]
    fn test_literal_subject_gets_alias() {
        let ft = feature_type();
        let ctx = CompileContext::new(&ft);
        let filter = compare(BinaryComparisonName::EqualTo, literal(Scalar::Integer(1)), literal(Scalar::Integer(1)));
        let plan = filter.compile(&ctx).unwrap();
        assert_eq!(plan.annotation("@a1"), Some(&Value::Scalar(Scalar::Integer(1))));
        assert_eq!(plan.lookups[0].to_string(), "@a1__exact = 1");
    }

    #[test]
    fn test_case_insensitive_equality() {
        let ft = feature_type();
        let ctx = CompileContext::new(&ft);
        let mut filter = compare(BinaryComparisonName::EqualTo, field("name"), literal(Scalar::String("x".into())));
        if let FilterPredicate::NonId(NonIdOperator::Comparison(ComparisonOperator::Binary(b))) = &mut filter.predicate {
            b.match_case = false;
        }
        let plan = filter.compile(&ctx).unwrap();
        assert_eq!(plan.lookups[0].to_string(), "name__iexact = \"x\"");
    }

    #[test]
    fn test_mapped_field_condition_is_stashed_and_consumed() {
        let ft = feature_type();
        let ctx = CompileContext::new(&ft);
        let filter = compare(BinaryComparisonName::EqualTo, field("phone"), literal(Scalar::String("123".into())));
        let plan = filter.compile(&ctx).unwrap();
        assert_eq!(
            plan.lookups,
            vec![Condition::And(vec![
                Condition::lookup("contacts__value", LookupKind::Exact, Scalar::String("123".into())),
                Condition::lookup("contacts__kind", LookupKind::Exact, Scalar::String("phone".into())),
            ])]
        );
    }

    #[test]
    fn test_complex_xpath_is_not_implemented() {
        let ft = feature_type();
        let ctx = CompileContext::new(&ft);
        let filter = compare(
            BinaryComparisonName::EqualTo,
            field("contacts[@kind='phone']/value"),
            literal(Scalar::Integer(1)),
        );
        let err = filter.compile(&ctx).unwrap_err();
        assert!(matches!(err, FesError::NotImplemented(ref m) if m.contains("not supported")));

        let nested = ValueReference::new("app:address/app:city");
        assert_eq!(nested.element_path().unwrap(), vec!["address", "city"]);
    }

    #[test]
    fn test_unknown_function_names_it() {
        let ft = feature_type();
        let ctx = CompileContext::new(&ft);
        let function = Expression::Function(Function {
            name: "frobnicate".into(),
            arguments: vec![],
        });
        let filter = compare(BinaryComparisonName::EqualTo, function, literal(Scalar::Integer(1)));
        assert_eq!(
            filter.compile(&ctx).unwrap_err(),
            FesError::UnsupportedFunction("frobnicate".into())
        );
    }

    #[test]
    fn test_function_arity_is_checked() {
        let ft = feature_type();
        let ctx = CompileContext::new(&ft);
        let call = |name: &str, arguments: Vec<Expression>| {
            Expression::Function(Function {
                name: name.into(),
                arguments,
            })
        };
        for function in [call("SIN", vec![]), call("atan2", vec![field("y")])] {
            let filter = compare(BinaryComparisonName::EqualTo, function, literal(Scalar::Integer(1)));
            let err = filter.compile(&ctx).unwrap_err();
            assert!(matches!(err, FesError::ExternalParsing(ref m) if m.contains("argument")), "{err}");
        }
        let pi = call("pi", vec![]);
        assert!(compare(BinaryComparisonName::GreaterThan, pi, literal(Scalar::Integer(3)))
            .compile(&ctx)
            .is_ok());
    }

    #[test]
    fn test_arithmetic_value() {
        let ft = feature_type();
        let ctx = CompileContext::new(&ft);
        let add = Expression::Arithmetic(BinaryOperator {
            op: ArithmeticOp::Add,
            lhs: Box::new(field("PROPB")),
            rhs: Box::new(literal(Scalar::Integer(100))),
        });
        let plan = compare(BinaryComparisonName::EqualTo, field("PROPA"), add).compile(&ctx).unwrap();
        assert_eq!(plan.lookups[0].to_string(), "PROPA__exact = F(PROPB) + 100");
    }

    #[test]
    fn test_like_pattern_translation() {
        let like = Like {
            expression: field("name"),
            pattern: literal(Scalar::String("10%_J*!*.x".into())),
            wild_card: '*',
            single_char: '.',
            escape_char: '!',
            match_case: false,
        };
        assert_eq!(like.translate_pattern("10%_J*!*.x"), r"10\%\_J%*_x");
        assert_eq!(like.translate_pattern("J*!"), "J%!");
        assert_eq!(like.translate_pattern("!!"), "!");

        let ft = feature_type();
        let ctx = CompileContext::new(&ft);
        let mut query = FesQuery::new();
        let condition = like.lower_as_predicate(&mut query, &ctx).unwrap();
        assert_eq!(
            condition,
            Condition::lookup("name", LookupKind::ILike, Scalar::String(r"10\%\_J%*_x".into()))
        );
    }

    #[test]
    fn test_nil_reason_is_not_implemented() {
        let ft = feature_type();
        let ctx = CompileContext::new(&ft);
        let nil = Nil {
            expression: field("name"),
            nil_reason: Some("missing".into()),
        };
        let err = nil.lower_as_predicate(&mut FesQuery::new(), &ctx).unwrap_err();
        assert!(matches!(err, FesError::NotImplemented(_)));
    }

    #[test]
    fn test_resource_id_version_is_not_implemented() {
        let ft = feature_type();
        let ctx = CompileContext::new(&ft);
        let mut rid = ResourceId::new("Feature.1");
        rid.version = Some("2".into());
        let err = rid.lower_as_predicate(&mut FesQuery::new(), &ctx).unwrap_err();
        assert_eq!(err, FesError::NotImplemented("<ResourceId> attribute 'version'".into()));
    }

    #[test]
    fn test_bbox_defaults_to_geometry_field_and_crs() {
        let ft = feature_type();
        let ctx = CompileContext::new(&ft);
        let bbox = BinarySpatial {
            operator: SpatialOperatorName::BBox,
            reference: None,
            operand: SpatialOperand::Geometry(point(None)),
        };
        let condition = bbox.lower_as_predicate(&mut FesQuery::new(), &ctx).unwrap();
        let Condition::Lookup(lookup) = condition else {
            panic!("expected a single lookup");
        };
        assert_eq!(lookup.subject, "geometry");
        assert_eq!(lookup.kind, LookupKind::Intersects);
        assert!(matches!(lookup.value, Value::Geometry(ref g) if g.srid == Some(28992)));

        let no_geometry = FeatureType::new("Plain");
        let ctx = CompileContext::new(&no_geometry);
        assert!(bbox.lower_as_predicate(&mut FesQuery::new(), &ctx).is_err());
    }

    #[test]
    fn test_crs_resolution() {
        let ft = feature_type();
        let ctx = CompileContext::new(&ft);

        // deferred CRS is taken from the feature type
        let resolved = point(None).resolve(&ctx).unwrap();
        assert_eq!(resolved.srid, Some(28992));

        // unknown CRS
        let err = point(Some(Crs::from_srid(3857))).resolve(&ctx).unwrap_err();
        assert!(matches!(err, FesError::CrsResolution { ref locator, .. } if locator == "bbox"));

        // alternative CRS without reprojector
        let err = point(Some(Crs::from_srid(4326))).resolve(&ctx).unwrap_err();
        assert!(err.to_string().contains("no reprojection available"));

        // alternative CRS with reprojector
        let shift = Shift;
        let ctx = ctx.with_reprojector(&shift);
        let resolved = point(Some(Crs::from_srid(4326))).resolve(&ctx).unwrap();
        assert_eq!(resolved.srid, Some(28992));
        assert_eq!(resolved.shape, Shape::Point(point!(x: 101.0, y: 2.0)));

        // no default anywhere
        let bare = FeatureType::new("Plain");
        let err = point(None).resolve(&CompileContext::new(&bare)).unwrap_err();
        assert!(matches!(err, FesError::CrsResolution { .. }));
    }

    #[test]
    fn test_dwithin_passes_geometry_and_distance() {
        let ft = feature_type();
        let ctx = CompileContext::new(&ft);
        let dwithin = DistanceSpatial {
            operator: DistanceOperatorName::Beyond,
            reference: ValueReference::new("geometry"),
            geometry: point(Some(Crs::from_srid(28992))),
            distance: Distance::new(10.0, DistanceUnit::Metre),
        };
        let condition = dwithin.lower_as_predicate(&mut FesQuery::new(), &ctx).unwrap();
        assert_eq!(condition.to_string(), "geometry__fes_notwithin = (SRID=28992;POINT (1 2), 10 m)");
    }

    #[test]
    fn test_sort_on_conditional_field_fails() {
        let ft = feature_type();
        let ctx = CompileContext::new(&ft);
        let sort_by = SortBy {
            properties: vec![crate::ast::SortProperty {
                value_reference: ValueReference::new("phone"),
                descending: false,
            }],
        };
        let err = compile_query(&ctx, None, Some(&sort_by)).unwrap_err();
        assert!(matches!(err, FesError::NotImplemented(_)));

        let sort_by = SortBy {
            properties: vec![crate::ast::SortProperty {
                value_reference: ValueReference::new("name"),
                descending: true,
            }],
        };
        let plan = compile_query(&ctx, None, Some(&sort_by)).unwrap();
        assert_eq!(plan.ordering, vec![SortKey::desc("name")]);
        assert!(plan.lookups.is_empty());
    }
}
