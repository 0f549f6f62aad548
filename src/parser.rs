//! FES 2.0 语法分析器
//!
//! ## 解析流程图
//!
//! ```text
//! parse_fes(text)
//!   ├─ inject_default_namespaces()      没有 xmlns 时补上 FES/GML 命名空间
//!   ├─ parse_document()                 roxmltree, 禁用 DTD
//!   └─ Parser::dispatch(root, [Root])
//!        └─ TagRegistry::resolve(QName) → 产生式函数
//!             ├─ Filter      → 每个子元素 dispatch([Predicate, Identifier])
//!             │                 ├─ 全部是 ResourceId → IdOperator
//!             │                 └─ 恰好一个谓词       → NonIdOperator
//!             ├─ 比较运算     → dispatch([Expression]) × N
//!             ├─ 空间运算     → ValueReference + dispatch([Geometry, Expression])
//!             ├─ 时间运算     → ValueReference + dispatch([TemporalPrimitive, Expression])
//!             └─ 逻辑运算     → dispatch([Predicate]) × N (递归)
//! ```
//!
//! 每个产生式只检查自己的子元素个数与类型, 子元素的解析全部经由标签注册表分派,
//! 因此新增一个标签只需要在 `register_fes_tags` 中注册即可。

use roxmltree::Node;

use crate::ast::{
    AstNode, Between, BinaryComparison, BinaryComparisonName, BinaryOperator, BinarySpatial,
    ComparisonOperator, DistanceOperatorName, DistanceSpatial, Expression, Filter,
    FilterPredicate, Function, Geometry, IdOperator, Like, Literal, LiteralValue,
    LogicalOperator, MatchAction, Nil, NonIdOperator, Null, ResourceId, SortBy, SortProperty,
    SpatialOperand, SpatialOperator, SpatialOperatorName, TemporalOperand, TemporalOperator,
    TemporalOperatorName, ValueReference,
};
use crate::error::{FesError, Result};
use crate::gml::Distance;
use crate::query::{ArithmeticOp, Scalar};
use crate::registry::{Capability, TagEntry, TagRegistry, TAGS};
use crate::xml::{decode, inject_default_namespaces, parse_document, ElementExt, QName, FES20, XSD};

const ROOT: &[Capability] = &[Capability::Root];
const EXPRESSION: &[Capability] = &[Capability::Expression];
const PREDICATE: &[Capability] = &[Capability::Predicate];
const IDENTIFIER: &[Capability] = &[Capability::Identifier];
const FUNCTION: &[Capability] = &[Capability::Expression, Capability::Predicate];

/// 注册 FES 2.0 的全部产生式
pub fn register_fes_tags(registry: &mut TagRegistry) -> Result<()> {
    registry.register(FES20, "Filter", TagEntry::new("Filter", ROOT, parse_filter_node))?;
    registry.register(FES20, "SortBy", TagEntry::new("SortBy", ROOT, parse_sort_by_node))?;

    // 表达式
    registry.register(FES20, "Literal", TagEntry::new("Literal", EXPRESSION, parse_literal))?;
    registry.register(
        FES20,
        "ValueReference",
        TagEntry::new("ValueReference", EXPRESSION, parse_value_reference),
    )?;
    registry.register(FES20, "Function", TagEntry::new("Function", FUNCTION, parse_function))?;
    for tag in ["Add", "Sub", "Mul", "Div"] {
        registry.register(FES20, tag, TagEntry::new("BinaryOperator", EXPRESSION, parse_arithmetic))?;
    }

    // 比较运算
    for name in BinaryComparisonName::ALL {
        registry.register(
            FES20,
            name.tag(),
            TagEntry::new("BinaryComparisonOperator", PREDICATE, parse_binary_comparison),
        )?;
    }
    registry.register(FES20, "PropertyIsBetween", TagEntry::new("Between", PREDICATE, parse_between))?;
    registry.register(FES20, "PropertyIsLike", TagEntry::new("Like", PREDICATE, parse_like))?;
    registry.register(FES20, "PropertyIsNil", TagEntry::new("Nil", PREDICATE, parse_nil))?;
    registry.register(FES20, "PropertyIsNull", TagEntry::new("Null", PREDICATE, parse_null))?;

    // 空间与时间运算
    for name in SpatialOperatorName::ALL {
        registry.register(
            FES20,
            name.tag(),
            TagEntry::new("BinarySpatialOperator", PREDICATE, parse_binary_spatial),
        )?;
    }
    for name in DistanceOperatorName::ALL {
        registry.register(
            FES20,
            name.tag(),
            TagEntry::new("DistanceOperator", PREDICATE, parse_distance_operator),
        )?;
    }
    for name in TemporalOperatorName::ALL {
        registry.register(
            FES20,
            name.tag(),
            TagEntry::new("TemporalOperator", PREDICATE, parse_temporal_operator),
        )?;
    }

    // 逻辑运算
    registry.register(FES20, "And", TagEntry::new("BinaryLogicOperator", PREDICATE, parse_binary_logic))?;
    registry.register(FES20, "Or", TagEntry::new("BinaryLogicOperator", PREDICATE, parse_binary_logic))?;
    registry.register(FES20, "Not", TagEntry::new("UnaryLogicOperator", PREDICATE, parse_not))?;

    registry.register(FES20, "ResourceId", TagEntry::new("ResourceId", IDENTIFIER, parse_resource_id))?;
    Ok(())
}

/// 解析没有声明命名空间也能接受的 Filter 文本
pub fn parse_fes(text: &str) -> Result<Filter> {
    Parser::default().parse_filter(&inject_default_namespaces(text))
}

/// Parse a raw request body.
pub fn parse_fes_bytes(bytes: &[u8]) -> Result<Filter> {
    parse_fes(decode(bytes)?)
}

impl Filter {
    pub fn from_xml(text: &str) -> Result<Self> {
        parse_fes(text)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        parse_fes_bytes(bytes)
    }
}

impl SortBy {
    pub fn from_xml(text: &str) -> Result<Self> {
        Parser::default().parse_sort_by(&inject_default_namespaces(text))
    }
}

/// 基于标签注册表的递归下降解析器
#[derive(Debug, Clone, Copy)]
pub struct Parser<'r> {
    registry: &'r TagRegistry,
}

impl Default for Parser<'static> {
    fn default() -> Self {
        Parser::new(&TAGS)
    }
}

impl<'r> Parser<'r> {
    pub fn new(registry: &'r TagRegistry) -> Self {
        Self { registry }
    }

    /// 解析 `<fes:Filter>` 文档
    pub fn parse_filter(&self, text: &str) -> Result<Filter> {
        let doc = parse_document(text)?;
        let root = doc.root_element();
        match self.dispatch(root, ROOT)? {
            AstNode::Filter(filter) => Ok(filter),
            _ => Err(unexpected(root, "<Filter>")),
        }
    }

    /// 解析 `<fes:SortBy>` 文档
    pub fn parse_sort_by(&self, text: &str) -> Result<SortBy> {
        let doc = parse_document(text)?;
        let root = doc.root_element();
        match self.dispatch(root, ROOT)? {
            AstNode::SortBy(sort_by) => Ok(sort_by),
            _ => Err(unexpected(root, "<SortBy>")),
        }
    }

    pub fn dispatch(&self, el: Node<'_, '_>, allowed: &[Capability]) -> Result<AstNode> {
        self.registry.dispatch(self, el, allowed)
    }

    pub fn expression(&self, el: Node<'_, '_>) -> Result<Expression> {
        match self.dispatch(el, EXPRESSION)? {
            AstNode::Expression(expression) => Ok(expression),
            other => Err(wrong_kind(el, &other)),
        }
    }

    /// 运算符或作为谓词使用的函数
    pub fn predicate(&self, el: Node<'_, '_>) -> Result<NonIdOperator> {
        let node = self.dispatch(el, PREDICATE)?;
        into_predicate(el, node)
    }

    pub fn geometry(&self, el: Node<'_, '_>) -> Result<Geometry> {
        match self.dispatch(el, &[Capability::Geometry])? {
            AstNode::Geometry(geometry) => Ok(geometry),
            other => Err(wrong_kind(el, &other)),
        }
    }

    pub fn value_reference(&self, el: Node<'_, '_>) -> Result<ValueReference> {
        if !is_fes(el, "ValueReference") {
            return Err(unexpected(el, "<ValueReference>"));
        }
        value_reference(el)
    }

    /// 恰好 N 个表达式子元素
    fn expressions<const N: usize>(&self, el: Node<'_, '_>) -> Result<[Expression; N]> {
        let children = el.child_elements();
        if children.len() != N {
            return Err(FesError::parsing(format!(
                "{} expects {} expression(s), found {}",
                el.describe(),
                N,
                children.len()
            )));
        }
        let parsed = children
            .into_iter()
            .map(|child| self.expression(child))
            .collect::<Result<Vec<_>>>()?;
        parsed
            .try_into()
            .map_err(|_| FesError::Invariant(format!("{} lost an operand", el.describe())))
    }
}

// ---------------------------------------------------------------------------
// 辅助函数
// ---------------------------------------------------------------------------

fn is_fes(el: Node<'_, '_>, local: &str) -> bool {
    el.tag_name().namespace() == Some(FES20) && el.tag_name().name() == local
}

fn unexpected(el: Node<'_, '_>, expected: &str) -> FesError {
    FesError::UnexpectedNode {
        found: el.describe(),
        expected: expected.to_string(),
    }
}

/// 注册表已检查过能力, 走到这里说明产生式返回了与其声明不符的节点
fn wrong_kind(el: Node<'_, '_>, node: &AstNode) -> FesError {
    FesError::Invariant(format!(
        "{} produced a {} node that does not match its capabilities",
        el.describe(),
        node.kind_name()
    ))
}

fn into_predicate(el: Node<'_, '_>, node: AstNode) -> Result<NonIdOperator> {
    match node {
        AstNode::Operator(operator) => Ok(operator),
        AstNode::Expression(Expression::Function(function)) => Ok(NonIdOperator::Function(function)),
        other => Err(wrong_kind(el, &other)),
    }
}

fn bool_attr(el: Node<'_, '_>, name: &str, default: bool) -> Result<bool> {
    match el.attr(name) {
        None => Ok(default),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(FesError::parsing(format!(
            "{} has invalid boolean '{}' for '{}'",
            el.describe(),
            other,
            name
        ))),
    }
}

/// 单字符属性, 第一个名称为标准名称, 其余为兼容的旧名称
fn char_attr(el: Node<'_, '_>, names: &[&str]) -> Result<char> {
    let value = names
        .iter()
        .find_map(|name| el.attr(name))
        .map_or_else(|| el.required_attr(names[0]), Ok)?;
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(FesError::parsing(format!(
            "{} attribute '{}' must be a single character, got '{}'",
            el.describe(),
            names[0],
            value
        ))),
    }
}

/// 按声明的 XML Schema 类型转换字面量文本, 未声明类型时自动推断
fn cast_literal(el: Node<'_, '_>, text: &str, type_name: Option<&QName>) -> Result<Scalar> {
    let Some(type_name) = type_name else {
        return Ok(Scalar::infer(text));
    };
    if type_name.namespace != XSD {
        return Ok(Scalar::String(text.to_string()));
    }
    let invalid = || {
        FesError::parsing(format!(
            "{} value '{}' is not a valid xs:{}",
            el.describe(),
            text,
            type_name.local
        ))
    };
    match type_name.local.as_str() {
        "integer" | "int" | "long" | "short" | "byte" | "nonNegativeInteger" | "positiveInteger"
        | "negativeInteger" | "nonPositiveInteger" | "unsignedLong" | "unsignedInt"
        | "unsignedShort" | "unsignedByte" => {
            text.parse::<i64>().map(Scalar::Integer).map_err(|_| invalid())
        }
        "double" | "float" | "decimal" => text.parse::<f64>().map(Scalar::Float).map_err(|_| invalid()),
        "boolean" => match text {
            "true" | "1" => Ok(Scalar::Boolean(true)),
            "false" | "0" => Ok(Scalar::Boolean(false)),
            _ => Err(invalid()),
        },
        _ => Ok(Scalar::String(text.to_string())),
    }
}

fn value_reference(el: Node<'_, '_>) -> Result<ValueReference> {
    let xpath = el.text_value();
    if xpath.is_empty() {
        return Err(FesError::parsing(format!("{} is empty", el.describe())));
    }
    Ok(ValueReference::new(&xpath))
}

// ---------------------------------------------------------------------------
// 产生式
// ---------------------------------------------------------------------------

fn parse_filter_node(parser: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let mut ids = Vec::new();
    let mut predicates = Vec::new();
    for child in el.child_elements() {
        match parser.dispatch(child, &[Capability::Predicate, Capability::Identifier])? {
            AstNode::ResourceId(rid) => ids.push(rid),
            node => predicates.push(into_predicate(child, node)?),
        }
    }

    let predicate = match (ids.is_empty(), predicates.pop()) {
        (false, None) => FilterPredicate::Id(IdOperator { ids }),
        (true, Some(predicate)) if predicates.is_empty() => FilterPredicate::NonId(predicate),
        (true, Some(_)) => {
            return Err(FesError::parsing(format!(
                "<Filter> must contain exactly one predicate, found {}; combine them with <And> or <Or>",
                predicates.len() + 1
            )));
        }
        (true, None) => return Err(FesError::parsing("<Filter> must contain a predicate")),
        (false, Some(_)) => {
            return Err(FesError::parsing(
                "<Filter> cannot mix <ResourceId> with other predicates",
            ));
        }
    };
    Ok(AstNode::Filter(Filter { predicate }))
}

fn parse_sort_by_node(parser: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let mut properties = Vec::new();
    for property in el.child_elements() {
        if !is_fes(property, "SortProperty") {
            return Err(unexpected(property, "<SortProperty>"));
        }
        let children = property.child_elements();
        let (reference, order) = match children.as_slice() {
            [reference] => (*reference, None),
            [reference, order] => (*reference, Some(*order)),
            _ => {
                return Err(FesError::parsing(
                    "<SortProperty> expects a <ValueReference> and an optional <SortOrder>",
                ));
            }
        };
        let descending = match order {
            None => false,
            Some(order) if is_fes(order, "SortOrder") => match order.text_value().to_uppercase().as_str() {
                "ASC" => false,
                "DESC" => true,
                other => {
                    return Err(FesError::parsing(format!(
                        "<SortOrder> must be ASC or DESC, got '{other}'"
                    )));
                }
            },
            Some(order) => return Err(unexpected(order, "<SortOrder>")),
        };
        properties.push(SortProperty {
            value_reference: parser.value_reference(reference)?,
            descending,
        });
    }
    if properties.is_empty() {
        return Err(FesError::parsing("<SortBy> requires at least one <SortProperty>"));
    }
    Ok(AstNode::SortBy(SortBy { properties }))
}

fn parse_literal(parser: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let type_name = el.attr("type").map(|t| el.resolve_prefixed(t)).transpose()?;
    let raw = el.text_value();
    let value = match el.child_elements().first() {
        Some(child) => LiteralValue::Geometry(parser.geometry(*child)?),
        None => LiteralValue::Scalar(cast_literal(el, &raw, type_name.as_ref())?),
    };
    Ok(AstNode::Expression(Expression::Literal(Literal {
        value,
        type_name,
        raw,
    })))
}

fn parse_value_reference(_: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    value_reference(el).map(|r| AstNode::Expression(Expression::ValueReference(r)))
}

fn parse_function(parser: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let name = el.required_attr("name")?;
    let arguments = el
        .child_elements()
        .into_iter()
        .map(|child| parser.expression(child))
        .collect::<Result<Vec<_>>>()?;
    Ok(AstNode::Expression(Expression::Function(Function {
        name: name.to_string(),
        arguments,
    })))
}

fn parse_arithmetic(parser: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let op = match el.tag_name().name() {
        "Add" => ArithmeticOp::Add,
        "Sub" => ArithmeticOp::Sub,
        "Mul" => ArithmeticOp::Mul,
        "Div" => ArithmeticOp::Div,
        _ => return Err(unexpected(el, "<Add>, <Sub>, <Mul>, <Div>")),
    };
    let [lhs, rhs] = parser.expressions::<2>(el)?;
    Ok(AstNode::Expression(Expression::Arithmetic(BinaryOperator {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })))
}

fn comparison(operator: ComparisonOperator) -> AstNode {
    AstNode::Operator(NonIdOperator::Comparison(operator))
}

fn parse_binary_comparison(parser: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let operator = BinaryComparisonName::from_tag(el.tag_name().name())
        .ok_or_else(|| unexpected(el, "a binary comparison operator"))?;
    let [lhs, rhs] = parser.expressions::<2>(el)?;
    let match_action = match el.attr("matchAction") {
        None => MatchAction::default(),
        Some(value) => MatchAction::from_attr(value).ok_or_else(|| {
            FesError::parsing(format!(
                "{} has invalid matchAction '{}', expected All, Any or One",
                el.describe(),
                value
            ))
        })?,
    };
    Ok(comparison(ComparisonOperator::Binary(BinaryComparison {
        operator,
        lhs,
        rhs,
        match_case: bool_attr(el, "matchCase", true)?,
        match_action,
    })))
}

fn parse_between(parser: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let children = el.child_elements();
    let [expression, lower, upper] = children.as_slice() else {
        return Err(FesError::parsing(
            "<PropertyIsBetween> expects an expression, <LowerBoundary> and <UpperBoundary>",
        ));
    };
    let boundary = |node: Node<'_, '_>, name: &str| -> Result<Expression> {
        if !is_fes(node, name) {
            return Err(unexpected(node, &format!("<{name}>")));
        }
        let [expression] = parser.expressions::<1>(node)?;
        Ok(expression)
    };
    Ok(comparison(ComparisonOperator::Between(Between {
        expression: parser.expression(*expression)?,
        lower: boundary(*lower, "LowerBoundary")?,
        upper: boundary(*upper, "UpperBoundary")?,
    })))
}

fn parse_like(parser: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let [expression, pattern] = parser.expressions::<2>(el)?;
    Ok(comparison(ComparisonOperator::Like(Like {
        expression,
        pattern,
        wild_card: char_attr(el, &["wildCard"])?,
        single_char: char_attr(el, &["singleChar"])?,
        // FES 1.1 clients still send `escape`
        escape_char: char_attr(el, &["escapeChar", "escape"])?,
        match_case: bool_attr(el, "matchCase", true)?,
    })))
}

fn parse_nil(parser: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let [expression] = parser.expressions::<1>(el)?;
    Ok(comparison(ComparisonOperator::Nil(Nil {
        expression,
        nil_reason: el.attr("nilReason").map(str::to_string),
    })))
}

fn parse_null(parser: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let [expression] = parser.expressions::<1>(el)?;
    Ok(comparison(ComparisonOperator::Null(Null { expression })))
}

fn parse_binary_spatial(parser: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let operator = SpatialOperatorName::from_tag(el.tag_name().name())
        .ok_or_else(|| unexpected(el, "a spatial operator"))?;
    let children = el.child_elements();
    let (reference, operand) = match children.as_slice() {
        [operand] if operator == SpatialOperatorName::BBox => (None, *operand),
        [reference, operand] => (Some(parser.value_reference(*reference)?), *operand),
        _ => {
            return Err(FesError::parsing(format!(
                "{} expects a <ValueReference> and a geometry, found {} element(s)",
                el.describe(),
                children.len()
            )));
        }
    };
    let operand = match parser.dispatch(operand, &[Capability::Geometry, Capability::Expression])? {
        AstNode::Geometry(geometry) => SpatialOperand::Geometry(geometry),
        AstNode::Expression(expression) => SpatialOperand::Expression(expression),
        other => return Err(wrong_kind(operand, &other)),
    };
    Ok(AstNode::Operator(NonIdOperator::Spatial(SpatialOperator::Binary(
        BinarySpatial {
            operator,
            reference,
            operand,
        },
    ))))
}

fn parse_distance_operator(parser: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let operator = DistanceOperatorName::from_tag(el.tag_name().name())
        .ok_or_else(|| unexpected(el, "a distance operator"))?;
    let children = el.child_elements();
    let [reference, geometry, distance] = children.as_slice() else {
        return Err(FesError::parsing(format!(
            "{} expects a <ValueReference>, a geometry and a <Distance>",
            el.describe()
        )));
    };
    if !is_fes(*distance, "Distance") {
        return Err(unexpected(*distance, "<Distance>"));
    }
    Ok(AstNode::Operator(NonIdOperator::Spatial(SpatialOperator::Distance(
        DistanceSpatial {
            operator,
            reference: parser.value_reference(*reference)?,
            geometry: parser.geometry(*geometry)?,
            distance: Distance::parse(&distance.text_value(), distance.required_attr("uom")?)?,
        },
    ))))
}

fn parse_temporal_operator(parser: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let operator = TemporalOperatorName::from_tag(el.tag_name().name())
        .ok_or_else(|| unexpected(el, "a temporal operator"))?;
    let children = el.child_elements();
    let [reference, operand] = children.as_slice() else {
        return Err(FesError::parsing(format!(
            "{} expects a <ValueReference> and a temporal operand",
            el.describe()
        )));
    };
    let operand = match parser.dispatch(*operand, &[Capability::TemporalPrimitive, Capability::Expression])? {
        AstNode::Temporal(primitive) => TemporalOperand::Primitive(primitive),
        AstNode::Expression(expression) => TemporalOperand::Expression(expression),
        other => return Err(wrong_kind(*operand, &other)),
    };
    Ok(AstNode::Operator(NonIdOperator::Temporal(TemporalOperator {
        operator,
        reference: parser.value_reference(*reference)?,
        operand,
    })))
}

fn parse_binary_logic(parser: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let operands = el
        .child_elements()
        .into_iter()
        .map(|child| parser.predicate(child))
        .collect::<Result<Vec<_>>>()?;
    if operands.len() < 2 {
        return Err(FesError::parsing(format!(
            "{} requires at least two operands, found {}",
            el.describe(),
            operands.len()
        )));
    }
    let operator = match el.tag_name().name() {
        "And" => LogicalOperator::And(operands),
        _ => LogicalOperator::Or(operands),
    };
    Ok(AstNode::Operator(NonIdOperator::Logical(operator)))
}

fn parse_not(parser: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let children = el.child_elements();
    let [operand] = children.as_slice() else {
        return Err(FesError::parsing(format!(
            "<Not> requires exactly one operand, found {}",
            children.len()
        )));
    };
    let operand = parser.predicate(*operand)?;
    Ok(AstNode::Operator(NonIdOperator::Logical(LogicalOperator::Not(Box::new(
        operand,
    )))))
}

fn parse_resource_id(_: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    let optional = |name: &str| el.attr(name).map(str::to_string);
    Ok(AstNode::ResourceId(ResourceId {
        rid: el.required_attr("rid")?.to_string(),
        previous_rid: optional("previousRid"),
        version: optional("version"),
        start_date: optional("startDate"),
        end_date: optional("endDate"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comparison_of(filter: &Filter) -> &ComparisonOperator {
        match &filter.predicate {
            FilterPredicate::NonId(NonIdOperator::Comparison(c)) => c,
            other => panic!("expected a comparison, got {other:?}"),
        }
    }

    #[test]
    fn test_bare_filter_gets_namespaces() {
        let filter = parse_fes(
            "<Filter><PropertyIsEqualTo><ValueReference>SomeProperty</ValueReference>\
             <Literal>100</Literal></PropertyIsEqualTo></Filter>",
        )
        .unwrap();
        let ComparisonOperator::Binary(binary) = comparison_of(&filter) else {
            panic!("expected a binary comparison");
        };
        assert_eq!(binary.operator, BinaryComparisonName::EqualTo);
        assert_eq!(binary.lhs, Expression::ValueReference(ValueReference::new("SomeProperty")));
        assert_eq!(binary.rhs, Expression::Literal(Literal::new(Scalar::Integer(100))));
        assert!(binary.match_case);
        assert_eq!(binary.match_action, MatchAction::Any);
    }

    #[test]
    fn test_request_body_bytes() {
        let body = "<Filter><PropertyIsNull><ValueReference>straße</ValueReference></PropertyIsNull></Filter>";
        let filter = Filter::from_bytes(body.as_bytes()).unwrap();
        assert_eq!(filter, parse_fes(body).unwrap());

        let mut latin1 = b"<Filter><PropertyIsNull><ValueReference>stra".to_vec();
        latin1.push(0xdf);
        latin1.extend_from_slice(b"e</ValueReference></PropertyIsNull></Filter>");
        let err = Filter::from_bytes(&latin1).unwrap_err();
        assert!(matches!(err, FesError::MalformedXml(ref m) if m.contains("UTF-8")), "{err}");
    }

    #[test]
    fn test_typed_literals() {
        let filter = Filter::from_xml(
            r#"<fes:Filter xmlns:fes="http://www.opengis.net/fes/2.0" xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <fes:PropertyIsEqualTo matchCase="false">
                   <fes:ValueReference>code</fes:ValueReference>
                   <fes:Literal type="xs:string">0042</fes:Literal>
                 </fes:PropertyIsEqualTo>
               </fes:Filter>"#,
        )
        .unwrap();
        let ComparisonOperator::Binary(binary) = comparison_of(&filter) else {
            panic!("expected a binary comparison");
        };
        assert!(!binary.match_case);
        let Expression::Literal(literal) = &binary.rhs else {
            panic!("expected a literal");
        };
        assert_eq!(literal.value, LiteralValue::Scalar(Scalar::String("0042".into())));
        assert_eq!(literal.type_name, Some(QName::new(XSD, "string")));
    }

    #[test]
    fn test_invalid_typed_literal() {
        let err = Filter::from_xml(
            r#"<Filter xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns="http://www.opengis.net/fes/2.0">
                 <PropertyIsEqualTo><ValueReference>a</ValueReference><Literal type="xs:integer">abc</Literal></PropertyIsEqualTo>
               </Filter>"#,
        )
        .unwrap_err();
        assert!(matches!(err, FesError::ExternalParsing(m) if m.contains("xs:integer")));
    }

    #[test]
    fn test_mixing_resource_id_and_predicate_fails() {
        let err = parse_fes(
            r#"<Filter><ResourceId rid="a.1"/><PropertyIsNull><ValueReference>x</ValueReference></PropertyIsNull></Filter>"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot mix"));
    }

    #[test]
    fn test_two_top_level_predicates_fail() {
        let err = parse_fes(
            "<Filter>\
               <PropertyIsNull><ValueReference>x</ValueReference></PropertyIsNull>\
               <PropertyIsNull><ValueReference>y</ValueReference></PropertyIsNull>\
             </Filter>",
        )
        .unwrap_err();
        assert!(err.to_string().contains("exactly one predicate, found 2"));
    }

    #[test]
    fn test_unknown_tag_names_clark_name() {
        let err = parse_fes("<Filter><PropertyIsSimilar/></Filter>").unwrap_err();
        assert_eq!(
            err,
            FesError::UnsupportedTag("{http://www.opengis.net/fes/2.0}PropertyIsSimilar".into())
        );
    }

    #[test]
    fn test_wrong_node_in_position() {
        let err = parse_fes("<Filter><Literal>1</Literal></Filter>").unwrap_err();
        assert!(matches!(err, FesError::UnexpectedNode { ref found, .. } if found == "<Literal>"));

        let err = parse_fes(
            r#"<Filter><And><ResourceId rid="a.1"/><ResourceId rid="a.2"/></And></Filter>"#,
        )
        .unwrap_err();
        assert!(matches!(err, FesError::UnexpectedNode { .. }));
    }

    #[test]
    fn test_function_as_predicate() {
        let filter = parse_fes(
            r#"<Filter><Function name="isValid"><ValueReference>geom</ValueReference></Function></Filter>"#,
        )
        .unwrap();
        assert_eq!(
            filter.predicate,
            FilterPredicate::NonId(NonIdOperator::Function(Function {
                name: "isValid".into(),
                arguments: vec![Expression::ValueReference(ValueReference::new("geom"))],
            }))
        );
    }

    #[test]
    fn test_logic_arity() {
        let err = parse_fes("<Filter><And><PropertyIsNull><ValueReference>x</ValueReference></PropertyIsNull></And></Filter>")
            .unwrap_err();
        assert!(err.to_string().contains("at least two operands"));

        let err = parse_fes("<Filter><Not/></Filter>").unwrap_err();
        assert!(err.to_string().contains("exactly one operand"));
    }

    #[test]
    fn test_like_requires_its_characters() {
        let err = parse_fes(
            r#"<Filter><PropertyIsLike wildCard="*" singleChar="."><ValueReference>a</ValueReference><Literal>x*</Literal></PropertyIsLike></Filter>"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("'escapeChar'"));

        let filter = parse_fes(
            r#"<Filter><PropertyIsLike wildCard="*" singleChar="." escape="!"><ValueReference>a</ValueReference><Literal>x*</Literal></PropertyIsLike></Filter>"#,
        )
        .unwrap();
        let ComparisonOperator::Like(like) = comparison_of(&filter) else {
            panic!("expected like");
        };
        assert_eq!((like.wild_card, like.single_char, like.escape_char), ('*', '.', '!'));
    }

    #[test]
    fn test_between_requires_boundaries() {
        let err = parse_fes(
            "<Filter><PropertyIsBetween><ValueReference>DEPTH</ValueReference>\
             <UpperBoundary><Literal>1</Literal></UpperBoundary>\
             <LowerBoundary><Literal>2</Literal></LowerBoundary></PropertyIsBetween></Filter>",
        )
        .unwrap_err();
        assert!(matches!(err, FesError::UnexpectedNode { ref expected, .. } if expected == "<LowerBoundary>"));
    }

    #[test]
    fn test_bbox_without_value_reference() {
        let filter = parse_fes(
            r#"<Filter><BBOX><gml:Envelope srsName="EPSG:28992">
                 <gml:lowerCorner>0 0</gml:lowerCorner><gml:upperCorner>10 10</gml:upperCorner>
               </gml:Envelope></BBOX></Filter>"#,
        )
        .unwrap();
        let FilterPredicate::NonId(NonIdOperator::Spatial(SpatialOperator::Binary(bbox))) = filter.predicate else {
            panic!("expected BBOX");
        };
        assert_eq!(bbox.operator, SpatialOperatorName::BBox);
        assert_eq!(bbox.reference, None);
        assert!(matches!(bbox.operand, SpatialOperand::Geometry(ref g) if g.value.srid == Some(28992)));
    }

    #[test]
    fn test_temporal_operator_parses() {
        let filter = parse_fes(
            r#"<Filter><During><ValueReference>when</ValueReference>
                 <gml:TimePeriod gml:id="TP1"><gml:begin/><gml:end/></gml:TimePeriod>
               </During></Filter>"#,
        )
        .unwrap();
        let FilterPredicate::NonId(NonIdOperator::Temporal(temporal)) = filter.predicate else {
            panic!("expected a temporal operator");
        };
        assert_eq!(temporal.operator, TemporalOperatorName::During);
        let TemporalOperand::Primitive(primitive) = temporal.operand else {
            panic!("expected a GML temporal primitive");
        };
        assert_eq!(primitive.gml_id.as_deref(), Some("TP1"));
    }

    #[test]
    fn test_resource_id_attributes() {
        let filter = parse_fes(r#"<Filter><ResourceId rid="a.1" version="2"/></Filter>"#).unwrap();
        let FilterPredicate::Id(ids) = filter.predicate else {
            panic!("expected resource ids");
        };
        assert_eq!(ids.ids[0].version.as_deref(), Some("2"));
        assert!(parse_fes("<Filter><ResourceId/></Filter>").is_err());
    }

    #[test]
    fn test_sort_by() {
        let sort_by = SortBy::from_xml(
            "<SortBy><SortProperty><ValueReference>name</ValueReference></SortProperty>\
             <SortProperty><ValueReference>depth</ValueReference><SortOrder>DESC</SortOrder></SortProperty></SortBy>",
        )
        .unwrap();
        assert_eq!(sort_by.properties.len(), 2);
        assert!(!sort_by.properties[0].descending);
        assert!(sort_by.properties[1].descending);

        assert!(SortBy::from_xml("<SortBy/>").is_err());
        assert!(matches!(
            Filter::from_xml("<SortBy><SortProperty><ValueReference>a</ValueReference></SortProperty></SortBy>"),
            Err(FesError::UnexpectedNode { .. })
        ));
    }
}
