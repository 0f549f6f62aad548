//! FES 2.0 / GML 的抽象语法树
//!
//! 每个节点都是一个封闭的枚举或结构体, 只保存其语法产生式需要的字段。
//! 解析逻辑在 `parser` 与 `gml` 模块中, 降级(lowering)逻辑在 `lower` 模块中。

use crate::crs::Crs;
use crate::geometry::GeometryValue;
use crate::gml::Distance;
use crate::lookups::LookupKind;
use crate::query::{ArithmeticOp, Scalar};
use crate::xml::QName;

/// AST 的根节点, 代表一个完整的 `<fes:Filter>`
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub predicate: FilterPredicate,
}

/// Filter 中唯一的顶层谓词
#[derive(Debug, Clone, PartialEq)]
pub enum FilterPredicate {
    /// 一个或多个 `<fes:ResourceId>` 元素
    Id(IdOperator),
    /// 其它任意谓词 (运算符或函数)
    NonId(NonIdOperator),
}

/// ResourceId 列表, 降级时以 OR 组合
#[derive(Debug, Clone, PartialEq)]
pub struct IdOperator {
    pub ids: Vec<ResourceId>,
}

/// 资源标识符, 例如 `<fes:ResourceId rid="TREESA_1M.1234"/>`
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceId {
    pub rid: String,
    pub previous_rid: Option<String>,
    pub version: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl ResourceId {
    pub fn new(rid: &str) -> Self {
        Self {
            rid: rid.to_string(),
            previous_rid: None,
            version: None,
            start_date: None,
            end_date: None,
        }
    }

    /// `typename.id` 中的类型名部分
    pub fn type_name(&self) -> Option<&str> {
        self.rid.rsplit_once('.').map(|(type_name, _)| type_name)
    }

    /// `typename.id` 中的标识部分 (没有类型名时为整个 rid)
    pub fn id(&self) -> &str {
        self.rid.rsplit_once('.').map_or(self.rid.as_str(), |(_, id)| id)
    }
}

// ---------------------------------------------------------------------------
// 表达式
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    ValueReference(ValueReference),
    Function(Function),
    /// Add / Sub / Mul / Div
    Arithmetic(BinaryOperator),
}

/// 字面量值, 以及可选的声明类型 (例如 `xs:integer`)
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: LiteralValue,
    pub type_name: Option<QName>,
    /// 字面量原文, 类型转换前的文本
    pub raw: String,
}

impl Literal {
    pub fn new(value: Scalar) -> Self {
        Self {
            raw: value.as_text(),
            value: LiteralValue::Scalar(value),
            type_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Scalar(Scalar),
    Geometry(Geometry),
}

/// 字段引用, 只支持简单的 `a/b/c` 路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueReference {
    pub xpath: String,
}

impl ValueReference {
    pub fn new(xpath: &str) -> Self {
        Self {
            xpath: xpath.to_string(),
        }
    }
}

/// 函数调用, 例如 `<fes:Function name="SIN">`
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub arguments: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOperator {
    pub op: ArithmeticOp,
    pub lhs: Box<Expression>,
    pub rhs: Box<Expression>,
}

// ---------------------------------------------------------------------------
// 运算符
// ---------------------------------------------------------------------------

/// 非标识符谓词
#[derive(Debug, Clone, PartialEq)]
pub enum NonIdOperator {
    Comparison(ComparisonOperator),
    Spatial(SpatialOperator),
    Temporal(TemporalOperator),
    Logical(LogicalOperator),
    /// 作为谓词使用的函数 (返回布尔值)
    Function(Function),
}

/// 多值属性的匹配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchAction {
    All,
    #[default]
    Any,
    One,
}

impl MatchAction {
    pub fn from_attr(value: &str) -> Option<Self> {
        match value {
            "All" => Some(MatchAction::All),
            "Any" => Some(MatchAction::Any),
            "One" => Some(MatchAction::One),
            _ => None,
        }
    }
}

/// 为带有行为的标签枚举生成 "标签名 <-> 成员" 的查找表
macro_rules! tag_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $tag:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn tag(self) -> &'static str {
                match self {
                    $($name::$variant => $tag),+
                }
            }

            pub fn from_tag(tag: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|member| member.tag() == tag)
            }
        }
    };
}

tag_enum!(
    /// 二元比较运算符
    BinaryComparisonName {
        EqualTo => "PropertyIsEqualTo",
        NotEqualTo => "PropertyIsNotEqualTo",
        LessThan => "PropertyIsLessThan",
        GreaterThan => "PropertyIsGreaterThan",
        LessThanOrEqualTo => "PropertyIsLessThanOrEqualTo",
        GreaterThanOrEqualTo => "PropertyIsGreaterThanOrEqualTo",
    }
);

impl BinaryComparisonName {
    pub fn lookup(self) -> LookupKind {
        match self {
            BinaryComparisonName::EqualTo => LookupKind::Exact,
            BinaryComparisonName::NotEqualTo => LookupKind::NotEqual,
            BinaryComparisonName::LessThan => LookupKind::Lt,
            BinaryComparisonName::GreaterThan => LookupKind::Gt,
            BinaryComparisonName::LessThanOrEqualTo => LookupKind::Lte,
            BinaryComparisonName::GreaterThanOrEqualTo => LookupKind::Gte,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryComparison {
    pub operator: BinaryComparisonName,
    pub lhs: Expression,
    pub rhs: Expression,
    pub match_case: bool,
    pub match_action: MatchAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Between {
    pub expression: Expression,
    pub lower: Expression,
    pub upper: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Like {
    pub expression: Expression,
    pub pattern: Expression,
    pub wild_card: char,
    pub single_char: char,
    pub escape_char: char,
    pub match_case: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Nil {
    pub expression: Expression,
    pub nil_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Null {
    pub expression: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComparisonOperator {
    Binary(BinaryComparison),
    Between(Between),
    Like(Like),
    Nil(Nil),
    Null(Null),
}

tag_enum!(
    /// 二元空间运算符
    SpatialOperatorName {
        BBox => "BBOX",
        Equals => "Equals",
        Disjoint => "Disjoint",
        Touches => "Touches",
        Within => "Within",
        Overlaps => "Overlaps",
        Crosses => "Crosses",
        Intersects => "Intersects",
        Contains => "Contains",
    }
);

impl SpatialOperatorName {
    pub fn lookup(self) -> LookupKind {
        match self {
            SpatialOperatorName::BBox | SpatialOperatorName::Intersects => LookupKind::Intersects,
            SpatialOperatorName::Equals => LookupKind::Equals,
            SpatialOperatorName::Disjoint => LookupKind::Disjoint,
            SpatialOperatorName::Touches => LookupKind::Touches,
            SpatialOperatorName::Within => LookupKind::Within,
            SpatialOperatorName::Overlaps => LookupKind::Overlaps,
            SpatialOperatorName::Crosses => LookupKind::Crosses,
            SpatialOperatorName::Contains => LookupKind::Contains,
        }
    }
}

tag_enum!(
    /// 距离运算符
    DistanceOperatorName {
        DWithin => "DWithin",
        Beyond => "Beyond",
    }
);

impl DistanceOperatorName {
    pub fn lookup(self) -> LookupKind {
        match self {
            DistanceOperatorName::DWithin => LookupKind::DWithin,
            DistanceOperatorName::Beyond => LookupKind::NotWithin,
        }
    }
}

/// 空间运算的第二个操作数
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialOperand {
    Geometry(Geometry),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinarySpatial {
    pub operator: SpatialOperatorName,
    /// BBOX 可以省略, 此时使用要素类型的默认几何字段
    pub reference: Option<ValueReference>,
    pub operand: SpatialOperand,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistanceSpatial {
    pub operator: DistanceOperatorName,
    pub reference: ValueReference,
    pub geometry: Geometry,
    pub distance: Distance,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpatialOperator {
    Binary(BinarySpatial),
    Distance(DistanceSpatial),
}

tag_enum!(
    /// 时间运算符 (只解析, 不支持降级)
    TemporalOperatorName {
        After => "After",
        Before => "Before",
        Begins => "Begins",
        BegunBy => "BegunBy",
        TContains => "TContains",
        During => "During",
        TEquals => "TEquals",
        TOverlaps => "TOverlaps",
        Meets => "Meets",
        OverlappedBy => "OverlappedBy",
        MetBy => "MetBy",
        EndedBy => "EndedBy",
        AnyInteracts => "AnyInteracts",
    }
);

#[derive(Debug, Clone, PartialEq)]
pub enum TemporalOperand {
    Primitive(TemporalPrimitive),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemporalOperator {
    pub operator: TemporalOperatorName,
    pub reference: ValueReference,
    pub operand: TemporalOperand,
}

/// 逻辑运算: And / Or 至少两个操作数, Not 恰好一个
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalOperator {
    And(Vec<NonIdOperator>),
    Or(Vec<NonIdOperator>),
    Not(Box<NonIdOperator>),
}

// ---------------------------------------------------------------------------
// GML 节点
// ---------------------------------------------------------------------------

/// 已解析的几何体及其参考系
///
/// `crs` 在解析阶段可以为空 (BBOX 简写), 编译时再按要素类型的默认参考系解析。
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub value: GeometryValue,
    pub crs: Option<Crs>,
    /// 报错时用于定位几何体的名称, 例如 `bbox` 或 gml:id
    pub locator: String,
}

/// GML 时间元素的占位节点, 例如 `<gml:TimePeriod>`
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalPrimitive {
    pub tag: QName,
    pub gml_id: Option<String>,
}

// ---------------------------------------------------------------------------
// 排序
// ---------------------------------------------------------------------------

/// `<fes:SortBy>`
#[derive(Debug, Clone, PartialEq)]
pub struct SortBy {
    pub properties: Vec<SortProperty>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortProperty {
    pub value_reference: ValueReference,
    pub descending: bool,
}

/// 标签注册表分派后得到的任意节点
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    Filter(Filter),
    SortBy(SortBy),
    Expression(Expression),
    Operator(NonIdOperator),
    ResourceId(ResourceId),
    Geometry(Geometry),
    Temporal(TemporalPrimitive),
}

impl AstNode {
    pub fn kind_name(&self) -> &'static str {
        match self {
            AstNode::Filter(_) => "Filter",
            AstNode::SortBy(_) => "SortBy",
            AstNode::Expression(_) => "expression",
            AstNode::Operator(_) => "operator",
            AstNode::ResourceId(_) => "ResourceId",
            AstNode::Geometry(_) => "geometry",
            AstNode::Temporal(_) => "temporal element",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_parts() {
        let rid = ResourceId::new("TREESA_1M.1234");
        assert_eq!(rid.type_name(), Some("TREESA_1M"));
        assert_eq!(rid.id(), "1234");

        let bare = ResourceId::new("1234");
        assert_eq!(bare.type_name(), None);
        assert_eq!(bare.id(), "1234");
    }

    #[test]
    fn test_tag_tables() {
        assert_eq!(
            BinaryComparisonName::from_tag("PropertyIsLessThan"),
            Some(BinaryComparisonName::LessThan)
        );
        assert_eq!(BinaryComparisonName::from_tag("PropertyIsLike"), None);
        assert_eq!(SpatialOperatorName::BBox.lookup(), LookupKind::Intersects);
        assert_eq!(DistanceOperatorName::Beyond.lookup(), LookupKind::NotWithin);
        assert_eq!(TemporalOperatorName::ALL.len(), 13);
        for member in SpatialOperatorName::ALL {
            assert_eq!(SpatialOperatorName::from_tag(member.tag()), Some(*member));
        }
    }

    #[test]
    fn test_match_action() {
        assert_eq!(MatchAction::default(), MatchAction::Any);
        assert_eq!(MatchAction::from_attr("All"), Some(MatchAction::All));
        assert_eq!(MatchAction::from_attr("all"), None);
    }
}
