//! Function registry for `<fes:Function name="...">`
//!
//! Maps a function name to a builder producing the computed value the executor
//! evaluates, together with the declared argument and return types. The type
//! metadata is advertised to clients but not checked when a function is called.
//!
//! The default registry is built once on first use and is read-only afterwards.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::Serialize;

use crate::error::{FesError, Result};
use crate::query::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum XsdType {
    #[serde(rename = "xs:string")]
    String,
    #[serde(rename = "xs:integer")]
    Integer,
    #[serde(rename = "xs:double")]
    Double,
    #[serde(rename = "xs:boolean")]
    Boolean,
    #[serde(rename = "gml:AbstractGeometryType")]
    Geometry,
}

impl fmt::Display for XsdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            XsdType::String => "xs:string",
            XsdType::Integer => "xs:integer",
            XsdType::Double => "xs:double",
            XsdType::Boolean => "xs:boolean",
            XsdType::Geometry => "gml:AbstractGeometryType",
        };
        f.write_str(name)
    }
}

pub type FunctionBuilder = Box<dyn Fn(Vec<Value>) -> Value + Send + Sync>;

/// A registered function.
pub struct FunctionDef {
    pub name: String,
    pub arguments: Vec<(String, XsdType)>,
    pub returns: XsdType,
    builder: FunctionBuilder,
}

impl FunctionDef {
    pub fn build(&self, args: Vec<Value>) -> Value {
        (self.builder)(args)
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("arguments", &self.arguments)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

/// Builder that calls a SQL function with the lowered arguments unchanged.
pub fn sql_function(sql_name: &'static str) -> FunctionBuilder {
    Box::new(move |args| Value::Function {
        name: sql_name.to_string(),
        args,
    })
}

#[derive(Debug, Default)]
pub struct FunctionRegistry {
    /// Keyed by lowercase name; FES function names are matched case-insensitively.
    functions: BTreeMap<String, FunctionDef>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: &str,
        arguments: &[(&str, XsdType)],
        returns: XsdType,
        builder: FunctionBuilder,
    ) -> &mut Self {
        let def = FunctionDef {
            name: name.to_string(),
            arguments: arguments
                .iter()
                .map(|(arg, ty)| (arg.to_string(), *ty))
                .collect(),
            returns,
            builder,
        };
        if self.functions.insert(name.to_lowercase(), def).is_some() {
            tracing::warn!(function = name, "function registration replaced");
        }
        self
    }

    pub fn resolve(&self, name: &str) -> Result<&FunctionDef> {
        self.functions
            .get(&name.to_lowercase())
            .ok_or_else(|| FesError::UnsupportedFunction(name.to_string()))
    }

    /// Registered functions in name order, for capability listings.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionDef> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// The functions every deployment offers.
    pub fn with_defaults() -> Self {
        use XsdType::{Double, Geometry, Integer, String as Str};

        let mut registry = Self::new();
        let unary_math: &[(&str, &'static str)] = &[
            ("abs", "ABS"),
            ("ceil", "CEIL"),
            ("floor", "FLOOR"),
            ("round", "ROUND"),
            ("sqrt", "SQRT"),
            ("exp", "EXP"),
            ("log", "LN"),
            ("sin", "SIN"),
            ("cos", "COS"),
            ("tan", "TAN"),
            ("asin", "ASIN"),
            ("acos", "ACOS"),
            ("atan", "ATAN"),
            ("toDegrees", "DEGREES"),
            ("toRadians", "RADIANS"),
        ];
        for (name, sql) in unary_math {
            registry.register(name, &[("value", Double)], Double, sql_function(sql));
        }

        registry
            .register("atan2", &[("y", Double), ("x", Double)], Double, sql_function("ATAN2"))
            .register("pow", &[("base", Double), ("exponent", Double)], Double, sql_function("POWER"))
            .register("min", &[("value1", Double), ("value2", Double)], Double, sql_function("LEAST"))
            .register("max", &[("value1", Double), ("value2", Double)], Double, sql_function("GREATEST"))
            .register("pi", &[], Double, sql_function("PI"))
            .register("strConcat", &[("string1", Str), ("string2", Str)], Str, sql_function("CONCAT"))
            .register("strToLowerCase", &[("string", Str)], Str, sql_function("LOWER"))
            .register("strToUpperCase", &[("string", Str)], Str, sql_function("UPPER"))
            .register("strTrim", &[("string", Str)], Str, sql_function("TRIM"))
            .register("strLength", &[("string", Str)], Integer, sql_function("LENGTH"))
            .register(
                "strReplace",
                &[("string", Str), ("pattern", Str), ("replacement", Str)],
                Str,
                sql_function("REPLACE"),
            )
            .register("area", &[("geometry", Geometry)], Double, sql_function("ST_Area"))
            .register("length", &[("geometry", Geometry)], Double, sql_function("ST_Length"))
            .register("centroid", &[("geometry", Geometry)], Geometry, sql_function("ST_Centroid"))
            .register("envelope", &[("geometry", Geometry)], Geometry, sql_function("ST_Envelope"));
        registry
    }
}

/// Process-wide registry used when a compile context does not bring its own.
pub static FUNCTIONS: Lazy<FunctionRegistry> = Lazy::new(FunctionRegistry::with_defaults);
