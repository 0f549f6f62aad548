//! OGC Filter Encoding 2.0 parser and query plan compiler.
//!
//! XML filters are parsed into a typed AST by a namespace-aware tag registry,
//! then lowered against a configured feature type into a [`CompiledQuery`]:
//! annotations, lookups and ordering that a query executor applies. The
//! [`sql_compiler`] module is a reference executor rendering PostgreSQL/PostGIS.
//!
//! ```no_run
//! use fes_filter::{CompileContext, Filter, ServiceConfig, SqlCompiler};
//!
//! let config = ServiceConfig::demo();
//! let feature_type = config.feature_type("Feature").unwrap();
//! let filter = Filter::from_xml(
//!     "<Filter><PropertyIsLessThan><ValueReference>DEPTH</ValueReference>\
//!      <Literal>30</Literal></PropertyIsLessThan></Filter>",
//! )?;
//! let plan = filter.compile(&CompileContext::new(feature_type))?;
//! let sql = SqlCompiler::new().compile(&plan, feature_type)?.sql;
//! # Ok::<(), fes_filter::FesError>(())
//! ```

pub mod ast;
pub mod config;
pub mod crs;
pub mod error;
pub mod functions;
pub mod geometry;
pub mod gml;
pub mod kvp;
pub mod lookups;
pub mod lower;
pub mod parser;
pub mod query;
pub mod registry;
pub mod sql_compiler;
pub mod xml;

pub use ast::{Filter, SortBy};
pub use config::{ConfigError, FeatureType, ServiceConfig};
pub use crs::{Crs, Reprojector};
pub use error::{FesError, Result};
pub use functions::{FunctionRegistry, FUNCTIONS};
pub use kvp::FilterRequest;
pub use lookups::{LookupKind, LookupRegistry};
pub use lower::{compile_query, CompileContext};
pub use parser::{parse_fes, parse_fes_bytes, Parser};
pub use query::{CompiledQuery, Condition, Scalar, SortKey, Value};
pub use registry::{TagRegistry, TAGS};
pub use sql_compiler::SqlCompiler;
