//! 配置模块，负责从JSON文件加载要素类型(feature type)定义
//!
//! ```json
//! {
//!   "feature_types": [{
//!     "name": "Feature",
//!     "table": "features",
//!     "crs": "EPSG:28992",
//!     "other_crs": ["EPSG:4326"],
//!     "geometry_field": "geometry",
//!     "fields": {
//!       "phone": { "path": "contacts__value", "condition": { "contacts__kind": "phone" } }
//!     }
//!   }]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::crs::Crs;
use crate::query::Scalar;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {}", .0.display())]
    NotFound(PathBuf),

    #[error("无法读取配置文件 {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("无法解析JSON配置 {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("配置无效: {0}")]
    Invalid(String),
}

/// XML 元素名到后端字段的映射
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// 后端查找路径, 例如 `contacts__value`
    pub path: String,
    /// 访问该字段时必须同时满足的条件 (后端路径 → 值)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub condition: BTreeMap<String, Scalar>,
}

/// ValueReference 解析后的后端路径及附带条件
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    pub path: String,
    pub condition: Vec<(String, Scalar)>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

/// 一个可查询的要素类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureType {
    pub name: String,
    /// 数据库表名, 缺省为小写的类型名
    #[serde(default)]
    pub table: Option<String>,
    /// 默认参考系
    #[serde(default)]
    pub crs: Option<Crs>,
    /// 额外接受的参考系, 编译时重投影到默认参考系
    #[serde(default)]
    pub other_crs: Vec<Crs>,
    #[serde(default)]
    pub geometry_field: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldMapping>,
}

impl FeatureType {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: None,
            crs: None,
            other_crs: Vec::new(),
            geometry_field: None,
            primary_key: default_primary_key(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    pub fn with_other_crs(mut self, crs: Crs) -> Self {
        self.other_crs.push(crs);
        self
    }

    pub fn with_geometry_field(mut self, field: &str) -> Self {
        self.geometry_field = Some(field.to_string());
        self
    }

    pub fn with_field(mut self, xml_name: &str, mapping: FieldMapping) -> Self {
        self.fields.insert(xml_name.to_string(), mapping);
        self
    }

    /// 获取表名，未配置时返回小写的类型名
    pub fn table_name(&self) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| self.name.to_lowercase())
    }

    pub fn geometry_field(&self) -> Option<&str> {
        self.geometry_field.as_deref()
    }

    /// 将 XPath 路径段解析为后端路径, 未映射的路径按 `a__b` 规则拼接
    pub fn resolve_path(&self, segments: &[&str]) -> ResolvedField {
        match self.fields.get(&segments.join("/")) {
            Some(mapping) => ResolvedField {
                path: mapping.path.clone(),
                condition: mapping
                    .condition
                    .iter()
                    .map(|(path, value)| (path.clone(), value.clone()))
                    .collect(),
            },
            None => ResolvedField {
                path: segments.join("__"),
                condition: Vec::new(),
            },
        }
    }
}

/// 服务配置: 全部要素类型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub feature_types: Vec<FeatureType>,
}

impl ServiceConfig {
    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, "<inline>")
    }

    fn parse(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = serde_json::from_str(content).map_err(|source| ConfigError::Json {
            origin: origin.to_string(),
            source,
        })?;
        config.validate()?;
        tracing::debug!(origin, feature_types = config.feature_types.len(), "configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for feature_type in &self.feature_types {
            if !seen.insert(feature_type.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "要素类型 '{}' 重复定义",
                    feature_type.name
                )));
            }
            if feature_type.crs.is_none() && !feature_type.other_crs.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "要素类型 '{}' 声明了 other_crs 但没有默认 crs",
                    feature_type.name
                )));
            }
        }
        Ok(())
    }

    pub fn feature_type(&self, name: &str) -> Option<&FeatureType> {
        self.feature_types.iter().find(|ft| ft.name == name)
    }

    /// 内置演示配置（用于测试或fallback）
    pub fn demo() -> Self {
        let feature = FeatureType::new("Feature")
            .with_crs(Crs::from_srid(28992))
            .with_other_crs(Crs::from_srid(4326))
            .with_geometry_field("geometry")
            .with_field(
                "phone",
                FieldMapping {
                    path: "contacts__value".to_string(),
                    condition: BTreeMap::from([(
                        "contacts__kind".to_string(),
                        Scalar::String("phone".to_string()),
                    )]),
                },
            );
        Self {
            feature_types: vec![feature],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_valid_json_config() {
        // 创建临时配置文件
        let temp_file = "test_feature_types.json";
        let mut file = fs::File::create(temp_file).unwrap();
        writeln!(
            file,
            r#"{{
            "feature_types": [{{
                "name": "Road",
                "crs": "urn:ogc:def:crs:EPSG::28992",
                "geometry_field": "geom",
                "fields": {{ "phone": {{ "path": "contacts__value", "condition": {{ "contacts__kind": "phone" }} }} }}
            }}]
        }}"#
        )
        .unwrap();

        let config = ServiceConfig::from_json_file(temp_file);
        // 清理
        fs::remove_file(temp_file).ok();

        let config = config.unwrap();
        let road = config.feature_type("Road").unwrap();
        assert_eq!(road.table_name(), "road");
        assert_eq!(road.primary_key, "id");
        assert_eq!(road.crs.as_ref().map(Crs::srid), Some(28992));
        assert_eq!(road.geometry_field(), Some("geom"));
        assert_eq!(
            road.resolve_path(&["phone"]),
            ResolvedField {
                path: "contacts__value".into(),
                condition: vec![("contacts__kind".into(), Scalar::String("phone".into()))],
            }
        );
    }

    #[test]
    fn test_unmapped_path_uses_double_underscore() {
        let feature = FeatureType::new("Feature");
        let resolved = feature.resolve_path(&["address", "city"]);
        assert_eq!(resolved.path, "address__city");
        assert!(resolved.condition.is_empty());
    }

    #[test]
    fn test_invalid_json_config() {
        let err = ServiceConfig::from_json_str("invalid json").unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));

        let err = ServiceConfig::from_json_str(r#"{"feature_types":[{"name":"a","crs":"WGS84"}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
    }

    #[test]
    fn test_duplicate_feature_types_rejected() {
        let err = ServiceConfig::from_json_str(r#"{"feature_types":[{"name":"a"},{"name":"a"}]}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ServiceConfig::from_json_str(r#"{"feature_types":[{"name":"a","other_crs":["EPSG:4326"]}]}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_file() {
        let result = ServiceConfig::from_json_file("non_existent_file.json");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_demo_config() {
        let config = ServiceConfig::demo();
        let feature = config.feature_type("Feature").unwrap();
        assert_eq!(feature.table_name(), "feature");
        assert!(config.feature_type("Unknown").is_none());
    }
}
