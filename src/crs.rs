//! Coordinate reference system identifiers.
//!
//! Only identification lives here: parsing the many spellings clients use for
//! an EPSG code, deciding the axis order that spelling implies, and comparing
//! reference systems. Transforming coordinates is the job of a [`Reprojector`]
//! supplied by the caller.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FesError, Result};
use crate::geometry::GeometryValue;

/// Geographic systems whose official axis order is latitude/longitude.
const NORTH_EAST_CODES: &[u32] = &[4326, 4258, 4269];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs {
    pub authority: String,
    pub code: u32,
    /// The identifier as the client wrote it.
    pub origin: String,
    /// Coordinates are written latitude first.
    pub north_east: bool,
}

impl Crs {
    pub fn from_srid(code: u32) -> Self {
        Self {
            authority: "EPSG".to_string(),
            code,
            origin: format!("EPSG:{code}"),
            north_east: false,
        }
    }

    pub fn from_string(text: &str) -> Result<Self> {
        let text = text.trim();
        let lower = text.to_ascii_lowercase();

        if lower == "crs84" || lower.ends_with("ogc/1.3/crs84") || lower.ends_with(":ogc:1.3:crs84") {
            return Ok(Self::new("EPSG", 4326, text, false));
        }

        let (authority, code, official_axes) = if let Some(code) = lower.strip_prefix("epsg:") {
            ("EPSG".to_string(), code.to_string(), false)
        } else if lower.starts_with("urn:ogc:def:crs:") || lower.starts_with("urn:x-ogc:def:crs:") {
            // urn:ogc:def:crs:EPSG:<version>:<code>, version may be empty
            let parts: Vec<&str> = text.split(':').collect();
            let authority = parts.get(4).copied().unwrap_or_default();
            let code = parts.last().copied().unwrap_or_default();
            (authority.to_string(), code.to_string(), true)
        } else if lower.starts_with("http://www.opengis.net/def/crs/")
            || lower.starts_with("https://www.opengis.net/def/crs/")
        {
            // http://www.opengis.net/def/crs/<authority>/<version>/<code>
            let parts: Vec<&str> = text.trim_end_matches('/').rsplitn(3, '/').collect();
            let code = parts.first().copied().unwrap_or_default();
            let authority = parts
                .get(2)
                .and_then(|rest| rest.rsplit('/').next())
                .unwrap_or_default();
            (authority.to_string(), code.to_string(), true)
        } else if let Some((_, code)) = lower.split_once("epsg.xml#") {
            ("EPSG".to_string(), code.to_string(), false)
        } else {
            return Err(FesError::parsing(format!(
                "Unrecognized reference system identifier: '{text}'"
            )));
        };

        if !authority.eq_ignore_ascii_case("EPSG") {
            return Err(FesError::parsing(format!(
                "Unsupported reference system authority '{authority}' in '{text}'"
            )));
        }
        let code: u32 = code.parse().map_err(|_| {
            FesError::parsing(format!("Invalid EPSG code in reference system '{text}'"))
        })?;

        let north_east = official_axes && NORTH_EAST_CODES.contains(&code);
        Ok(Self::new("EPSG", code, text, north_east))
    }

    fn new(authority: &str, code: u32, origin: &str, north_east: bool) -> Self {
        Self {
            authority: authority.to_string(),
            code,
            origin: origin.to_string(),
            north_east,
        }
    }

    pub fn srid(&self) -> u32 {
        self.code
    }

    pub fn urn(&self) -> String {
        format!("urn:ogc:def:crs:{}::{}", self.authority, self.code)
    }
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.authority.eq_ignore_ascii_case(&other.authority)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.authority, self.code)
    }
}

impl TryFrom<String> for Crs {
    type Error = FesError;

    fn try_from(value: String) -> Result<Self> {
        Crs::from_string(&value)
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.origin
    }
}

/// Coordinate transformation service.
///
/// Called during compilation when a geometry is written in one of the feature
/// type's alternative reference systems. Implementations may be slow (remote
/// services); callers bound the whole compile call if they need a timeout.
pub trait Reprojector {
    fn reproject(&self, geometry: &GeometryValue, from: &Crs, to: &Crs) -> Result<GeometryValue>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("EPSG:4326", 4326, false)]
    #[case("epsg:28992", 28992, false)]
    #[case("urn:ogc:def:crs:EPSG::4326", 4326, true)]
    #[case("urn:ogc:def:crs:EPSG:6.9:4326", 4326, true)]
    #[case("urn:x-ogc:def:crs:EPSG:4326", 4326, true)]
    #[case("urn:ogc:def:crs:EPSG::28992", 28992, false)]
    #[case("http://www.opengis.net/def/crs/epsg/0/4326", 4326, true)]
    #[case("https://www.opengis.net/def/crs/EPSG/0/3857", 3857, false)]
    #[case("http://www.opengis.net/gml/srs/epsg.xml#4326", 4326, false)]
    #[case("urn:ogc:def:crs:OGC:1.3:CRS84", 4326, false)]
    #[case("CRS84", 4326, false)]
    fn test_accepted_spellings(#[case] text: &str, #[case] code: u32, #[case] north_east: bool) {
        let crs = Crs::from_string(text).unwrap();
        assert_eq!(crs.srid(), code);
        assert_eq!(crs.north_east, north_east);
        assert_eq!(crs.origin, text);
    }

    #[rstest]
    #[case("EPSG:abc")]
    #[case("urn:ogc:def:crs:IAU::30100")]
    #[case("WGS84")]
    fn test_rejected_spellings(#[case] text: &str) {
        assert!(matches!(
            Crs::from_string(text),
            Err(FesError::ExternalParsing(_))
        ));
    }

    #[test]
    fn test_equality_ignores_spelling() {
        let a = Crs::from_string("EPSG:4326").unwrap();
        let b = Crs::from_string("urn:ogc:def:crs:EPSG::4326").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Crs::from_srid(28992));
        assert_eq!(a.to_string(), "EPSG:4326");
        assert_eq!(b.urn(), "urn:ogc:def:crs:EPSG::4326");
    }

    #[test]
    fn test_deserialize_from_string() {
        let crs: Crs = serde_json::from_str("\"EPSG:28992\"").unwrap();
        assert_eq!(crs.srid(), 28992);
        assert!(serde_json::from_str::<Crs>("\"nonsense\"").is_err());
    }
}
