//! Key-value encoded filter input, as sent in a WFS GetFeature query string.
//!
//! `FILTER`, `RESOURCEID` and `BBOX` each describe the whole selection and are
//! mutually exclusive. `SORTBY` may accompany any of them. Other keys belong to
//! the surrounding request and are ignored here.

use crate::ast::{
    BinarySpatial, Filter, FilterPredicate, Geometry, IdOperator, NonIdOperator, ResourceId, SortBy,
    SortProperty, SpatialOperand, SpatialOperator, SpatialOperatorName, ValueReference,
};
use crate::crs::Crs;
use crate::error::{FesError, Result};
use crate::geometry::{Coord, GeometryValue};
use crate::lower::{compile_query, CompileContext};
use crate::query::CompiledQuery;

/// Selection and ordering taken from one request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterRequest {
    pub filter: Option<Filter>,
    pub sort_by: Option<SortBy>,
}

impl FilterRequest {
    /// Build a request from decoded key/value pairs. Keys are case-insensitive.
    pub fn from_kvp<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let mut selection: Option<(&'static str, Filter)> = None;
        let mut sort_by = None;

        for (key, value) in pairs {
            let key = key.trim().to_ascii_uppercase();
            let (name, filter) = match key.as_str() {
                "FILTER" => ("FILTER", Filter::from_xml(value)?),
                "RESOURCEID" => ("RESOURCEID", parse_resource_ids(value)?),
                "BBOX" => ("BBOX", parse_bbox(value)?),
                "SORTBY" => {
                    if sort_by.is_some() {
                        return Err(FesError::parsing("SORTBY given more than once"));
                    }
                    sort_by = Some(parse_sort_by(value)?);
                    continue;
                }
                _ => continue,
            };
            if let Some((previous, _)) = &selection {
                return Err(FesError::parsing(format!(
                    "{name} cannot be combined with {previous}"
                )));
            }
            selection = Some((name, filter));
        }

        Ok(Self {
            filter: selection.map(|(_, filter)| filter),
            sort_by,
        })
    }

    /// Build a request from a raw `KEY=VALUE&...` query string.
    pub fn from_query_string(query: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        for part in query.trim_start_matches('?').split('&').filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            pairs.push((decode(key)?, decode(value)?));
        }
        Self::from_kvp(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    pub fn compile(&self, ctx: &CompileContext<'_>) -> Result<CompiledQuery> {
        compile_query(ctx, self.filter.as_ref(), self.sort_by.as_ref())
    }
}

fn decode(text: &str) -> Result<String> {
    let text = text.replace('+', " ");
    urlencoding::decode(&text)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| FesError::parsing(format!("invalid percent-encoding in '{text}': {e}")))
}

/// `RESOURCEID=Road.1,Road.2`
pub fn parse_resource_ids(value: &str) -> Result<Filter> {
    let ids: Vec<ResourceId> = value
        .split(',')
        .map(str::trim)
        .filter(|rid| !rid.is_empty())
        .map(ResourceId::new)
        .collect();
    if ids.is_empty() {
        return Err(FesError::parsing("RESOURCEID must list at least one identifier"));
    }
    Ok(Filter {
        predicate: FilterPredicate::Id(IdOperator { ids }),
    })
}

/// `BBOX=minx,miny,maxx,maxy[,crs]`
///
/// Without a CRS the envelope is left unresolved and takes the feature type's
/// default reference system at compile time.
pub fn parse_bbox(value: &str) -> Result<Filter> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if !(4..=5).contains(&parts.len()) {
        return Err(FesError::parsing(format!(
            "BBOX needs minx,miny,maxx,maxy[,crs], got '{value}'"
        )));
    }
    let mut numbers = [0.0_f64; 4];
    for (slot, text) in numbers.iter_mut().zip(&parts) {
        *slot = text
            .parse()
            .map_err(|_| FesError::parsing(format!("BBOX coordinate '{text}' is not a number")))?;
    }
    let crs = parts.get(4).map(|text| Crs::from_string(text)).transpose()?;

    let [x1, y1, x2, y2] = numbers;
    let mut envelope = GeometryValue::from_envelope(
        Coord { x: x1, y: y1 },
        Coord { x: x2, y: y2 },
        crs.as_ref().map(Crs::srid),
    );
    if crs.as_ref().is_some_and(|crs| crs.north_east) {
        envelope.swap_axes();
    }

    let geometry = Geometry {
        value: envelope,
        crs,
        locator: "bbox".to_string(),
    };
    Ok(Filter {
        predicate: FilterPredicate::NonId(NonIdOperator::Spatial(SpatialOperator::Binary(BinarySpatial {
            operator: SpatialOperatorName::BBox,
            reference: None,
            operand: SpatialOperand::Geometry(geometry),
        }))),
    })
}

/// `SORTBY=name DESC,depth`
pub fn parse_sort_by(value: &str) -> Result<SortBy> {
    let mut properties = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let mut words = entry.split_whitespace();
        let field = words
            .next()
            .ok_or_else(|| FesError::parsing("empty SORTBY entry"))?;
        let descending = match words.next().map(str::to_ascii_uppercase).as_deref() {
            None | Some("ASC") | Some("A") => false,
            Some("DESC") | Some("D") => true,
            Some(other) => {
                return Err(FesError::parsing(format!(
                    "unknown sort order '{other}' for '{field}', expected ASC or DESC"
                )));
            }
        };
        if words.next().is_some() {
            return Err(FesError::parsing(format!("malformed SORTBY entry '{entry}'")));
        }
        properties.push(SortProperty {
            value_reference: ValueReference::new(field),
            descending,
        });
    }
    if properties.is_empty() {
        return Err(FesError::parsing("SORTBY must name at least one property"));
    }
    Ok(SortBy { properties })
}
