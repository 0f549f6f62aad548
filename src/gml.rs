//! GML geometry and temporal productions.
//!
//! Geometries are read into a [`GeometryValue`] in x/y order. A geometry
//! written in a north/east reference system (e.g. `urn:ogc:def:crs:EPSG::4326`)
//! has its axes swapped while it is built. The reference system comes from the
//! element's `srsName` or the nearest ancestor that declares one; a GML
//! geometry without any is rejected.

use std::fmt;

use roxmltree::Node;
use serde::Serialize;

use crate::ast::{AstNode, Geometry, TemporalPrimitive};
use crate::crs::Crs;
use crate::error::{FesError, Result};
use geo_types::{LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};

use crate::geometry::{shape_kind, Coord, GeometryValue, Shape};
use crate::parser::Parser;
use crate::registry::{Capability, TagEntry, TagRegistry};
use crate::xml::{ElementExt, GML21, GML32};

const GEOMETRY_TAGS: &[&str] = &[
    "Point",
    "LineString",
    "LinearRing",
    "Polygon",
    "Envelope",
    "MultiPoint",
    "MultiCurve",
    "MultiLineString",
    "MultiSurface",
    "MultiPolygon",
];

const TEMPORAL_TAGS: &[&str] = &["TimeInstant", "TimePeriod"];

pub fn register_gml_tags(registry: &mut TagRegistry) -> Result<()> {
    for namespace in [GML21, GML32] {
        for tag in GEOMETRY_TAGS {
            registry.register(
                namespace,
                tag,
                TagEntry::new("Geometry", &[Capability::Geometry], parse_geometry_node),
            )?;
        }
        for tag in TEMPORAL_TAGS {
            registry.register(
                namespace,
                tag,
                TagEntry::new("TemporalPrimitive", &[Capability::TemporalPrimitive], parse_temporal_node),
            )?;
        }
    }
    Ok(())
}

fn parse_geometry_node(_: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    parse_geometry(el).map(AstNode::Geometry)
}

fn parse_temporal_node(_: &Parser<'_>, el: Node<'_, '_>) -> Result<AstNode> {
    Ok(AstNode::Temporal(TemporalPrimitive {
        tag: el.qname(),
        gml_id: gml_id(el).map(str::to_string),
    }))
}

/// Read a GML geometry element together with its reference system.
pub fn parse_geometry(el: Node<'_, '_>) -> Result<Geometry> {
    let srs_name = el
        .ancestors()
        .filter(|n| n.is_element())
        .find_map(|n| n.attribute("srsName"))
        .ok_or_else(|| {
            FesError::parsing(format!(
                "{} has no srsName and no enclosing element declares one",
                el.describe()
            ))
        })?;
    let crs = Crs::from_string(srs_name)?;

    let mut value = GeometryValue::new(read_shape(el)?, Some(crs.srid()));
    if crs.north_east {
        value.swap_axes();
    }

    let locator = gml_id(el)
        .map(str::to_string)
        .unwrap_or_else(|| el.tag_name().name().to_string());
    tracing::trace!(locator = %locator, crs = %crs, kind = value.kind(), "geometry parsed");
    Ok(Geometry {
        value,
        crs: Some(crs),
        locator,
    })
}

fn gml_id<'a>(el: Node<'a, '_>) -> Option<&'a str> {
    el.attribute((GML32, "id")).or_else(|| el.attribute((GML21, "id")))
}

fn read_shape(el: Node<'_, '_>) -> Result<Shape> {
    let shape = match el.tag_name().name() {
        "Point" => {
            let coords = read_coords(el)?;
            match coords.as_slice() {
                [point] => Shape::Point(Point::from(*point)),
                _ => return Err(arity_error(el, "exactly one coordinate", coords.len())),
            }
        }
        "LineString" | "LinearRing" => {
            let coords = read_coords(el)?;
            if coords.len() < 2 {
                return Err(arity_error(el, "at least two coordinates", coords.len()));
            }
            Shape::LineString(LineString::from(coords))
        }
        "Polygon" => Shape::Polygon(read_polygon(el)?),
        "Envelope" => read_envelope(el)?,
        "MultiPoint" => {
            let mut points = Vec::new();
            for member in members(el, &["pointMember", "pointMembers"]) {
                points.extend(read_coords(member)?.into_iter().map(Point::from));
            }
            Shape::MultiPoint(MultiPoint(points))
        }
        "MultiCurve" | "MultiLineString" => {
            let mut lines = Vec::new();
            for member in members(el, &["curveMember", "curveMembers", "lineStringMember"]) {
                match read_shape(member)? {
                    Shape::LineString(line) => lines.push(line),
                    other => return Err(member_error(el, member, &other)),
                }
            }
            Shape::MultiLineString(MultiLineString(lines))
        }
        "MultiSurface" | "MultiPolygon" => {
            let mut polygons = Vec::new();
            for member in members(el, &["surfaceMember", "surfaceMembers", "polygonMember"]) {
                match read_shape(member)? {
                    Shape::Polygon(polygon) => polygons.push(polygon),
                    other => return Err(member_error(el, member, &other)),
                }
            }
            Shape::MultiPolygon(MultiPolygon(polygons))
        }
        other => {
            return Err(FesError::not_implemented(format!("GML geometry type <{other}>")));
        }
    };
    Ok(shape)
}

/// Geometry elements below `<xxxMember>` wrappers, in document order.
fn members<'a, 'input>(el: Node<'a, 'input>, wrappers: &[&str]) -> Vec<Node<'a, 'input>> {
    el.child_elements()
        .into_iter()
        .filter(|c| wrappers.contains(&c.tag_name().name()))
        .flat_map(|wrapper| wrapper.child_elements())
        .collect()
}

fn read_polygon(el: Node<'_, '_>) -> Result<Polygon<f64>> {
    let mut exterior = None;
    let mut interiors = Vec::new();
    for boundary in el.child_elements() {
        let ring = match boundary.child_elements().first() {
            Some(ring) => read_coords(*ring)?,
            None => continue,
        };
        match boundary.tag_name().name() {
            "exterior" | "outerBoundaryIs" => exterior = Some(ring),
            "interior" | "innerBoundaryIs" => interiors.push(ring),
            _ => {}
        }
    }
    let exterior = exterior
        .ok_or_else(|| FesError::parsing(format!("{} has no exterior ring", el.describe())))?;
    for ring in std::iter::once(&exterior).chain(&interiors) {
        if ring.len() < 4 || ring.first() != ring.last() {
            return Err(FesError::parsing(format!(
                "{} contains a ring that is not closed",
                el.describe()
            )));
        }
    }
    Ok(Polygon::new(
        LineString::from(exterior),
        interiors.into_iter().map(LineString::from).collect(),
    ))
}

fn read_envelope(el: Node<'_, '_>) -> Result<Shape> {
    let lower = child(el, "lowerCorner");
    let upper = child(el, "upperCorner");
    let corners = match (lower, upper) {
        (Some(lower), Some(upper)) => {
            let lower = parse_numbers(lower)?;
            let upper = parse_numbers(upper)?;
            match (lower.as_slice(), upper.as_slice()) {
                ([x1, y1, ..], [x2, y2, ..]) => vec![Coord { x: *x1, y: *y1 }, Coord { x: *x2, y: *y2 }],
                _ => return Err(arity_error(el, "two-dimensional corners", 0)),
            }
        }
        _ => read_coords(el)?,
    };
    match corners.as_slice() {
        [lower, upper] => Ok(GeometryValue::from_envelope(*lower, *upper, None).shape),
        _ => Err(arity_error(el, "a lower and an upper corner", corners.len())),
    }
}

/// Coordinates of a simple geometry, from whichever encoding it uses.
fn read_coords(el: Node<'_, '_>) -> Result<Vec<Coord>> {
    if let Some(pos_list) = child(el, "posList") {
        let dimension = srs_dimension(pos_list)?;
        let numbers = parse_numbers(pos_list)?;
        if numbers.len() % dimension != 0 {
            return Err(FesError::parsing(format!(
                "{} has {} values, which is not a multiple of srsDimension {}",
                pos_list.describe(),
                numbers.len(),
                dimension
            )));
        }
        return Ok(numbers
            .chunks(dimension)
            .map(|c| Coord { x: c[0], y: c[1] })
            .collect());
    }

    let positions: Vec<Node> = el
        .child_elements()
        .into_iter()
        .filter(|c| matches!(c.tag_name().name(), "pos" | "pointProperty"))
        .collect();
    if !positions.is_empty() {
        return positions.into_iter().map(read_pos).collect();
    }

    if let Some(coordinates) = child(el, "coordinates") {
        return read_coordinates(coordinates);
    }

    let coords: Vec<Node> = el
        .child_elements()
        .into_iter()
        .filter(|c| c.tag_name().name() == "coord")
        .collect();
    if !coords.is_empty() {
        return coords.into_iter().map(read_coord_xy).collect();
    }

    // a wrapper such as <pointMember><Point>...</Point></pointMember>
    match el.child_elements().as_slice() {
        [inner] if inner.tag_name().name() == "Point" => read_coords(*inner),
        _ => Err(FesError::parsing(format!(
            "{} contains no coordinates",
            el.describe()
        ))),
    }
}

fn read_pos(el: Node<'_, '_>) -> Result<Coord> {
    if el.tag_name().name() == "pointProperty" {
        let point = el
            .child_elements()
            .first()
            .copied()
            .ok_or_else(|| FesError::parsing(format!("{} is empty", el.describe())))?;
        return read_pos_of_point(point);
    }
    match parse_numbers(el)?.as_slice() {
        [x, y] | [x, y, _] => Ok(Coord { x: *x, y: *y }),
        other => Err(arity_error(el, "two or three ordinates", other.len())),
    }
}

fn read_pos_of_point(point: Node<'_, '_>) -> Result<Coord> {
    match read_coords(point)?.as_slice() {
        [coord] => Ok(*coord),
        other => Err(arity_error(point, "exactly one coordinate", other.len())),
    }
}

/// GML 2 `<coordinates cs="," ts=" ">x,y x,y</coordinates>`.
fn read_coordinates(el: Node<'_, '_>) -> Result<Vec<Coord>> {
    let cs = el.attr("cs").unwrap_or(",");
    let ts = el.attr("ts").unwrap_or(" ");
    let decimal = el.attr("decimal").unwrap_or(".");
    let text = el.text_value();

    let tuples: Vec<&str> = if ts.trim().is_empty() {
        text.split_whitespace().collect()
    } else {
        text.split(ts).map(str::trim).filter(|t| !t.is_empty()).collect()
    };
    tuples
        .into_iter()
        .map(|tuple| {
            let values = tuple
                .split(cs)
                .map(|v| parse_number(el, &v.trim().replace(decimal, ".")))
                .collect::<Result<Vec<f64>>>()?;
            match values.as_slice() {
                [x, y] | [x, y, _] => Ok(Coord { x: *x, y: *y }),
                other => Err(arity_error(el, "two or three ordinates per tuple", other.len())),
            }
        })
        .collect()
}

/// GML 2 `<coord><X>..</X><Y>..</Y></coord>`.
fn read_coord_xy(el: Node<'_, '_>) -> Result<Coord> {
    let ordinate = |name: &str| -> Result<f64> {
        let node = child(el, name).ok_or_else(|| {
            FesError::parsing(format!("{} is missing <{}>", el.describe(), name))
        })?;
        parse_number(node, &node.text_value())
    };
    Ok(Coord {
        x: ordinate("X")?,
        y: ordinate("Y")?,
    })
}

fn child<'a, 'input>(el: Node<'a, 'input>, local: &str) -> Option<Node<'a, 'input>> {
    el.children()
        .find(|c| c.is_element() && c.tag_name().name() == local)
}

fn srs_dimension(el: Node<'_, '_>) -> Result<usize> {
    let declared = el
        .ancestors()
        .filter(|n| n.is_element())
        .find_map(|n| n.attribute("srsDimension"));
    match declared {
        None => Ok(2),
        Some("2") => Ok(2),
        Some("3") => Ok(3),
        Some(other) => Err(FesError::parsing(format!(
            "{} has unsupported srsDimension '{}'",
            el.describe(),
            other
        ))),
    }
}

fn parse_numbers(el: Node<'_, '_>) -> Result<Vec<f64>> {
    el.text_value()
        .split_whitespace()
        .map(|v| parse_number(el, v))
        .collect()
}

fn parse_number(el: Node<'_, '_>, value: &str) -> Result<f64> {
    value.parse::<f64>().map_err(|_| {
        FesError::parsing(format!("invalid coordinate '{}' in {}", value, el.describe()))
    })
}

fn arity_error(el: Node<'_, '_>, expected: &str, found: usize) -> FesError {
    FesError::parsing(format!(
        "{} requires {}, found {}",
        el.describe(),
        expected,
        found
    ))
}

fn member_error(parent: Node<'_, '_>, member: Node<'_, '_>, shape: &Shape) -> FesError {
    FesError::parsing(format!(
        "{} cannot contain {} (a {})",
        parent.describe(),
        member.describe(),
        shape_kind(shape)
    ))
}

/// Unit of a `<fes:Distance uom="...">` measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    Metre,
    Kilometre,
    Foot,
    Mile,
    NauticalMile,
    Degree,
}

impl DistanceUnit {
    pub fn from_uom(uom: &str) -> Option<Self> {
        let uom = uom.trim().to_ascii_lowercase();
        let code = uom
            .strip_prefix("urn:ogc:def:uom:epsg::")
            .or_else(|| uom.strip_prefix("urn:ogc:def:uom:epsg:"));
        if let Some(code) = code {
            return match code {
                "9001" => Some(DistanceUnit::Metre),
                "9036" => Some(DistanceUnit::Kilometre),
                "9002" => Some(DistanceUnit::Foot),
                "9030" => Some(DistanceUnit::NauticalMile),
                "9102" => Some(DistanceUnit::Degree),
                _ => None,
            };
        }
        match uom.as_str() {
            "m" | "meter" | "meters" | "metre" | "metres" => Some(DistanceUnit::Metre),
            "km" | "kilometer" | "kilometers" | "kilometre" | "kilometres" => Some(DistanceUnit::Kilometre),
            "ft" | "foot" | "feet" => Some(DistanceUnit::Foot),
            "mi" | "mile" | "miles" => Some(DistanceUnit::Mile),
            "nm" | "nmi" => Some(DistanceUnit::NauticalMile),
            "deg" | "degree" | "degrees" => Some(DistanceUnit::Degree),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            DistanceUnit::Metre => "m",
            DistanceUnit::Kilometre => "km",
            DistanceUnit::Foot => "ft",
            DistanceUnit::Mile => "mi",
            DistanceUnit::NauticalMile => "nm",
            DistanceUnit::Degree => "deg",
        }
    }

    /// Metres per unit; `None` for angular units.
    fn metres(self) -> Option<f64> {
        match self {
            DistanceUnit::Metre => Some(1.0),
            DistanceUnit::Kilometre => Some(1000.0),
            DistanceUnit::Foot => Some(0.3048),
            DistanceUnit::Mile => Some(1609.344),
            DistanceUnit::NauticalMile => Some(1852.0),
            DistanceUnit::Degree => None,
        }
    }
}

/// A measured distance, e.g. `10 m`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Distance {
    pub value: f64,
    pub unit: DistanceUnit,
}

impl Distance {
    pub fn new(value: f64, unit: DistanceUnit) -> Self {
        Self { value, unit }
    }

    pub fn parse(value: &str, uom: &str) -> Result<Self> {
        let unit = DistanceUnit::from_uom(uom)
            .ok_or_else(|| FesError::parsing(format!("Unsupported distance unit '{uom}'")))?;
        let value = value
            .trim()
            .parse::<f64>()
            .map_err(|_| FesError::parsing(format!("Invalid distance value '{}'", value.trim())))?;
        Ok(Self::new(value, unit))
    }

    pub fn to_metres(&self) -> Option<f64> {
        self.unit.metres().map(|factor| self.value * factor)
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;
    use geo_types::{line_string, point, polygon};
    use rstest::rstest;

    fn geometry(text: &str) -> Result<Geometry> {
        let doc = parse_document(text)?;
        parse_geometry(doc.root_element())
    }

    #[test]
    fn test_point_with_pos() {
        let geom = geometry(&format!(
            r#"<gml:Point xmlns:gml="{GML32}" srsName="EPSG:28992"><gml:pos>155000 463000</gml:pos></gml:Point>"#
        ))
        .unwrap();
        assert_eq!(geom.value.shape, Shape::Point(point!(x: 155000.0, y: 463000.0)));
        assert_eq!(geom.value.srid, Some(28992));
        assert_eq!(geom.locator, "Point");
    }

    #[test]
    fn test_north_east_axes_are_swapped() {
        let geom = geometry(&format!(
            r#"<gml:Point xmlns:gml="{GML32}" gml:id="P1" srsName="urn:ogc:def:crs:EPSG::4326"><gml:pos>52.1 5.3</gml:pos></gml:Point>"#
        ))
        .unwrap();
        assert_eq!(geom.value.shape, Shape::Point(point!(x: 5.3, y: 52.1)));
        assert_eq!(geom.locator, "P1");
    }

    #[test]
    fn test_srs_name_is_inherited_from_ancestor() {
        let text = format!(
            r#"<gml:MultiPoint xmlns:gml="{GML32}" srsName="EPSG:4326">
                 <gml:pointMember><gml:Point><gml:pos>1 2</gml:pos></gml:Point></gml:pointMember>
                 <gml:pointMember><gml:Point><gml:pos>3 4</gml:pos></gml:Point></gml:pointMember>
               </gml:MultiPoint>"#
        );
        let geom = geometry(&text).unwrap();
        assert_eq!(
            geom.value.shape,
            Shape::MultiPoint(MultiPoint(vec![point!(x: 1.0, y: 2.0), point!(x: 3.0, y: 4.0)]))
        );
    }

    #[test]
    fn test_missing_srs_name_is_rejected() {
        let err = geometry(&format!(
            r#"<gml:Point xmlns:gml="{GML32}"><gml:pos>1 2</gml:pos></gml:Point>"#
        ))
        .unwrap_err();
        assert!(matches!(err, FesError::ExternalParsing(m) if m.contains("srsName")));
    }

    #[test]
    fn test_envelope_from_corners() {
        let geom = geometry(&format!(
            r#"<gml:Envelope xmlns:gml="{GML21}" srsName="EPSG:4326">
                 <gml:lowerCorner>13.0983 31.5899</gml:lowerCorner>
                 <gml:upperCorner>35.5472 42.8143</gml:upperCorner>
               </gml:Envelope>"#
        ))
        .unwrap();
        assert_eq!(
            geom.value.shape,
            Shape::Polygon(polygon![
                (x: 13.0983, y: 31.5899),
                (x: 13.0983, y: 42.8143),
                (x: 35.5472, y: 42.8143),
                (x: 35.5472, y: 31.5899),
                (x: 13.0983, y: 31.5899),
            ])
        );
    }

    #[test]
    fn test_polygon_pos_list_and_gml2_coordinates() {
        let pos_list = geometry(&format!(
            r#"<gml:Polygon xmlns:gml="{GML32}" srsName="EPSG:28992"><gml:exterior><gml:LinearRing>
                 <gml:posList>0 0 0 10 10 10 0 0</gml:posList>
               </gml:LinearRing></gml:exterior></gml:Polygon>"#
        ))
        .unwrap();
        let coordinates = geometry(&format!(
            r#"<gml:Polygon xmlns:gml="{GML21}" srsName="EPSG:28992"><gml:outerBoundaryIs><gml:LinearRing>
                 <gml:coordinates>0,0 0,10 10,10 0,0</gml:coordinates>
               </gml:LinearRing></gml:outerBoundaryIs></gml:Polygon>"#
        ))
        .unwrap();
        assert_eq!(pos_list.value, coordinates.value);
        assert_eq!(
            pos_list.value.shape,
            Shape::Polygon(polygon![(x: 0.0, y: 0.0), (x: 0.0, y: 10.0), (x: 10.0, y: 10.0), (x: 0.0, y: 0.0)])
        );
        assert!(pos_list.value.wkt().starts_with("POLYGON"));
    }

    #[test]
    fn test_three_dimensional_pos_list() {
        let geom = geometry(&format!(
            r#"<gml:LineString xmlns:gml="{GML32}" srsName="EPSG:28992" srsDimension="3">
                 <gml:posList>1 2 3 4 5 6</gml:posList></gml:LineString>"#
        ))
        .unwrap();
        assert_eq!(geom.value.shape, Shape::LineString(line_string![(x: 1.0, y: 2.0), (x: 4.0, y: 5.0)]));
    }

    #[test]
    fn test_open_ring_is_rejected() {
        let err = geometry(&format!(
            r#"<gml:Polygon xmlns:gml="{GML32}" srsName="EPSG:28992"><gml:exterior><gml:LinearRing>
                 <gml:posList>0 0 0 10 10 10 5 5</gml:posList>
               </gml:LinearRing></gml:exterior></gml:Polygon>"#
        ))
        .unwrap_err();
        assert!(err.to_string().contains("not closed"));
    }

    #[test]
    fn test_coord_xy() {
        let geom = geometry(&format!(
            r#"<gml:Point xmlns:gml="{GML21}" srsName="EPSG:4326"><gml:coord><gml:X>4.5</gml:X><gml:Y>52</gml:Y></gml:coord></gml:Point>"#
        ))
        .unwrap();
        assert_eq!(geom.value.shape, Shape::Point(point!(x: 4.5, y: 52.0)));
    }

    #[rstest]
    #[case("m", 10.0, Some(10.0))]
    #[case("km", 1.5, Some(1500.0))]
    #[case("urn:ogc:def:uom:EPSG::9001", 10.0, Some(10.0))]
    #[case("ft", 10.0, Some(3.048))]
    #[case("nm", 1.0, Some(1852.0))]
    #[case("deg", 0.5, None)]
    fn test_distance_units(#[case] uom: &str, #[case] value: f64, #[case] metres: Option<f64>) {
        let distance = Distance::parse(&value.to_string(), uom).unwrap();
        match (distance.to_metres(), metres) {
            (Some(actual), Some(expected)) => assert!((actual - expected).abs() < 1e-9),
            (actual, expected) => assert_eq!(actual, expected),
        }
    }

    #[test]
    fn test_distance_errors_and_display() {
        assert!(Distance::parse("10", "furlong").is_err());
        assert!(Distance::parse("ten", "m").is_err());
        assert_eq!(Distance::parse(" 10 ", "m").unwrap().to_string(), "10 m");
    }
}
