//! Geometry values handed to the query executor.
//!
//! Shapes are `geo-types` geometries; WKT comes from the `wkt` crate and GeoJSON
//! from the `geojson` crate. This module only adds the SRID, the envelope
//! polygon and the north/east axis swap. No geometric algorithms run here.

use geo_types::{Geometry, LineString, Polygon, Rect};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use wkt::ToWkt;

pub type Coord = geo_types::Coord<f64>;
pub type Shape = Geometry<f64>;

/// Bounding box of a geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeometryValue {
    pub shape: Shape,
    pub srid: Option<u32>,
}

impl GeometryValue {
    pub fn new(shape: impl Into<Shape>, srid: Option<u32>) -> Self {
        Self {
            shape: shape.into(),
            srid,
        }
    }

    /// Closed polygon covering the box between two corners, starting at `lower`.
    pub fn from_envelope(lower: Coord, upper: Coord, srid: Option<u32>) -> Self {
        let ring = LineString::from(vec![
            (lower.x, lower.y),
            (lower.x, upper.y),
            (upper.x, upper.y),
            (upper.x, lower.y),
            (lower.x, lower.y),
        ]);
        Self::new(Polygon::new(ring, vec![]), srid)
    }

    pub fn with_srid(mut self, srid: u32) -> Self {
        self.srid = Some(srid);
        self
    }

    pub fn kind(&self) -> &'static str {
        shape_kind(&self.shape)
    }

    /// Turn latitude/longitude ordered input into x/y order.
    pub fn swap_axes(&mut self) {
        visit_coords_mut(&mut self.shape, &mut |c| std::mem::swap(&mut c.x, &mut c.y));
    }

    pub fn extent(&self) -> Option<Extent> {
        let mut extent: Option<Extent> = None;
        let mut shape = self.shape.clone();
        visit_coords_mut(&mut shape, &mut |c| {
            let e = extent.get_or_insert(Extent {
                min_x: c.x,
                min_y: c.y,
                max_x: c.x,
                max_y: c.y,
            });
            e.min_x = e.min_x.min(c.x);
            e.min_y = e.min_y.min(c.y);
            e.max_x = e.max_x.max(c.x);
            e.max_y = e.max_y.max(c.y);
        });
        extent
    }

    pub fn wkt(&self) -> String {
        self.shape.wkt_string()
    }

    /// WKT prefixed with `SRID=n;` when the SRID is known.
    pub fn ewkt(&self) -> String {
        match self.srid {
            Some(srid) => format!("SRID={};{}", srid, self.wkt()),
            None => self.wkt(),
        }
    }

    pub fn geojson(&self) -> geojson::Geometry {
        geojson::Geometry::new(geojson::Value::from(&self.shape))
    }
}

impl Serialize for GeometryValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("GeometryValue", 3)?;
        state.serialize_field("srid", &self.srid)?;
        state.serialize_field("wkt", &self.wkt())?;
        state.serialize_field("geojson", &self.geojson())?;
        state.end()
    }
}

/// Name of the geometry variant, as used in messages.
pub fn shape_kind(shape: &Shape) -> &'static str {
    match shape {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

fn visit_line_mut(line: &mut LineString<f64>, f: &mut impl FnMut(&mut Coord)) {
    line.0.iter_mut().for_each(f);
}

fn visit_polygon_mut(polygon: &mut Polygon<f64>, f: &mut impl FnMut(&mut Coord)) {
    polygon.exterior_mut(|ring| visit_line_mut(ring, f));
    polygon.interiors_mut(|rings| rings.iter_mut().for_each(|ring| visit_line_mut(ring, f)));
}

fn visit_coords_mut(shape: &mut Shape, f: &mut impl FnMut(&mut Coord)) {
    match shape {
        Geometry::Point(p) => f(&mut p.0),
        Geometry::Line(l) => {
            f(&mut l.start);
            f(&mut l.end);
        }
        Geometry::LineString(l) => visit_line_mut(l, f),
        Geometry::Polygon(p) => visit_polygon_mut(p, f),
        Geometry::MultiPoint(mp) => mp.0.iter_mut().for_each(|p| f(&mut p.0)),
        Geometry::MultiLineString(ml) => ml.0.iter_mut().for_each(|l| visit_line_mut(l, f)),
        Geometry::MultiPolygon(mp) => mp.0.iter_mut().for_each(|p| visit_polygon_mut(p, f)),
        Geometry::GeometryCollection(gc) => gc.0.iter_mut().for_each(|g| visit_coords_mut(g, f)),
        Geometry::Rect(r) => {
            let (mut min, mut max) = (r.min(), r.max());
            f(&mut min);
            f(&mut max);
            *r = Rect::new(min, max);
        }
        Geometry::Triangle(t) => {
            f(&mut t.0);
            f(&mut t.1);
            f(&mut t.2);
        }
    }
}
