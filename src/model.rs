//! Core value types shared by every pipeline stage.

use std::fmt;

use geo::{BoundingRect, MultiPolygon};
use geojson::GeoJson;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// A WGS84 latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Exact bit-level identity, used to merge points that snapped to the
    /// same road location.
    pub fn key(&self) -> (u64, u64) {
        (self.lat.to_bits(), self.lon.to_bits())
    }

    /// `geo` points are (x, y) = (lon, lat).
    pub fn to_point(self) -> geo::Point<f64> {
        geo::Point::new(self.lon, self.lat)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

/// Axis-aligned latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    /// Builds a box, rejecting inverted or non-finite bounds.
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Result<Self, PipelineError> {
        let finite = [lat_min, lat_max, lon_min, lon_max]
            .iter()
            .all(|v| v.is_finite());
        if !finite || lat_min > lat_max || lon_min > lon_max {
            return Err(PipelineError::MalformedPolygon(format!(
                "invalid bounding box lat [{lat_min}, {lat_max}] lon [{lon_min}, {lon_max}]"
            )));
        }
        Ok(Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        })
    }

    /// The smallest box covering a boundary polygon.
    pub fn of_polygon(polygon: &MultiPolygon<f64>) -> Result<Self, PipelineError> {
        let rect = polygon
            .bounding_rect()
            .ok_or_else(|| PipelineError::MalformedPolygon("polygon has no vertices".into()))?;
        Self::new(rect.min().y, rect.max().y, rect.min().x, rect.max().x)
    }

    pub fn contains(&self, c: Coordinate) -> bool {
        c.lat >= self.lat_min && c.lat <= self.lat_max && c.lon >= self.lon_min && c.lon <= self.lon_max
    }

    /// True when `other` lies entirely inside this box.
    pub fn covers(&self, other: &BoundingBox) -> bool {
        self.contains(Coordinate::new(other.lat_min, other.lon_min))
            && self.contains(Coordinate::new(other.lat_max, other.lon_max))
    }
}

/// An analyzed city: its boundary as returned by the geocoder plus the grid
/// granularity used to sample it. Immutable once created.
#[derive(Debug, Clone)]
pub struct Place {
    /// Stable identifier (OSM id for geocoded places).
    pub id: String,
    /// Name as configured, e.g. "Boston, Massachusetts, USA".
    pub name: String,
    pub display_name: String,
    pub boundary: MultiPolygon<f64>,
    pub bbox: BoundingBox,
    pub granularity: i64,
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// Accepts `Polygon` and `MultiPolygon` boundaries.
pub fn boundary_from_geometry(geometry: geo::Geometry<f64>) -> Result<MultiPolygon<f64>, PipelineError> {
    match geometry {
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        geo::Geometry::Polygon(p) => Ok(MultiPolygon(vec![p])),
        other => Err(PipelineError::MalformedPolygon(format!(
            "boundary is a {}, not a polygon",
            geometry_kind(&other)
        ))),
    }
}

/// Parses a boundary stored as a GeoJSON geometry string.
pub fn boundary_from_geojson(s: &str) -> Result<MultiPolygon<f64>, PipelineError> {
    let geojson: GeoJson = s
        .parse()
        .map_err(|e| PipelineError::MalformedPolygon(format!("invalid GeoJSON: {e}")))?;
    let GeoJson::Geometry(geometry) = geojson else {
        return Err(PipelineError::MalformedPolygon(
            "GeoJSON is not a bare geometry".into(),
        ));
    };
    let geometry: geo::Geometry<f64> = geometry
        .try_into()
        .map_err(|e| PipelineError::MalformedPolygon(format!("{e}")))?;
    boundary_from_geometry(geometry)
}

pub fn boundary_to_geojson(boundary: &MultiPolygon<f64>) -> String {
    geojson::Geometry::new(geojson::Value::from(boundary)).to_string()
}

fn geometry_kind(g: &geo::Geometry<f64>) -> &'static str {
    match g {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}
