//! Grid sampling of a place boundary.
//!
//! The bounding box is split into `g × g` equal cells and one candidate is
//! placed at the centre of each cell, so every candidate lies strictly
//! inside the box and exactly `g²` candidates are produced. Candidates are
//! kept when the boundary polygon contains them. Containment follows
//! [`geo::Contains`]: points on the polygon boundary are *excluded*, so two
//! places sharing an edge never both claim a point on it.

use geo::{Contains, CoordsIter, MultiPolygon};
use tracing::debug;

use crate::error::PipelineError;
use crate::model::{BoundingBox, Coordinate};

/// A raw grid candidate. `index` is its position in the full row-major
/// `g × g` grid (latitude rows, longitude columns), so it stays stable when
/// other candidates are filtered out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub index: usize,
    pub coord: Coordinate,
}

/// Checks that a boundary has at least one closed ring of three distinct
/// vertices and no non-finite coordinates.
pub fn validate_polygon(polygon: &MultiPolygon<f64>) -> Result<(), PipelineError> {
    if polygon.0.is_empty() {
        return Err(PipelineError::MalformedPolygon("no polygons".into()));
    }
    for (i, poly) in polygon.0.iter().enumerate() {
        // Rings are stored closed, so a triangle has four coordinates.
        if poly.exterior().0.len() < 4 {
            return Err(PipelineError::MalformedPolygon(format!(
                "polygon {i} has fewer than 3 vertices"
            )));
        }
    }
    if polygon.coords_iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(PipelineError::MalformedPolygon(
            "non-finite coordinate".into(),
        ));
    }
    Ok(())
}

/// Generates the full `g × g` grid of cell-centre candidates over `bbox`.
pub fn generate_grid(bbox: &BoundingBox, granularity: i64) -> Result<Vec<GridPoint>, PipelineError> {
    if granularity <= 0 {
        return Err(PipelineError::InvalidGranularity(granularity));
    }
    let g = granularity as usize;
    let dlat = (bbox.lat_max - bbox.lat_min) / g as f64;
    let dlon = (bbox.lon_max - bbox.lon_min) / g as f64;

    let mut points = Vec::with_capacity(g * g);
    for row in 0..g {
        let lat = bbox.lat_min + (row as f64 + 0.5) * dlat;
        for col in 0..g {
            let lon = bbox.lon_min + (col as f64 + 0.5) * dlon;
            points.push(GridPoint {
                index: row * g + col,
                coord: Coordinate::new(lat, lon),
            });
        }
    }
    Ok(points)
}

/// Samples `bbox` at `granularity` and keeps the candidates inside
/// `polygon`. A polygon that lies entirely outside the box yields an empty
/// result.
pub fn sample_polygon(
    bbox: &BoundingBox,
    polygon: &MultiPolygon<f64>,
    granularity: i64,
) -> Result<Vec<GridPoint>, PipelineError> {
    validate_polygon(polygon)?;
    let candidates = generate_grid(bbox, granularity)?;
    let total = candidates.len();

    let kept: Vec<GridPoint> = candidates
        .into_iter()
        .filter(|p| polygon.contains(&p.coord.to_point()))
        .collect();

    debug!(granularity, candidates = total, kept = kept.len(), "Grid sampled");
    Ok(kept)
}
