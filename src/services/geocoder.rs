//! Place-name to boundary-polygon lookup.

use async_trait::async_trait;
use geo::Geometry;

use crate::error::ServiceError;
use crate::model::BoundingBox;

/// Boundary data for one place as returned by the geocoder.
#[derive(Debug, Clone)]
pub struct PlaceBoundary {
    pub id: String,
    pub display_name: String,
    /// Provider bounding box; derived from the polygon when absent.
    pub bbox: Option<BoundingBox>,
    /// Boundary geometry as delivered. Anything other than a polygon or
    /// multipolygon is rejected when the place is built.
    pub boundary: Geometry<f64>,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Returns `Ok(None)` when the provider knows no such place.
    async fn lookup(&self, name: &str) -> Result<Option<PlaceBoundary>, ServiceError>;
}
