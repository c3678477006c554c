use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::fetch::{HttpClient, get_with_query, send_json};
use crate::model::Coordinate;
use crate::services::{RoadSnapper, SnapResult};

pub const NEAREST_ROADS_URL: &str = "https://roads.googleapis.com/v1/nearestRoads";
/// Hard limit of the `points` parameter.
pub const ROADS_MAX_POINTS: usize = 100;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NearestRoadsResponse {
    #[serde(default)]
    snapped_points: Vec<SnappedPoint>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnappedPoint {
    location: LatLng,
    original_index: Option<usize>,
}

#[derive(Deserialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

/// Snaps points with the Roads API. The wrapped client must add the API
/// key (see [`crate::fetch::auth::UrlParam`]).
pub struct RoadsClient<C> {
    client: C,
    url: String,
    batch_size: usize,
}

impl<C: HttpClient> RoadsClient<C> {
    /// `batch_size` is clamped to `1..=100`.
    pub fn new(client: C, url: &str, batch_size: usize) -> Self {
        Self {
            client,
            url: url.to_string(),
            batch_size: batch_size.clamp(1, ROADS_MAX_POINTS),
        }
    }
}

#[async_trait]
impl<C: HttpClient> RoadSnapper for RoadsClient<C> {
    fn max_batch_size(&self) -> usize {
        self.batch_size
    }

    async fn snap_batch(&self, coords: &[Coordinate]) -> Result<Vec<SnapResult>, ServiceError> {
        if coords.is_empty() {
            return Ok(Vec::new());
        }
        if coords.len() > self.batch_size {
            return Err(ServiceError::InvalidRequest(format!(
                "batch of {} exceeds the limit of {}",
                coords.len(),
                self.batch_size
            )));
        }
        let points = coords
            .iter()
            .map(Coordinate::to_string)
            .collect::<Vec<_>>()
            .join("|");
        let req = get_with_query(&self.url, &[("points", &points)])?;
        let value = send_json(&self.client, req).await?;
        parse_nearest_roads(value, coords.len())
    }
}

/// Maps a `nearestRoads` response back onto its `len` inputs. Inputs with no
/// entry have no nearby road; when an input has several entries (a point
/// near a two-way road) the first wins.
pub fn parse_nearest_roads(value: serde_json::Value, len: usize) -> Result<Vec<SnapResult>, ServiceError> {
    let resp: NearestRoadsResponse = serde_json::from_value(value).map_err(|e| ServiceError::Parse {
        message: format!("unexpected nearestRoads response: {e}"),
    })?;

    let mut results = vec![SnapResult::NoNearbyRoad; len];
    let mut filled = vec![false; len];
    for p in resp.snapped_points {
        let Some(i) = p.original_index else {
            continue;
        };
        if i >= len {
            warn!(index = i, len, "nearestRoads returned an out-of-range originalIndex");
            continue;
        }
        if !filled[i] {
            filled[i] = true;
            results[i] = SnapResult::Snapped(Coordinate::new(p.location.latitude, p.location.longitude));
        }
    }
    debug!(
        inputs = len,
        snapped = filled.iter().filter(|f| **f).count(),
        "Snapped batch"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_nearest_roads_fills_every_slot() {
        let value = json!({
            "snappedPoints": [
                {"location": {"latitude": 1.5, "longitude": 2.5}, "originalIndex": 2, "placeId": "a"},
                {"location": {"latitude": 9.0, "longitude": 9.0}, "originalIndex": 2, "placeId": "b"},
                {"location": {"latitude": 0.5, "longitude": 0.5}, "originalIndex": 0, "placeId": "c"}
            ]
        });
        let results = parse_nearest_roads(value, 3).unwrap();
        assert_eq!(
            results,
            vec![
                SnapResult::Snapped(Coordinate::new(0.5, 0.5)),
                SnapResult::NoNearbyRoad,
                SnapResult::Snapped(Coordinate::new(1.5, 2.5)),
            ]
        );
    }

    #[test]
    fn test_parse_nearest_roads_empty_body() {
        let results = parse_nearest_roads(json!({}), 2).unwrap();
        assert_eq!(results, vec![SnapResult::NoNearbyRoad; 2]);
    }

    #[test]
    fn test_parse_nearest_roads_ignores_out_of_range() {
        let value = json!({
            "snappedPoints": [
                {"location": {"latitude": 1.0, "longitude": 1.0}, "originalIndex": 7}
            ]
        });
        assert_eq!(parse_nearest_roads(value, 1).unwrap(), vec![SnapResult::NoNearbyRoad]);
    }

    #[test]
    fn test_batch_size_is_clamped() {
        let client = crate::fetch::BasicClient::new(std::time::Duration::from_secs(1)).unwrap();
        assert_eq!(RoadsClient::new(client, NEAREST_ROADS_URL, 500).max_batch_size(), 100);
    }
}
