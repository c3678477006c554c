//! OpenStreetMap Nominatim geocoder.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::ServiceError;
use crate::fetch::{HttpClient, get_with_query, send_json};
use crate::model::BoundingBox;
use crate::services::{Geocoder, PlaceBoundary};

pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Deserialize)]
struct SearchHit {
    osm_type: Option<String>,
    osm_id: Option<u64>,
    place_id: Option<u64>,
    display_name: String,
    /// `[south, north, west, east]` as decimal strings.
    boundingbox: Option<Vec<String>>,
    geojson: Option<geojson::Geometry>,
}

pub struct NominatimClient<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> NominatimClient<C> {
    /// `client` must send a descriptive User-Agent; Nominatim's usage
    /// policy rejects anonymous clients.
    pub fn new(client: C, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> Geocoder for NominatimClient<C> {
    #[tracing::instrument(skip(self))]
    async fn lookup(&self, name: &str) -> Result<Option<PlaceBoundary>, ServiceError> {
        let url = format!("{}/search", self.base_url);
        let req = get_with_query(
            &url,
            &[
                ("q", name),
                ("format", "jsonv2"),
                ("polygon_geojson", "1"),
                ("limit", "1"),
            ],
        )?;
        let value = send_json(&self.client, req).await?;
        parse_search(value)
    }
}

/// Decodes a `/search` response. An empty result list is `Ok(None)`.
pub fn parse_search(value: serde_json::Value) -> Result<Option<PlaceBoundary>, ServiceError> {
    let hits: Vec<SearchHit> = serde_json::from_value(value).map_err(|e| ServiceError::Parse {
        message: format!("unexpected Nominatim response: {e}"),
    })?;
    let Some(hit) = hits.into_iter().next() else {
        return Ok(None);
    };

    let id = match (&hit.osm_type, hit.osm_id, hit.place_id) {
        (Some(kind), Some(osm_id), _) => format!("{kind}/{osm_id}"),
        (_, _, Some(place_id)) => place_id.to_string(),
        _ => hit.display_name.clone(),
    };

    let geometry = hit.geojson.ok_or_else(|| ServiceError::Parse {
        message: format!("no boundary geometry for {}", hit.display_name),
    })?;
    let boundary: geo::Geometry<f64> = geometry.try_into().map_err(|e| ServiceError::Parse {
        message: format!("invalid boundary geometry: {e}"),
    })?;

    let bbox = hit.boundingbox.as_deref().map(parse_bbox).transpose()?;
    debug!(%id, display_name = %hit.display_name, "Geocoded place");

    Ok(Some(PlaceBoundary {
        id,
        display_name: hit.display_name,
        bbox,
        boundary,
    }))
}

fn parse_bbox(raw: &[String]) -> Result<BoundingBox, ServiceError> {
    let parsed = raw
        .iter()
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServiceError::Parse {
            message: format!("bad boundingbox value: {e}"),
        })?;
    let [south, north, west, east] = parsed[..] else {
        return Err(ServiceError::Parse {
            message: format!("boundingbox has {} values, expected 4", parsed.len()),
        });
    };
    BoundingBox::new(south, north, west, east).map_err(|e| ServiceError::Parse {
        message: e.to_string(),
    })
}
