//! Configurable column names for the three tables.
//!
//! Every field has a default, so a configuration only needs to name the
//! columns it renames.

use std::collections::HashSet;

use serde::Deserialize;

use super::Table;
use crate::error::PipelineError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaceColumns {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub lat_min: String,
    pub lat_max: String,
    pub lon_min: String,
    pub lon_max: String,
    pub granularity: String,
    pub polygon: String,
}

impl Default for PlaceColumns {
    fn default() -> Self {
        Self {
            id: "place_id".into(),
            name: "name".into(),
            display_name: "display_name".into(),
            lat_min: "lat_min".into(),
            lat_max: "lat_max".into(),
            lon_min: "lon_min".into(),
            lon_max: "lon_max".into(),
            granularity: "granularity".into(),
            polygon: "polygon_geojson".into(),
        }
    }
}

impl PlaceColumns {
    pub fn header(&self) -> Vec<String> {
        [
            &self.id,
            &self.name,
            &self.display_name,
            &self.lat_min,
            &self.lat_max,
            &self.lon_min,
            &self.lon_max,
            &self.granularity,
            &self.polygon,
        ]
        .into_iter()
        .cloned()
        .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PointColumns {
    pub place_id: String,
    pub grid_index: String,
    pub grid_lat: String,
    pub grid_lon: String,
    pub snapped_id: String,
    pub snapped_lat: String,
    pub snapped_lon: String,
    pub status: String,
}

impl Default for PointColumns {
    fn default() -> Self {
        Self {
            place_id: "place_id".into(),
            grid_index: "grid_index".into(),
            grid_lat: "grid_lat".into(),
            grid_lon: "grid_lon".into(),
            snapped_id: "snapped_id".into(),
            snapped_lat: "snapped_lat".into(),
            snapped_lon: "snapped_lon".into(),
            status: "status".into(),
        }
    }
}

impl PointColumns {
    pub fn header(&self) -> Vec<String> {
        [
            &self.place_id,
            &self.grid_index,
            &self.grid_lat,
            &self.grid_lon,
            &self.snapped_id,
            &self.snapped_lat,
            &self.snapped_lon,
            &self.status,
        ]
        .into_iter()
        .cloned()
        .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectionColumns {
    pub place_id: String,
    pub origin_id: String,
    pub destination_id: String,
    pub status: String,
    pub maneuvers: String,
    pub turns: String,
    pub transitions: String,
    pub alternating_fraction: String,
}

impl Default for DirectionColumns {
    fn default() -> Self {
        Self {
            place_id: "place_id".into(),
            origin_id: "origin_id".into(),
            destination_id: "destination_id".into(),
            status: "status".into(),
            maneuvers: "maneuvers".into(),
            turns: "turns".into(),
            transitions: "transitions".into(),
            alternating_fraction: "alternating_fraction".into(),
        }
    }
}

impl DirectionColumns {
    pub fn header(&self) -> Vec<String> {
        [
            &self.place_id,
            &self.origin_id,
            &self.destination_id,
            &self.status,
            &self.maneuvers,
            &self.turns,
            &self.transitions,
            &self.alternating_fraction,
        ]
        .into_iter()
        .cloned()
        .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Schema {
    pub places: PlaceColumns,
    pub points: PointColumns,
    pub directions: DirectionColumns,
}

impl Schema {
    pub fn header(&self, table: Table) -> Vec<String> {
        match table {
            Table::Places => self.places.header(),
            Table::Points => self.points.header(),
            Table::Directions => self.directions.header(),
        }
    }

    /// Column names must be non-empty and unique within a table.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for table in Table::ALL {
            let header = self.header(table);
            if let Some(blank) = header.iter().position(|c| c.trim().is_empty()) {
                return Err(PipelineError::InvalidConfig(format!(
                    "column {blank} of table {table} has an empty name"
                )));
            }
            let mut seen = HashSet::new();
            if let Some(dup) = header.iter().find(|c| !seen.insert(c.as_str())) {
                return Err(PipelineError::InvalidConfig(format!(
                    "column '{dup}' appears twice in table {table}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema_is_valid() {
        Schema::default().validate().unwrap();
        assert_eq!(Schema::default().header(Table::Directions).len(), 8);
    }

    #[test]
    fn test_partial_override() {
        let schema: Schema =
            serde_json::from_str(r#"{"points": {"status": "kept_or_dropped"}}"#).unwrap();
        assert_eq!(schema.points.status, "kept_or_dropped");
        assert_eq!(schema.points.grid_index, "grid_index");
        schema.validate().unwrap();
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let schema: Schema =
            serde_json::from_str(r#"{"directions": {"turns": "status"}}"#).unwrap();
        assert!(matches!(
            schema.validate(),
            Err(PipelineError::InvalidConfig(m)) if m.contains("'status'")
        ));
    }
}
