//! Data types of the statistics report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::stats::CityStatistics;

/// Statistics for one place.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceReport {
    pub place_id: String,
    pub display_name: String,
    pub granularity: Option<i64>,
    /// Stored routes for the place, whatever their status.
    pub routes: usize,
    pub routes_found: usize,
    pub statistics: Option<CityStatistics>,
}

/// Complete report, written as JSON by the `report` command.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub generated_at: DateTime<Utc>,
    pub places: Vec<PlaceReport>,
    /// All places pooled together.
    pub total: Option<CityStatistics>,
}
