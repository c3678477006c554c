//! Per-place orchestration: geocode, sample, snap, route, extract turns and
//! aggregate. Each stage fully materializes its output before the next one
//! starts; the only state shared between concurrent calls is the dispatch
//! queue inside each stage.
//!
//! Persistence is not part of [`Pipeline::run_place`]: the returned
//! [`PlaceRun`] holds everything needed to write the tables, so a failed
//! write can be retried without recomputing anything.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::grid::{GridPoint, sample_polygon, validate_polygon};
use crate::model::{BoundingBox, Place, boundary_from_geometry};
use crate::routes::{CallGuard, PairMode, RouteOutcome, RoutePair, RouteRecord, RouteStage, plan_pairs, planned_calls};
use crate::services::Geocoder;
use crate::snap::{SnapReport, SnapStage};
use crate::stats::{CityStatistics, TransitionCounts};
use crate::turns::{TurnClassifier, TurnSequence};

/// Counts that accompany every run's statistics, so dropped data is visible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub points_sampled: usize,
    pub points_no_road: usize,
    pub points_snap_failed: usize,
    pub points_merged: usize,
    pub snapped_points: usize,
    pub routes_planned: u64,
    /// Routes actually requested: everything not skipped.
    pub routes_attempted: usize,
    pub routes_not_found: usize,
    pub routes_failed: usize,
    pub routes_skipped: usize,
    pub routes_with_ratio: usize,
}

impl RunSummary {
    pub fn new(grid: &[GridPoint], snap: &SnapReport, planned: u64, routes: &[RouteAnalysis]) -> Self {
        let count = |f: fn(&RouteOutcome) -> bool| routes.iter().filter(|r| f(&r.outcome)).count();
        let skipped = count(|o| matches!(o, RouteOutcome::Skipped));
        Self {
            points_sampled: grid.len(),
            points_no_road: snap.no_road(),
            points_snap_failed: snap.failed(),
            points_merged: snap.merged(),
            snapped_points: snap.points.len(),
            routes_planned: planned,
            routes_attempted: routes.len() - skipped,
            routes_not_found: count(|o| matches!(o, RouteOutcome::NotFound)),
            routes_failed: count(|o| matches!(o, RouteOutcome::Failed { .. })),
            routes_skipped: skipped,
            routes_with_ratio: routes.iter().filter(|r| r.fraction.is_some()).count(),
        }
    }
}

/// One routed pair with its derived turn data.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteAnalysis {
    pub pair: RoutePair,
    pub outcome: RouteOutcome,
    /// Present only for found routes.
    pub turns: Option<TurnSequence>,
    pub counts: Option<TransitionCounts>,
    /// Undefined for sequences shorter than two turns.
    pub fraction: Option<f64>,
}

/// Extracts turn sequences and transition data from routing results.
pub fn analyze_routes(records: Vec<RouteRecord>, classifier: &TurnClassifier) -> Vec<RouteAnalysis> {
    records
        .into_iter()
        .map(|record| {
            let turns = record.outcome.maneuvers().map(|m| classifier.extract(m));
            let counts = turns.as_ref().map(TransitionCounts::from_sequence);
            let fraction = counts.as_ref().and_then(TransitionCounts::alternating_fraction);
            RouteAnalysis {
                pair: record.pair,
                outcome: record.outcome,
                turns,
                counts,
                fraction,
            }
        })
        .collect()
}

/// Everything computed for one place.
#[derive(Debug, Clone)]
pub struct PlaceRun {
    pub place: Place,
    /// Grid points inside the boundary, in grid order.
    pub grid: Vec<GridPoint>,
    pub snap: SnapReport,
    pub routes: Vec<RouteAnalysis>,
    /// `None` when no route produced a ratio.
    pub statistics: Option<CityStatistics>,
    pub summary: RunSummary,
}

impl PlaceRun {
    pub fn fractions(&self) -> Vec<f64> {
        self.routes.iter().filter_map(|r| r.fraction).collect()
    }
}

/// Output of a dry run: no paid calls are issued.
#[derive(Debug, Clone, Serialize)]
pub struct PlacePlan {
    pub place_id: String,
    pub display_name: String,
    pub granularity: i64,
    pub grid_points: usize,
    /// Routing calls if every sampled point snaps to a distinct road
    /// location.
    pub worst_case_calls: u64,
    /// Road snap calls needed for the sampled points.
    pub snap_calls: usize,
}

pub struct Pipeline {
    pub geocoder: Arc<dyn Geocoder>,
    pub snap: SnapStage,
    pub routes: RouteStage,
    pub classifier: TurnClassifier,
    pub pair_mode: PairMode,
    pub guard: CallGuard,
}

/// Looks a place up and validates its boundary. Granularity is checked
/// before the geocoder is called.
#[tracing::instrument(skip(geocoder))]
pub async fn resolve_place(geocoder: &dyn Geocoder, name: &str, granularity: i64) -> Result<Place, PipelineError> {
    if granularity <= 0 {
        return Err(PipelineError::InvalidGranularity(granularity));
    }
    let found = geocoder
        .lookup(name)
        .await
        .map_err(PipelineError::Geocoder)?
        .ok_or_else(|| PipelineError::PlaceNotFound(name.to_string()))?;

    let boundary = boundary_from_geometry(found.boundary)?;
    validate_polygon(&boundary)?;
    let own = BoundingBox::of_polygon(&boundary)?;
    let bbox = match found.bbox {
        Some(bbox) if bbox.covers(&own) => bbox,
        Some(bbox) => {
            warn!(?bbox, polygon = ?own, "Provider bounding box does not cover the boundary, using the polygon's");
            own
        }
        None => own,
    };
    info!(id = %found.id, display_name = %found.display_name, "Resolved place");

    Ok(Place {
        id: found.id,
        name: name.to_string(),
        display_name: found.display_name,
        boundary,
        bbox,
        granularity,
    })
}

/// Geocodes and samples a place and reports the calls a run would need.
pub async fn plan_place(
    geocoder: &dyn Geocoder,
    name: &str,
    granularity: i64,
    pair_mode: PairMode,
    snap_batch_size: usize,
) -> Result<PlacePlan, PipelineError> {
    let place = resolve_place(geocoder, name, granularity).await?;
    let grid = sample_polygon(&place.bbox, &place.boundary, place.granularity)?;
    Ok(PlacePlan {
        place_id: place.id,
        display_name: place.display_name,
        granularity,
        grid_points: grid.len(),
        worst_case_calls: planned_calls(grid.len(), pair_mode),
        snap_calls: grid.len().div_ceil(snap_batch_size.max(1)),
    })
}

impl Pipeline {
    /// Runs every stage for one place.
    #[tracing::instrument(skip(self), fields(place = %name))]
    pub async fn run_place(&self, name: &str, granularity: i64) -> Result<PlaceRun, PipelineError> {
        let place = resolve_place(self.geocoder.as_ref(), name, granularity).await?;

        let grid = sample_polygon(&place.bbox, &place.boundary, place.granularity)?;
        info!(
            points = grid.len(),
            worst_case_calls = planned_calls(grid.len(), self.pair_mode),
            "Sampled grid"
        );

        let snap = self.snap.run(&grid).await?;

        let planned = planned_calls(snap.points.len(), self.pair_mode);
        self.guard.check(planned)?;
        let pairs = plan_pairs(snap.points.len(), self.pair_mode);
        info!(snapped = snap.points.len(), planned, "Routing pairs");

        let records = self.routes.run(&snap.points, &pairs).await;
        let routes = analyze_routes(records, &self.classifier);

        let summary = RunSummary::new(&grid, &snap, planned, &routes);
        let mut run = PlaceRun {
            place,
            grid,
            snap,
            routes,
            statistics: None,
            summary,
        };
        run.statistics = CityStatistics::from_fractions(&run.fractions());
        if run.statistics.is_none() {
            warn!("No route produced an alternating fraction");
        }
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::services::PlaceBoundary;
    use crate::turns::{Maneuver, Side, TurnDegree};
    use async_trait::async_trait;
    use geo::{Geometry, polygon};

    /// Returns the unit square with a fixed provider bounding box.
    struct FixedGeocoder(Option<BoundingBox>);

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn lookup(&self, name: &str) -> Result<Option<PlaceBoundary>, ServiceError> {
            Ok(Some(PlaceBoundary {
                id: "relation/1".into(),
                display_name: name.into(),
                bbox: self.0,
                boundary: Geometry::Polygon(polygon![
                    (x: 0.0, y: 0.0),
                    (x: 1.0, y: 0.0),
                    (x: 1.0, y: 1.0),
                    (x: 0.0, y: 1.0),
                    (x: 0.0, y: 0.0),
                ]),
            }))
        }
    }

    #[tokio::test]
    async fn test_resolve_place_keeps_covering_bbox() {
        let wide = BoundingBox::new(-1.0, 2.0, -1.0, 2.0).unwrap();
        let place = resolve_place(&FixedGeocoder(Some(wide)), "Square", 3).await.unwrap();
        assert_eq!(place.bbox, wide);
    }

    #[tokio::test]
    async fn test_resolve_place_replaces_bbox_missing_the_boundary() {
        // A box north of the square.
        let off = BoundingBox::new(5.0, 6.0, 0.0, 1.0).unwrap();
        let place = resolve_place(&FixedGeocoder(Some(off)), "Square", 3).await.unwrap();
        assert_eq!(place.bbox, BoundingBox::new(0.0, 1.0, 0.0, 1.0).unwrap());

        let place = resolve_place(&FixedGeocoder(None), "Square", 3).await.unwrap();
        assert_eq!(place.bbox, BoundingBox::new(0.0, 1.0, 0.0, 1.0).unwrap());
    }

    fn turn(side: Side) -> Maneuver {
        Maneuver::Turn {
            side,
            degree: TurnDegree::Normal,
        }
    }

    fn record(origin: usize, outcome: RouteOutcome) -> RouteRecord {
        RouteRecord {
            pair: RoutePair {
                origin,
                destination: origin + 1,
            },
            outcome,
        }
    }

    #[test]
    fn test_analyze_routes() {
        let records = vec![
            record(
                0,
                RouteOutcome::Found(vec![
                    turn(Side::Left),
                    Maneuver::Straight,
                    turn(Side::Right),
                    turn(Side::Right),
                ]),
            ),
            record(1, RouteOutcome::Found(vec![turn(Side::Left)])),
            record(2, RouteOutcome::NotFound),
        ];
        let analyses = analyze_routes(records, &TurnClassifier::default());

        assert_eq!(analyses[0].turns.as_ref().unwrap().to_string(), "LRR");
        assert_eq!(analyses[0].fraction, Some(0.5));
        assert_eq!(analyses[1].turns.as_ref().unwrap().len(), 1);
        assert_eq!(analyses[1].fraction, None);
        assert!(analyses[2].turns.is_none());
        assert!(analyses[2].counts.is_none());
    }

    #[test]
    fn test_summary_counts() {
        let grid: Vec<GridPoint> = (0..3)
            .map(|i| GridPoint {
                index: i,
                coord: crate::model::Coordinate::new(i as f64, 0.0),
            })
            .collect();
        let snap = SnapReport {
            slots: vec![
                crate::snap::SnapSlot::Snapped(crate::model::Coordinate::new(0.0, 0.0)),
                crate::snap::SnapSlot::Snapped(crate::model::Coordinate::new(0.0, 0.0)),
                crate::snap::SnapSlot::NoNearbyRoad,
            ],
            points: vec![crate::snap::SnappedPoint {
                id: 0,
                coord: crate::model::Coordinate::new(0.0, 0.0),
                grid_indices: vec![0, 1],
            }],
            assignments: vec![Some(0), Some(0), None],
            failed_batches: 0,
        };
        let routes = analyze_routes(
            vec![
                record(0, RouteOutcome::Skipped),
                record(1, RouteOutcome::Failed {
                    attempts: 4,
                    error: "timeout".into(),
                }),
                record(
                    2,
                    RouteOutcome::Found(vec![turn(Side::Left), turn(Side::Right)]),
                ),
            ],
            &TurnClassifier::default(),
        );

        let summary = RunSummary::new(&grid, &snap, 3, &routes);

        assert_eq!(summary.points_sampled, 3);
        assert_eq!(summary.points_no_road, 1);
        assert_eq!(summary.points_merged, 1);
        assert_eq!(summary.snapped_points, 1);
        assert_eq!(summary.routes_attempted, 2);
        assert_eq!(summary.routes_failed, 1);
        assert_eq!(summary.routes_skipped, 1);
        assert_eq!(summary.routes_with_ratio, 1);
    }
}
