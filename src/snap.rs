//! Road snapping of grid points.
//!
//! Grid points are sent to the [`RoadSnapper`] in batches no larger than its
//! `max_batch_size`, each batch going through the shared [`Dispatcher`] and
//! the [`RetryPolicy`]. Every input gets exactly one [`SnapSlot`]. Snapped
//! coordinates are then merged by exact coordinate identity; a merged
//! [`SnappedPoint`] keeps the indices of *all* grid points that landed on it.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{Instrument, debug, error, info, warn};

use crate::error::PipelineError;
use crate::fetch::{Dispatcher, RetryPolicy, Sleeper};
use crate::grid::GridPoint;
use crate::model::Coordinate;
use crate::services::{RoadSnapper, SnapResult};

/// Per-grid-point outcome of snapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapSlot {
    Snapped(Coordinate),
    NoNearbyRoad,
    /// The batch holding this point failed after all retries.
    Failed,
}

impl SnapSlot {
    pub fn status(&self) -> &'static str {
        match self {
            SnapSlot::Snapped(_) => "kept",
            SnapSlot::NoNearbyRoad => "no_road",
            SnapSlot::Failed => "snap_failed",
        }
    }
}

/// A distinct road location.
#[derive(Debug, Clone, PartialEq)]
pub struct SnappedPoint {
    pub id: usize,
    pub coord: Coordinate,
    /// Grid indices ([`GridPoint::index`]) of every grid point that snapped
    /// here, in grid order.
    pub grid_indices: Vec<usize>,
}

/// What to do when a batch exhausts its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Mark the batch's points as failed and carry on.
    #[default]
    Skip,
    /// Stop the run with [`PipelineError::SnapServiceUnavailable`].
    Abort,
}

#[derive(Debug, Clone, Default)]
pub struct SnapReport {
    /// One slot per input grid point, in input order.
    pub slots: Vec<SnapSlot>,
    /// Deduplicated points, in order of first appearance.
    pub points: Vec<SnappedPoint>,
    /// For each input slot, the id of the snapped point it maps to.
    pub assignments: Vec<Option<usize>>,
    pub failed_batches: usize,
}

impl SnapReport {
    pub fn no_road(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, SnapSlot::NoNearbyRoad))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, SnapSlot::Failed))
            .count()
    }

    /// Snapped grid points that collapsed onto an already-seen location.
    pub fn merged(&self) -> usize {
        let snapped = self.slots.len() - self.no_road() - self.failed();
        snapped - self.points.len()
    }
}

/// Merges snapped slots by coordinate identity.
pub fn deduplicate(grid: &[GridPoint], slots: &[SnapSlot]) -> (Vec<SnappedPoint>, Vec<Option<usize>>) {
    let mut by_key: HashMap<(u64, u64), usize> = HashMap::new();
    let mut points: Vec<SnappedPoint> = Vec::new();
    let mut assignments = Vec::with_capacity(slots.len());

    for (grid_point, slot) in grid.iter().zip(slots) {
        let SnapSlot::Snapped(coord) = slot else {
            assignments.push(None);
            continue;
        };
        let id = *by_key.entry(coord.key()).or_insert_with(|| {
            points.push(SnappedPoint {
                id: points.len(),
                coord: *coord,
                grid_indices: Vec::new(),
            });
            points.len() - 1
        });
        points[id].grid_indices.push(grid_point.index);
        assignments.push(Some(id));
    }

    (points, assignments)
}

/// The road-snap stage and its shared resources.
pub struct SnapStage {
    pub snapper: Arc<dyn RoadSnapper>,
    pub dispatcher: Arc<Dispatcher>,
    pub retry: RetryPolicy,
    pub sleeper: Arc<dyn Sleeper>,
    pub on_failure: FailurePolicy,
}

impl SnapStage {
    #[tracing::instrument(skip_all, fields(points = grid.len()))]
    pub async fn run(&self, grid: &[GridPoint]) -> Result<SnapReport, PipelineError> {
        let batch_size = self.snapper.max_batch_size().max(1);
        let batches: Vec<Vec<Coordinate>> = grid
            .chunks(batch_size)
            .map(|chunk| chunk.iter().map(|p| p.coord).collect())
            .collect();
        debug!(batch_size, batches = batches.len(), "Snapping grid points");

        let mut tasks = vec![];
        for (batch_no, coords) in batches.into_iter().enumerate() {
            let snapper = self.snapper.clone();
            let dispatcher = self.dispatcher.clone();
            let retry = self.retry.clone();
            let sleeper = self.sleeper.clone();
            let span = tracing::debug_span!("snap_batch", batch = batch_no, size = coords.len());

            tasks.push(tokio::spawn(
                async move {
                    let expected = coords.len();
                    let batch: &[Coordinate] = &coords;
                    let call_timeout = retry.call_timeout;
                    let result = retry
                        .run(sleeper.as_ref(), |_| {
                            let snapper = snapper.clone();
                            let dispatcher = dispatcher.clone();
                            async move {
                                dispatcher
                                    .dispatch(call_timeout, || async { snapper.snap_batch(batch).await })
                                    .await
                            }
                        })
                        .await;
                    (expected, result)
                }
                .instrument(span),
            ));
        }

        let mut report = SnapReport::default();
        let mut tasks = tasks.into_iter();
        while let Some(task) = tasks.next() {
            let (expected, result) = match task.await {
                Ok(r) => r,
                Err(e) => {
                    error!(error = %e, "Snap task panicked");
                    tasks.by_ref().for_each(|t| t.abort());
                    return Err(PipelineError::TaskFailed(e.to_string()));
                }
            };

            match result {
                Ok(results) if results.len() == expected => {
                    report.slots.extend(results.into_iter().map(|r| match r {
                        SnapResult::Snapped(c) => SnapSlot::Snapped(c),
                        SnapResult::NoNearbyRoad => SnapSlot::NoNearbyRoad,
                    }));
                }
                Ok(results) => {
                    warn!(
                        expected,
                        actual = results.len(),
                        "Snap service returned a mismatched batch, marking it failed"
                    );
                    report.failed_batches += 1;
                    report.slots.extend(std::iter::repeat_n(SnapSlot::Failed, expected));
                }
                Err(exhausted) => {
                    error!(
                        attempts = exhausted.attempts,
                        error = %exhausted.last_error,
                        "Snap batch failed"
                    );
                    if self.on_failure == FailurePolicy::Abort {
                        tasks.by_ref().for_each(|t| t.abort());
                        return Err(PipelineError::SnapServiceUnavailable {
                            attempts: exhausted.attempts,
                            source: exhausted.last_error,
                        });
                    }
                    report.failed_batches += 1;
                    report.slots.extend(std::iter::repeat_n(SnapSlot::Failed, expected));
                }
            }
        }

        let (points, assignments) = deduplicate(grid, &report.slots);
        report.points = points;
        report.assignments = assignments;

        info!(
            grid_points = grid.len(),
            snapped = report.points.len(),
            no_road = report.no_road(),
            failed = report.failed(),
            merged = report.merged(),
            "Road snapping complete"
        );
        Ok(report)
    }
}
