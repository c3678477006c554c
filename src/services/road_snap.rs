//! Nearest-road snapping.

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::model::Coordinate;

/// Outcome for one input coordinate. "No nearby road" (e.g. over water) is
/// an ordinary result, not a fault.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapResult {
    Snapped(Coordinate),
    NoNearbyRoad,
}

#[async_trait]
pub trait RoadSnapper: Send + Sync {
    /// Largest batch a single call accepts.
    fn max_batch_size(&self) -> usize;

    /// Snaps a batch of at most [`max_batch_size`](Self::max_batch_size)
    /// coordinates. The result has exactly one entry per input, in order.
    async fn snap_batch(&self, coords: &[Coordinate]) -> Result<Vec<SnapResult>, ServiceError>;
}
