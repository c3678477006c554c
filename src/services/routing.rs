//! Turn-by-turn driving routes.

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::model::Coordinate;
use crate::turns::Maneuver;

#[derive(Debug, Clone, PartialEq)]
pub enum RouteResponse {
    /// Ordered maneuvers along the route.
    Found(Vec<Maneuver>),
    /// No drivable path between the two points.
    NotFound,
}

#[async_trait]
pub trait RoutingService: Send + Sync {
    /// Requests a driving route. The call is direction-sensitive.
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RouteResponse, ServiceError>;
}
