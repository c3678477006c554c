//! Traits for the external collaborators the pipeline depends on.
//!
//! Concrete HTTP implementations live in [`crate::infra`]; tests supply
//! in-memory fakes.

pub mod geocoder;
pub mod road_snap;
pub mod routing;

pub use geocoder::{Geocoder, PlaceBoundary};
pub use road_snap::{RoadSnapper, SnapResult};
pub use routing::{RouteResponse, RoutingService};
