//! Google Maps Platform adapters: Roads `nearestRoads` for snapping and
//! Routes `computeRoutes` for turn-by-turn directions.

mod roads;
mod routes;

pub use roads::{NEAREST_ROADS_URL, ROADS_MAX_POINTS, RoadsClient, parse_nearest_roads};
pub use routes::{COMPUTE_ROUTES_URL, FIELD_MASK, RoutesClient, parse_routes};
