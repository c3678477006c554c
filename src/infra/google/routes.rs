use async_trait::async_trait;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use serde_json::json;

use crate::error::ServiceError;
use crate::fetch::{HttpClient, json_post, send_json};
use crate::model::Coordinate;
use crate::services::{RouteResponse, RoutingService};
use crate::turns::{Maneuver, normalize_step};

pub const COMPUTE_ROUTES_URL: &str = "https://routes.googleapis.com/directions/v2:computeRoutes";
/// Only the navigation instructions are requested; the response is billed
/// by the fields it carries.
pub const FIELD_MASK: &str = "routes.legs.steps.navigationInstruction";

#[derive(Deserialize)]
struct ComputeRoutesResponse {
    #[serde(default)]
    routes: Vec<Route>,
}

#[derive(Deserialize)]
struct Route {
    #[serde(default)]
    legs: Vec<Leg>,
}

#[derive(Deserialize)]
struct Leg {
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Step {
    navigation_instruction: Option<NavigationInstruction>,
}

#[derive(Deserialize)]
struct NavigationInstruction {
    maneuver: Option<String>,
    instructions: Option<String>,
}

/// Driving routes from the Routes API. The wrapped client must add the API
/// key (see [`crate::fetch::auth::ApiKey`]).
pub struct RoutesClient<C> {
    client: C,
    url: String,
}

impl<C: HttpClient> RoutesClient<C> {
    pub fn new(client: C, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

fn waypoint(c: Coordinate) -> serde_json::Value {
    json!({"location": {"latLng": {"latitude": c.lat, "longitude": c.lon}}})
}

#[async_trait]
impl<C: HttpClient> RoutingService for RoutesClient<C> {
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RouteResponse, ServiceError> {
        if origin == destination {
            return Err(ServiceError::InvalidRequest(format!(
                "origin and destination are both {origin}"
            )));
        }
        let body = json!({
            "origin": waypoint(origin),
            "destination": waypoint(destination),
            "travelMode": "DRIVE",
        });
        let mut req = json_post(&self.url, &body)?;
        req.headers_mut()
            .insert("x-goog-fieldmask", HeaderValue::from_static(FIELD_MASK));
        let value = send_json(&self.client, req).await?;
        parse_routes(value)
    }
}

/// Flattens the first route's steps into maneuvers. An empty response means
/// no route was found.
pub fn parse_routes(value: serde_json::Value) -> Result<RouteResponse, ServiceError> {
    let resp: ComputeRoutesResponse = serde_json::from_value(value).map_err(|e| ServiceError::Parse {
        message: format!("unexpected computeRoutes response: {e}"),
    })?;
    let Some(route) = resp.routes.into_iter().next() else {
        return Ok(RouteResponse::NotFound);
    };
    let maneuvers: Vec<Maneuver> = route
        .legs
        .iter()
        .flat_map(|leg| &leg.steps)
        .map(|step| match &step.navigation_instruction {
            Some(ni) => normalize_step(ni.maneuver.as_deref(), ni.instructions.as_deref()),
            None => Maneuver::Unspecified,
        })
        .collect();
    Ok(RouteResponse::Found(maneuvers))
}
