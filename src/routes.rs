//! Pairwise route enumeration.
//!
//! With `N` snapped points there are `N(N-1)` directed pairs, and `N` grows
//! with the square of the grid granularity, so the routing bill grows with
//! its fourth power. The planned call count is therefore computed and
//! checked against a [`CallGuard`] before anything is sent, and a run-level
//! `max_calls` budget cancels the remainder of a run once spent. Routes
//! finished before a cancellation are kept.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::error::{PipelineError, ServiceError};
use crate::fetch::{Dispatcher, RetryPolicy, Sleeper};
use crate::services::{RouteResponse, RoutingService};
use crate::snap::SnappedPoint;
use crate::turns::Maneuver;

/// Whether both directions of a pair are routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairMode {
    /// Every ordered `(a, b)` with `a != b`.
    #[default]
    Directed,
    /// One request per unordered pair, lower id as origin.
    Unordered,
}

/// Origin/destination by snapped point id. Never `origin == destination`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoutePair {
    pub origin: usize,
    pub destination: usize,
}

impl RoutePair {
    /// Identity of the unordered pair: `(a, b)` and `(b, a)` share a key.
    pub fn unordered_key(&self) -> (usize, usize) {
        (
            self.origin.min(self.destination),
            self.origin.max(self.destination),
        )
    }
}

/// Number of routing calls needed for `n` points.
pub fn planned_calls(n: usize, mode: PairMode) -> u64 {
    let n = n as u64;
    let directed = n.saturating_mul(n.saturating_sub(1));
    match mode {
        PairMode::Directed => directed,
        PairMode::Unordered => directed / 2,
    }
}

/// Enumerates the pairs to route, skipping self-pairs.
pub fn plan_pairs(n: usize, mode: PairMode) -> Vec<RoutePair> {
    let mut pairs = Vec::new();
    for origin in 0..n {
        for destination in 0..n {
            let keep = match mode {
                PairMode::Directed => origin != destination,
                PairMode::Unordered => origin < destination,
            };
            if keep {
                pairs.push(RoutePair {
                    origin,
                    destination,
                });
            }
        }
    }
    pairs
}

/// Thresholds on the planned call count, checked before any call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CallGuard {
    pub warn_above: Option<u64>,
    pub abort_above: Option<u64>,
}

impl CallGuard {
    pub fn check(&self, planned: u64) -> Result<(), PipelineError> {
        if let Some(limit) = self.abort_above.filter(|limit| planned > *limit) {
            return Err(PipelineError::CallBudgetExceeded { planned, limit });
        }
        if let Some(limit) = self.warn_above.filter(|limit| planned > *limit) {
            warn!(planned, limit, "Planned routing calls above warning threshold");
        }
        Ok(())
    }
}

/// Terminal state of one pair.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Found(Vec<Maneuver>),
    /// No drivable path; a valid result, not a fault.
    NotFound,
    /// Retries exhausted or a permanent service error.
    Failed { attempts: u32, error: String },
    /// Not issued because the run was cancelled or over budget.
    Skipped,
}

impl RouteOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            RouteOutcome::Found(_) => "found",
            RouteOutcome::NotFound => "not_found",
            RouteOutcome::Failed { .. } => "failed",
            RouteOutcome::Skipped => "skipped",
        }
    }

    pub fn maneuvers(&self) -> Option<&[Maneuver]> {
        match self {
            RouteOutcome::Found(m) => Some(m),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteRecord {
    pub pair: RoutePair,
    pub outcome: RouteOutcome,
}

/// The routing stage and its shared resources.
pub struct RouteStage {
    pub router: Arc<dyn RoutingService>,
    pub dispatcher: Arc<Dispatcher>,
    pub retry: RetryPolicy,
    pub sleeper: Arc<dyn Sleeper>,
    /// Cap on issued routing requests (retries excluded), shared by every
    /// [`run`](Self::run) of this stage. Once cancelled, the dispatcher is
    /// closed so queued pairs are skipped without waiting for a permit.
    pub max_calls: Option<u64>,
    pub cancel: CancellationToken,
    issued: Arc<AtomicU64>,
}

/// Counts one more request against `max_calls`. Returns false, leaving the
/// counter untouched, once the budget is spent.
fn take_budget(issued: &AtomicU64, max_calls: Option<u64>) -> bool {
    let Some(max) = max_calls else {
        issued.fetch_add(1, Ordering::SeqCst);
        return true;
    };
    issued
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
        .is_ok()
}

impl RouteStage {
    pub fn new(
        router: Arc<dyn RoutingService>,
        dispatcher: Arc<Dispatcher>,
        retry: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
        max_calls: Option<u64>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            router,
            dispatcher,
            retry,
            sleeper,
            max_calls,
            cancel,
            issued: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Routing requests issued so far.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Routes every pair. Results come back in `pairs` order.
    #[tracing::instrument(skip_all, fields(points = points.len(), pairs = pairs.len()))]
    pub async fn run(&self, points: &[SnappedPoint], pairs: &[RoutePair]) -> Vec<RouteRecord> {
        let mut tasks = vec![];

        for pair in pairs {
            let pair = *pair;
            let origin = points[pair.origin].coord;
            let destination = points[pair.destination].coord;
            let router = self.router.clone();
            let dispatcher = self.dispatcher.clone();
            let retry = self.retry.clone();
            let sleeper = self.sleeper.clone();
            let cancel = self.cancel.clone();
            let issued = self.issued.clone();
            let max_calls = self.max_calls;

            let span = tracing::info_span!(
                "route_pair",
                origin = pair.origin,
                destination = pair.destination,
            );

            tasks.push(tokio::spawn(
                async move {
                    let call_timeout = retry.call_timeout;
                    let result = retry
                        .run(sleeper.as_ref(), |attempt| {
                            let router = router.clone();
                            let dispatcher = dispatcher.clone();
                            let cancel = cancel.clone();
                            let issued = issued.clone();
                            async move {
                                dispatcher
                                    .dispatch(call_timeout, || async {
                                        if cancel.is_cancelled() {
                                            dispatcher.close();
                                            return Err(ServiceError::Cancelled);
                                        }
                                        if attempt == 1 && !take_budget(&issued, max_calls) {
                                            warn!(?max_calls, "Routing call budget spent, cancelling run");
                                            cancel.cancel();
                                            dispatcher.close();
                                            return Err(ServiceError::Cancelled);
                                        }
                                        router.route(origin, destination).await
                                    })
                                    .await
                            }
                        })
                        .await;

                    match result {
                        Ok(RouteResponse::Found(maneuvers)) => {
                            debug!(maneuvers = maneuvers.len(), "Route found");
                            RouteOutcome::Found(maneuvers)
                        }
                        Ok(RouteResponse::NotFound) => {
                            debug!("No route between points");
                            RouteOutcome::NotFound
                        }
                        Err(e) => match e.last_error {
                            ServiceError::Cancelled | ServiceError::DispatchClosed => {
                                RouteOutcome::Skipped
                            }
                            other => {
                                error!(attempts = e.attempts, error = %other, "Route request failed");
                                RouteOutcome::Failed {
                                    attempts: e.attempts,
                                    error: other.to_string(),
                                }
                            }
                        },
                    }
                }
                .instrument(span),
            ));
        }

        let mut records = Vec::with_capacity(pairs.len());
        for (pair, task) in pairs.iter().zip(tasks) {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Route task panicked");
                    RouteOutcome::Failed {
                        attempts: 0,
                        error: e.to_string(),
                    }
                }
            };
            records.push(RouteRecord {
                pair: *pair,
                outcome,
            });
        }

        let found = records
            .iter()
            .filter(|r| matches!(r.outcome, RouteOutcome::Found(_)))
            .count();
        let skipped = records
            .iter()
            .filter(|r| r.outcome == RouteOutcome::Skipped)
            .count();
        info!(
            pairs = records.len(),
            found,
            skipped,
            issued = self.issued(),
            "Route enumeration complete"
        );
        records
    }
}
