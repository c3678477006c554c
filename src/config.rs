//! Run configuration, loaded from a JSON file.
//!
//! Only `places` and `granularity` are required:
//! ```json
//! {
//!   "places": ["Boston, Massachusetts, USA"],
//!   "granularity": 6,
//!   "pair_mode": "unordered",
//!   "routing": { "requests_per_second": 5, "abort_above": 5000 }
//! }
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::PipelineError;
use crate::fetch::RetryPolicy;
use crate::infra::google::{COMPUTE_ROUTES_URL, NEAREST_ROADS_URL, ROADS_MAX_POINTS};
use crate::infra::nominatim;
use crate::routes::{CallGuard, PairMode};
use crate::snap::FailurePolicy;
use crate::storage::Schema;
use crate::turns::TurnClassifier;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// Points per `nearestRoads` call, at most 100.
    pub batch_size: usize,
    pub requests_per_second: Option<f64>,
    pub concurrency: usize,
    pub on_failure: FailurePolicy,
    pub url: String,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            batch_size: ROADS_MAX_POINTS,
            requests_per_second: Some(20.0),
            concurrency: 4,
            on_failure: FailurePolicy::Skip,
            url: NEAREST_ROADS_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub requests_per_second: Option<f64>,
    pub concurrency: usize,
    /// Log a warning when a place plans more calls than this.
    pub warn_above: Option<u64>,
    /// Refuse to route a place that plans more calls than this.
    pub abort_above: Option<u64>,
    /// Cancel the run after this many routing requests, over all places.
    pub max_calls: Option<u64>,
    pub url: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            requests_per_second: Some(10.0),
            concurrency: 8,
            warn_above: Some(1_000),
            abort_above: None,
            max_calls: None,
            url: COMPUTE_ROUTES_URL.to_string(),
        }
    }
}

impl RoutingConfig {
    pub fn guard(&self) -> CallGuard {
        CallGuard {
            warn_above: self.warn_above,
            abort_above: self.abort_above,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
    pub schema: Schema,
    /// Attempts for writing a finished run before giving up on it.
    pub write_attempts: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            schema: Schema::default(),
            write_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub url: String,
    pub user_agent: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            url: nominatim::DEFAULT_BASE_URL.to_string(),
            user_agent: concat!("turn_sequence/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Names of the credentials, never their values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Environment variable holding the Google Maps Platform key.
    pub maps_api_key: String,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            maps_api_key: "GOOGLE_MAPS_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub places: Vec<String>,
    pub granularity: i64,
    #[serde(default)]
    pub pair_mode: PairMode,
    #[serde(default)]
    pub snap: SnapConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub classifier: TurnClassifier,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
}

impl Config {
    /// Reads and validates the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_json(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks everything that can be checked without a network call.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if self.granularity <= 0 {
            return Err(PipelineError::InvalidGranularity(self.granularity));
        }
        if self.places.is_empty() {
            return invalid("no places configured".into());
        }
        if self.places.iter().any(|p| p.trim().is_empty()) {
            return invalid("place names must not be blank".into());
        }
        if !(1..=ROADS_MAX_POINTS).contains(&self.snap.batch_size) {
            return invalid(format!(
                "snap.batch_size must be between 1 and {ROADS_MAX_POINTS}, got {}",
                self.snap.batch_size
            ));
        }
        for (name, concurrency, rps) in [
            ("snap", self.snap.concurrency, self.snap.requests_per_second),
            ("routing", self.routing.concurrency, self.routing.requests_per_second),
        ] {
            if concurrency == 0 {
                return invalid(format!("{name}.concurrency must be at least 1"));
            }
            if let Some(rps) = rps.filter(|r| !(r.is_finite() && *r > 0.0)) {
                return invalid(format!("{name}.requests_per_second must be positive, got {rps}"));
            }
        }
        if let (Some(warn), Some(abort)) = (self.routing.warn_above, self.routing.abort_above)
            && warn > abort
        {
            return invalid(format!(
                "routing.warn_above ({warn}) is above routing.abort_above ({abort})"
            ));
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return invalid(format!("retry.jitter must be in [0, 1], got {}", self.retry.jitter));
        }
        if self.retry.base_delay > self.retry.max_delay {
            return invalid("retry.base_delay is above retry.max_delay".into());
        }
        if self.retry.call_timeout.is_zero() {
            return invalid("retry.call_timeout must be positive".into());
        }
        if !(self.classifier.min_heading_change_deg > 0.0
            && self.classifier.min_heading_change_deg <= 180.0)
        {
            return invalid(format!(
                "classifier.min_heading_change_deg must be in (0, 180], got {}",
                self.classifier.min_heading_change_deg
            ));
        }
        if self.storage.write_attempts == 0 {
            return invalid("storage.write_attempts must be at least 1".into());
        }
        self.storage.schema.validate()?;
        if self.geocoder.user_agent.trim().is_empty() {
            return invalid("geocoder.user_agent must not be empty".into());
        }
        if self.credentials.maps_api_key.trim().is_empty() {
            return invalid("credentials.maps_api_key must name an environment variable".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config =
            Config::from_json(r#"{"places": ["Boston, Massachusetts, USA"], "granularity": 4}"#)
                .unwrap();
        assert_eq!(config.pair_mode, PairMode::Directed);
        assert_eq!(config.snap.batch_size, 100);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.storage.dir, PathBuf::from("data"));
        assert_eq!(config.credentials.maps_api_key, "GOOGLE_MAPS_API_KEY");
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_json(
            r#"{
                "places": ["Cambridge, MA"],
                "granularity": 3,
                "pair_mode": "unordered",
                "snap": {"batch_size": 50, "on_failure": "abort"},
                "routing": {"warn_above": 10, "abort_above": 20, "max_calls": 15},
                "retry": {"max_attempts": 2, "base_delay": 100, "max_delay": 400, "call_timeout": 5000},
                "classifier": {"min_degree": "slight", "count_forks": true},
                "storage": {"dir": "out", "schema": {"points": {"status": "state"}}}
            }"#,
        )
        .unwrap();
        assert_eq!(config.pair_mode, PairMode::Unordered);
        assert_eq!(config.snap.on_failure, FailurePolicy::Abort);
        assert_eq!(config.routing.guard().abort_above, Some(20));
        assert_eq!(config.retry.base_delay, Duration::from_millis(100));
        assert!(config.classifier.count_forks);
        assert_eq!(config.storage.schema.points.status, "state");
    }

    #[test]
    fn test_invalid_granularity() {
        let err = Config::from_json(r#"{"places": ["X"], "granularity": 0}"#).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::InvalidGranularity(0))
        ));
    }

    #[test]
    fn test_invalid_settings() {
        for bad in [
            r#"{"places": [], "granularity": 2}"#,
            r#"{"places": ["X"], "granularity": 2, "snap": {"batch_size": 101}}"#,
            r#"{"places": ["X"], "granularity": 2, "routing": {"concurrency": 0}}"#,
            r#"{"places": ["X"], "granularity": 2, "routing": {"requests_per_second": -1}}"#,
            r#"{"places": ["X"], "granularity": 2, "routing": {"warn_above": 9, "abort_above": 5}}"#,
            r#"{"places": ["X"], "granularity": 2, "retry": {"jitter": 2.0}}"#,
            r#"{"places": ["X"], "granularity": 2, "credentials": {"maps_api_key": ""}}"#,
        ] {
            let err = Config::from_json(bad).unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<PipelineError>(),
                    Some(PipelineError::InvalidConfig(_))
                ),
                "{bad} gave {err}"
            );
        }
    }

    #[test]
    fn test_example_file_is_valid() {
        let config = Config::load(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/turn_sequence.example.json"
        ))
        .unwrap();
        assert_eq!(config.places.len(), 2);
        assert_eq!(config.routing.max_calls, Some(3000));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }
}
