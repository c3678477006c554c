use std::collections::HashMap;

use super::KeyStore;
use crate::error::PipelineError;

/// Resolves credentials from environment variables.
///
/// An override map can be supplied for tests so they do not have to touch
/// the process environment.
#[derive(Debug, Default)]
pub struct EnvKeyStore {
    overrides: HashMap<String, String>,
}

impl EnvKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        Self { overrides }
    }
}

#[async_trait::async_trait]
impl KeyStore for EnvKeyStore {
    /// Reads the variable named `reference`. Unset or blank values are a
    /// [`PipelineError::MissingCredential`].
    async fn get(&self, reference: &str) -> Result<String, PipelineError> {
        let value = match self.overrides.get(reference) {
            Some(v) => Some(v.clone()),
            None => std::env::var(reference).ok(),
        };
        value
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| PipelineError::MissingCredential(reference.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_override_wins() {
        let store = EnvKeyStore::with_overrides(HashMap::from([(
            "MAPS_KEY".to_string(),
            "abc".to_string(),
        )]));
        assert_eq!(store.get("MAPS_KEY").await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_missing_and_blank_are_errors() {
        let store = EnvKeyStore::with_overrides(HashMap::from([(
            "BLANK_KEY".to_string(),
            "  ".to_string(),
        )]));
        assert!(matches!(
            store.get("BLANK_KEY").await,
            Err(PipelineError::MissingCredential(r)) if r == "BLANK_KEY"
        ));
        assert!(
            store
                .get("TURN_SEQUENCE_SURELY_UNSET_VARIABLE")
                .await
                .is_err()
        );
    }
}
