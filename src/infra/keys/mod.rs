//! Credential management.
//!
//! [`KeyStore`] is the async trait for resolving a credential reference into
//! its plaintext value. [`EnvKeyStore`] reads references as environment
//! variable names (a `.env` file is loaded at startup).

mod env;

pub use env::EnvKeyStore;

use crate::error::PipelineError;

/// Resolves a credential reference into a plaintext secret.
#[async_trait::async_trait]
pub trait KeyStore: Send + Sync {
    async fn get(&self, reference: &str) -> Result<String, PipelineError>;
}
