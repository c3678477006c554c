//! Credential-injecting [`HttpClient`](super::HttpClient) decorators.
//!
//! The pipeline never sees the key itself; it only receives a client that
//! has already been wrapped in one of these.

mod api_key;
mod url_param;

pub use api_key::ApiKey;
pub use url_param::UrlParam;
