use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes an already-built HTTP request. Auth decorators wrap an inner
/// client and mutate the request before delegating.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
