//! HTTP plumbing shared by the collaborator adapters: the [`HttpClient`]
//! seam, auth decorators, JSON request helpers, the retry policy and the
//! rate-limited dispatch queue.

mod basic;
mod client;
pub mod auth;
pub mod dispatch;
pub mod retry;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use dispatch::Dispatcher;
pub use retry::{RetryExhausted, RetryPolicy, Sleeper, TokioSleeper};

use reqwest::StatusCode;
use tracing::debug;

use crate::error::ServiceError;

/// Executes `req` and decodes the body as JSON.
///
/// HTTP 429 maps to [`ServiceError::RateLimited`], any other non-success
/// status to [`ServiceError::Status`], and a success body carrying an error
/// payload to [`ServiceError::Api`].
pub async fn send_json<C: HttpClient + ?Sized>(
    client: &C,
    req: reqwest::Request,
) -> Result<serde_json::Value, ServiceError> {
    let url = req.url().path().to_string();
    let resp = client.execute(req).await?;
    let status = resp.status();
    debug!(path = %url, status = status.as_u16(), "HTTP response");

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ServiceError::RateLimited);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ServiceError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let text = resp.text().await?;
    if text.trim().is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| ServiceError::Parse {
        message: format!("invalid JSON from {url}: {e}"),
    })?;
    check_api_error(&value)?;
    Ok(value)
}

/// Builds a POST request carrying a JSON body.
pub fn json_post(
    url: &str,
    body: &serde_json::Value,
) -> Result<reqwest::Request, ServiceError> {
    let url = url
        .parse()
        .map_err(|e| ServiceError::InvalidRequest(format!("bad URL {url}: {e}")))?;
    let mut req = reqwest::Request::new(reqwest::Method::POST, url);
    req.headers_mut().insert(
        reqwest::header::CONTENT_TYPE,
        reqwest::header::HeaderValue::from_static("application/json; charset=UTF-8"),
    );
    let bytes = serde_json::to_vec(body).map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;
    *req.body_mut() = Some(bytes.into());
    Ok(req)
}

/// Builds a GET request with the given query parameters.
pub fn get_with_query(url: &str, query: &[(&str, &str)]) -> Result<reqwest::Request, ServiceError> {
    let mut url: reqwest::Url = url
        .parse()
        .map_err(|e| ServiceError::InvalidRequest(format!("bad URL {url}: {e}")))?;
    {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in query {
            pairs.append_pair(k, v);
        }
    }
    Ok(reqwest::Request::new(reqwest::Method::GET, url))
}

/// Google APIs report failures either as `{"error": {"message": ..}}` or
/// as a top-level `error_message`.
pub fn check_api_error(value: &serde_json::Value) -> Result<(), ServiceError> {
    if let Some(message) = value.get("error_message").and_then(|m| m.as_str()) {
        return Err(ServiceError::Api(message.to_string()));
    }
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        let code = error.get("code").and_then(|c| c.as_u64());
        return match code {
            Some(429) => Err(ServiceError::RateLimited),
            Some(code) if code >= 500 => Err(ServiceError::Status {
                status: code as u16,
                body: message.to_string(),
            }),
            _ => Err(ServiceError::Api(message.to_string())),
        };
    }
    Ok(())
}
