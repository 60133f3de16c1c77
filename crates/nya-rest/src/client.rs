//! Rate-limited REST client

use crate::ratelimit::{RateLimitHeaders, RateLimiter};
use crate::{RestError, RestResult, RouteKey};
use nya_common::RestConfig;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How many 429 responses a single call absorbs before giving up
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Fallback wait when a 429 carries no timing information
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Error body returned by the API
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<u64>,
    retry_after: Option<f64>,
    #[serde(default)]
    global: bool,
}

/// REST client shared by the whole bot
///
/// Cloning is cheap; clones share the connection pool and the rate-limit table.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    config: Arc<RestConfig>,
    limiter: Arc<RateLimiter>,
}

impl RestClient {
    /// Create a client with its own rate-limit table
    pub fn new(config: RestConfig) -> RestResult<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            config: Arc::new(config),
            limiter: Arc::new(RateLimiter::new()),
        })
    }

    /// The shared rate-limit table
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    /// Perform one API call
    ///
    /// Waits out any active global or route limit first, records the limit headers of
    /// the response, and returns `None` for `204 No Content`. A `429` is absorbed as
    /// added latency and retried.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> RestResult<Option<Value>> {
        let route = RouteKey::new(&method, path);
        let url = self.url(path)?;
        let body = body.filter(|b| !b.is_null());
        let mut rate_limited = 0;

        loop {
            self.limiter.acquire(&route).await;

            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header(AUTHORIZATION, format!("Bot {}", self.config.token.expose()))
                .header(USER_AGENT, &self.config.user_agent)
                .header(CONTENT_TYPE, "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }

            tracing::trace!(method = %method, path = %path, route = %route, "Sending request");

            let response = request.send().await.map_err(|e| {
                tracing::error!(method = %method, path = %path, error = %e, "Request failed");
                e
            })?;

            let status = response.status();
            let headers = RateLimitHeaders::from_headers(response.headers());
            self.limiter.update(&route, &headers, Instant::now());

            if status == StatusCode::TOO_MANY_REQUESTS && rate_limited < MAX_RATE_LIMIT_RETRIES {
                rate_limited += 1;
                let error: ErrorBody = response.json().await.unwrap_or_default();
                let retry_after = error
                    .retry_after
                    .filter(|secs| secs.is_finite() && *secs >= 0.0)
                    .map(Duration::from_secs_f64)
                    .or(headers.reset_after)
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                let reset_at = Instant::now() + retry_after;

                if headers.global || error.global {
                    self.limiter.lock_globally_until(reset_at);
                } else {
                    self.limiter.lock_route_until(&route, reset_at);
                }

                tracing::warn!(
                    route = %route,
                    retry_after_ms = retry_after.as_millis() as u64,
                    attempt = rate_limited,
                    "Rate limited by the API, retrying"
                );
                continue;
            }

            if !status.is_success() {
                let error: ErrorBody = response.json().await.unwrap_or_default();
                let message = error.message.unwrap_or_else(|| "Unknown error".to_string());
                tracing::error!(
                    status = status.as_u16(),
                    route = %route,
                    message = %message,
                    "REST error"
                );
                return Err(RestError::Api {
                    status,
                    message,
                    code: error.code,
                });
            }

            if status == StatusCode::NO_CONTENT {
                return Ok(None);
            }

            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                return Ok(None);
            }
            return Ok(Some(serde_json::from_slice(&bytes)?));
        }
    }

    /// Perform a call and decode the response into `T`
    ///
    /// An empty response decodes from `null`, so `()` and `Option<_>` work for 204s.
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> RestResult<T> {
        let value = self.request(method, path, body).await?;
        Ok(serde_json::from_value(value.unwrap_or(Value::Null))?)
    }

    pub async fn get(&self, path: &str) -> RestResult<Option<Value>> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> RestResult<Option<Value>> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, Some(&body)).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> RestResult<Option<Value>> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PATCH, path, Some(&body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> RestResult<Option<Value>> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PUT, path, Some(&body)).await
    }

    pub async fn delete(&self, path: &str) -> RestResult<Option<Value>> {
        self.request(Method::DELETE, path, None).await
    }

    fn url(&self, path: &str) -> RestResult<Url> {
        if !path.starts_with('/') {
            return Err(RestError::InvalidRoute(path.to_string()));
        }
        let raw = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        Url::parse(&raw).map_err(|e| RestError::InvalidRoute(format!("{raw}: {e}")))
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.config.base_url)
            .field("limiter", &self.limiter)
            .finish()
    }
}
