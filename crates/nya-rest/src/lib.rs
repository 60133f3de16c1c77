//! # nya-rest
//!
//! HTTP transport for the platform API. Every call goes through a shared [`RateLimiter`]
//! so callers only ever observe added latency, never a rate-limit failure.

mod client;
mod endpoints;
mod error;
mod ratelimit;
mod route;

pub use client::RestClient;
pub use endpoints::{CommandScope, GatewayBot, MessageBody, SessionStartLimit};
pub use error::{RestError, RestResult};
pub use ratelimit::{Bucket, RateLimitHeaders, RateLimiter};
pub use reqwest::Method;
pub use route::RouteKey;
