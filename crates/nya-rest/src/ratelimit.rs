//! Per-route and global rate limiting
//!
//! The limiter never rejects: [`RateLimiter::acquire`] suspends the caller until the
//! route (and the global lock) may be used again.

use crate::RouteKey;
use dashmap::DashMap;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::Instant;

/// Remaining calls in the current window
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
/// Seconds (fractional) until the window resets
pub const HEADER_RESET_AFTER: &str = "x-ratelimit-reset-after";
/// Present when the limit applies to every route
pub const HEADER_GLOBAL: &str = "x-ratelimit-global";

/// Rate-limit state of one route
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bucket {
    /// Calls left in the window, as last reported
    pub remaining: Option<u32>,
    /// No call may be issued before this instant
    pub reset_at: Option<Instant>,
}

impl Bucket {
    /// How long a call made at `now` must wait
    pub fn wait_time(&self, now: Instant) -> Option<Duration> {
        self.reset_at
            .filter(|reset_at| *reset_at > now)
            .map(|reset_at| reset_at - now)
    }
}

/// Rate-limit information carried by a response
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateLimitHeaders {
    pub remaining: Option<u32>,
    pub reset_after: Option<Duration>,
    pub global: bool,
}

impl RateLimitHeaders {
    /// Read the rate-limit headers; unparsable values count as absent
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        Self {
            remaining: get(HEADER_REMAINING).and_then(|v| v.trim().parse().ok()),
            reset_after: get(HEADER_RESET_AFTER)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64),
            global: get(HEADER_GLOBAL).is_some_and(|v| !v.eq_ignore_ascii_case("false")),
        }
    }

    /// Whether the window is used up
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// Shared bucket table plus the global lock
///
/// Safe to share between any number of concurrent callers; waits on one route never
/// hold a lock that another route needs.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<RouteKey, Bucket>,
    global_reset_at: Mutex<Option<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a call on `route` is allowed
    ///
    /// Re-checks after every sleep, so a lock recorded while waiting is honored too.
    pub async fn acquire(&self, route: &RouteKey) {
        loop {
            let now = Instant::now();

            if let Some(wait) = self.global_wait(now) {
                tracing::warn!(
                    route = %route,
                    wait_ms = wait.as_millis() as u64,
                    "Global rate limit hit, waiting"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if let Some(wait) = self.route_wait(route, now) {
                tracing::warn!(
                    route = %route,
                    wait_ms = wait.as_millis() as u64,
                    "Route rate limit hit, waiting"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            return;
        }
    }

    /// Record the headers of a response received at `now`
    ///
    /// Only an exhausted window (`remaining == 0`) creates a wait; it goes to the global
    /// lock when the response says so, otherwise to the route's bucket.
    pub fn update(&self, route: &RouteKey, headers: &RateLimitHeaders, now: Instant) {
        let reset_at = headers
            .is_exhausted()
            .then(|| now + headers.reset_after.unwrap_or_default());

        if headers.global {
            if let Some(reset_at) = reset_at {
                tracing::warn!(
                    reset_after_ms = headers.reset_after.unwrap_or_default().as_millis() as u64,
                    "Global rate limit exhausted"
                );
                self.lock_globally_until(reset_at);
            }
            return;
        }

        let mut bucket = self.buckets.entry(route.clone()).or_default();
        bucket.remaining = headers.remaining.or(bucket.remaining);
        if let Some(reset_at) = reset_at {
            tracing::debug!(
                route = %route,
                reset_after_ms = headers.reset_after.unwrap_or_default().as_millis() as u64,
                "Route rate limit exhausted"
            );
            bucket.reset_at = Some(bucket.reset_at.map_or(reset_at, |r| r.max(reset_at)));
        }
    }

    /// Block every route until `reset_at` (never shortens an existing lock)
    pub fn lock_globally_until(&self, reset_at: Instant) {
        let mut global = self.global_reset_at.lock();
        let current = *global;
        *global = Some(current.map_or(reset_at, |r| r.max(reset_at)));
    }

    /// Block one route until `reset_at` (never shortens an existing lock)
    pub fn lock_route_until(&self, route: &RouteKey, reset_at: Instant) {
        let mut bucket = self.buckets.entry(route.clone()).or_default();
        bucket.reset_at = Some(bucket.reset_at.map_or(reset_at, |r| r.max(reset_at)));
    }

    /// Current state of a route's bucket
    pub fn bucket(&self, route: &RouteKey) -> Option<Bucket> {
        self.buckets.get(route).map(|b| *b)
    }

    fn global_wait(&self, now: Instant) -> Option<Duration> {
        let reset_at = *self.global_reset_at.lock();
        reset_at
            .filter(|reset_at| *reset_at > now)
            .map(|reset_at| reset_at - now)
    }

    fn route_wait(&self, route: &RouteKey, now: Instant) -> Option<Duration> {
        self.buckets.get(route).and_then(|b| b.wait_time(now))
    }
}
