//! Fixed-window rate limiting for run-starting requests.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;

/// Message returned with every 429.
pub const RATE_LIMIT_MESSAGE: &str = "Too many requests. Please wait a moment.";

/// Paths under this prefix are throttled; everything else passes.
const THROTTLED_PREFIX: &str = "/run/";

/// A single process-wide fixed-window counter.
///
/// The window starts at the first request after the previous window ran
/// out, and admits at most `max_requests` until it ends.
pub struct FixedWindowLimiter {
    max_requests: u32,
    window: Duration,
    current: Mutex<Option<Window>>,
}

#[derive(Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            current: Mutex::new(None),
        }
    }

    /// Count a request now. Returns `true` if it is allowed.
    pub fn check(&self) -> bool {
        self.check_at(Instant::now())
    }

    /// Count a request at `now`.
    pub fn check_at(&self, now: Instant) -> bool {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());

        let window = match *current {
            Some(w) if now.saturating_duration_since(w.started) < self.window => w,
            _ => Window {
                started: now,
                count: 0,
            },
        };

        if window.count >= self.max_requests {
            *current = Some(window);
            return false;
        }

        *current = Some(Window {
            count: window.count + 1,
            ..window
        });
        true
    }
}

/// Rejects run-starting requests over the limit with 429 and a JSON error.
pub async fn rate_limit_middleware(
    limiter: Arc<FixedWindowLimiter>,
    req: Request,
    next: Next,
) -> Response {
    if !req.uri().path().starts_with(THROTTLED_PREFIX) {
        return next.run(req).await;
    }

    if !limiter.check() {
        warn!(path = %req.uri().path(), "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": RATE_LIMIT_MESSAGE })),
        )
            .into_response();
    }

    next.run(req).await
}
