use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::routes::WaitlistResponse;

pub const RATE_LIMIT_MESSAGE: &str = "Too many signup attempts. Please try again later.";

// Expired windows are swept past this many clients.
const SWEEP_THRESHOLD: usize = 10_000;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allow { remaining: u32, reset_after: Duration },
    Reject { retry_after: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: Instant,
    hits: u32,
}

pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self::with_clock(max_requests, window, Arc::new(SystemClock))
    }

    pub fn with_clock(max_requests: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_requests,
            window,
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn check(&self, client: IpAddr) -> RateLimitDecision {
        let now = self.clock.now();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if windows.len() > SWEEP_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.saturating_duration_since(w.started_at) < window);
        }

        let entry = windows.entry(client).or_insert(Window {
            started_at: now,
            hits: 0,
        });
        if now.saturating_duration_since(entry.started_at) >= self.window {
            *entry = Window {
                started_at: now,
                hits: 0,
            };
        }
        entry.hits = entry.hits.saturating_add(1);

        let reset_after = self
            .window
            .saturating_sub(now.saturating_duration_since(entry.started_at));
        if entry.hits > self.max_requests {
            RateLimitDecision::Reject {
                retry_after: reset_after,
            }
        } else {
            RateLimitDecision::Allow {
                remaining: self.max_requests - entry.hits,
                reset_after,
            }
        }
    }
}

pub async fn limit_signups(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check(peer.ip()) {
        RateLimitDecision::Allow {
            remaining,
            reset_after,
        } => {
            let mut response = next.run(request).await;
            insert_rate_limit_headers(
                response.headers_mut(),
                limiter.max_requests(),
                remaining,
                reset_after,
            );
            response
        }
        RateLimitDecision::Reject { retry_after } => {
            tracing::warn!(client = %peer.ip(), "Signup rate limit exceeded");

            let mut headers = HeaderMap::new();
            insert_rate_limit_headers(&mut headers, limiter.max_requests(), 0, retry_after);
            headers.insert(
                HeaderName::from_static("retry-after"),
                HeaderValue::from(ceil_secs(retry_after)),
            );

            (
                StatusCode::TOO_MANY_REQUESTS,
                headers,
                Json(WaitlistResponse::rejected(RATE_LIMIT_MESSAGE)),
            )
                .into_response()
        }
    }
}

fn insert_rate_limit_headers(
    headers: &mut HeaderMap,
    limit: u32,
    remaining: u32,
    reset_after: Duration,
) {
    headers.insert(
        HeaderName::from_static("ratelimit-limit"),
        HeaderValue::from(limit),
    );
    headers.insert(
        HeaderName::from_static("ratelimit-remaining"),
        HeaderValue::from(remaining),
    );
    headers.insert(
        HeaderName::from_static("ratelimit-reset"),
        HeaderValue::from(ceil_secs(reset_after)),
    );
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
