//! Fixed-window request limiting per client address.

use crate::{config::RateLimitConfig, errors::AppError};
use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window closes.
    pub reset_after: Duration,
}

/// Counter store behind the limiter. Injected so it can be swapped for a shared cache.
#[async_trait]
pub trait RateLimitStore: Send + Sync + 'static {
    /// Records one request for `key` at `now` and says whether it is within quota.
    async fn hit(&self, key: &str, now: Instant) -> RateLimitDecision;
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct InMemoryRateLimitStore {
    max_requests: u32,
    window: Duration,
    state: Mutex<StoreState>,
}

#[derive(Debug)]
struct StoreState {
    windows: HashMap<String, Window>,
    last_prune: Option<Instant>,
}

impl InMemoryRateLimitStore {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window,
            state: Mutex::new(StoreState {
                windows: HashMap::new(),
                last_prune: None,
            }),
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.state.lock().map(|s| s.windows.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn hit(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            // Counters are plain integers, a panic elsewhere cannot leave them half-written.
            Err(poisoned) => poisoned.into_inner(),
        };

        // Drop expired windows at most once per window length.
        let prune_due = state
            .last_prune
            .is_none_or(|last| now.saturating_duration_since(last) >= self.window);
        if prune_due {
            let window = self.window;
            state
                .windows
                .retain(|_, w| now.saturating_duration_since(w.started) < window);
            state.last_prune = Some(now);
        }

        let entry = state.windows.entry(key.to_string()).or_insert(Window { started: now, count: 0 });
        if now.saturating_duration_since(entry.started) >= self.window {
            *entry = Window { started: now, count: 0 };
        }
        entry.count = entry.count.saturating_add(1);

        RateLimitDecision {
            allowed: entry.count <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.count),
            reset_after: self.window.saturating_sub(now.saturating_duration_since(entry.started)),
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }
}

/// Socket peer address, else the first `X-Forwarded-For` hop, else a shared bucket.
pub fn client_key(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(State(limiter): State<RateLimiter>, request: Request, next: Next) -> Response {
    let key = client_key(&request);
    let decision = limiter.store.hit(&key, Instant::now()).await;

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, limit = decision.limit, "Rate limit exceeded");
        AppError::RateLimited {
            retry_after_secs: ceil_secs(decision.reset_after),
        }
        .into_response()
    };

    insert_rate_limit_headers(response.headers_mut(), &decision);
    response
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    let values = [
        ("ratelimit-limit", decision.limit.to_string()),
        ("ratelimit-remaining", decision.remaining.to_string()),
        ("ratelimit-reset", ceil_secs(decision.reset_after).to_string()),
    ];
    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}
