//! Bearer authentication for teacher routes and rate limiting for submissions.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// Default number of submissions one client may post per minute.
pub const DEFAULT_SUBMIT_RATE_LIMIT: u32 = 60;

/// Security configuration loaded from environment variables.
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    /// Bearer token required on teacher routes (`RUBRIQ_API_KEY`).
    pub api_key: Option<String>,
    /// Allowed CORS origins (`RUBRIQ_CORS_ORIGINS`, comma-separated).
    pub cors_origins: Option<Vec<String>>,
    /// Per-client limit on `/submit` (`RUBRIQ_SUBMIT_RATE_LIMIT` per minute).
    /// Clients are keyed by peer address unless `RUBRIQ_TRUST_PROXY` is set.
    pub submit_limiter: Option<RateLimiter>,
}

impl SecurityConfig {
    pub fn from_env() -> Self {
        let api_key = std::env::var("RUBRIQ_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let cors_origins = std::env::var("RUBRIQ_CORS_ORIGINS")
            .ok()
            .map(|s| s.split(',').map(|s| s.trim().to_string()).collect());

        let rate_limit = std::env::var("RUBRIQ_SUBMIT_RATE_LIMIT")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_SUBMIT_RATE_LIMIT);

        let trust_proxy = std::env::var("RUBRIQ_TRUST_PROXY")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        // A limit of 0 turns limiting off.
        let submit_limiter = (rate_limit > 0).then(|| {
            let limiter = RateLimiter::new(rate_limit, Duration::from_secs(60));
            if trust_proxy {
                limiter.trusting_proxy_headers()
            } else {
                limiter
            }
        });

        Self {
            api_key,
            cors_origins,
            submit_limiter,
        }
    }

    /// No authentication and no limits.
    pub fn disabled() -> Self {
        Self {
            api_key: None,
            cors_origins: None,
            submit_limiter: None,
        }
    }

    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::disabled()
        }
    }

    pub fn with_submit_rate_limit(max_requests: u32) -> Self {
        Self {
            submit_limiter: Some(RateLimiter::new(max_requests, Duration::from_secs(60))),
            ..Self::disabled()
        }
    }

    /// Keys the submit limiter on `X-Forwarded-For`/`X-Real-IP`. Only safe
    /// behind a reverse proxy that overwrites those headers.
    pub fn trusting_proxy_headers(self) -> Self {
        Self {
            submit_limiter: self.submit_limiter.map(RateLimiter::trusting_proxy_headers),
            ..self
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// In-memory sliding-window rate limiter keyed by client IP.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    trust_proxy_headers: bool,
    requests: Arc<Mutex<HashMap<IpAddr, Vec<Instant>>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            trust_proxy_headers: false,
            requests: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn trusting_proxy_headers(self) -> Self {
        Self {
            trust_proxy_headers: true,
            ..self
        }
    }

    /// Records a request from `ip`. Returns false if it is over the limit.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.lock().expect("rate limiter lock poisoned");

        // Drop timestamps outside the window, and idle clients with them.
        requests.retain(|_, timestamps| {
            timestamps.retain(|&t| now.duration_since(t) < self.window);
            !timestamps.is_empty()
        });

        let entry = requests.entry(ip).or_default();
        if entry.len() < self.max_requests as usize {
            entry.push(now);
            true
        } else {
            false
        }
    }
}

pub async fn auth_middleware(
    State(config): State<SecurityConfig>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected_key) = &config.api_key else {
        return Ok(next.run(request).await);
    };

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) if token == expected_key => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!("Invalid API key provided");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("Missing or malformed Authorization header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

pub async fn rate_limit_middleware(
    State(rate_limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let ip = client_ip(&request, rate_limiter.trust_proxy_headers);

    if rate_limiter.check(ip) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(%ip, "Submission rate limit exceeded");
        Err(StatusCode::TOO_MANY_REQUESTS)
    }
}

/// Client address for rate limiting.
///
/// Proxy headers are client-controlled, so they are read only when
/// `trust_proxy` is set. Otherwise the peer address is used, falling back
/// to loopback when the server was started without connect info.
fn client_ip(request: &Request<Body>, trust_proxy: bool) -> IpAddr {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    if !trust_proxy {
        return peer;
    }

    let header = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    if let Some(ip) = header("X-Forwarded-For")
        .and_then(|v| v.split(',').next().and_then(|ip| ip.trim().parse().ok()))
    {
        return ip;
    }
    if let Some(ip) = header("X-Real-IP").and_then(|v| v.trim().parse().ok()) {
        return ip;
    }

    peer
}
