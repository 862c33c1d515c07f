//! Request middleware: request ids, authentication and rate limiting.

use crate::handler::{AppState, ServerError};
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{DefaultKeyedRateLimiter, Quota};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::time::Duration;
use toolguard_core::RequestId;
use tracing::Instrument;

/// Response header carrying the request id
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Token-bucket request budget per client address
pub struct RateLimiter {
    limiter: Option<DefaultKeyedRateLimiter<IpAddr>>,
    window: Duration,
}

impl RateLimiter {
    /// Allow `limit` requests per client per minute; `0` disables limiting
    #[must_use]
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Allow a burst of `limit` requests per client, refilled over `window`
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        let limiter = NonZeroU32::new(limit).and_then(|burst| {
            Quota::with_period(window / limit)
                .map(|quota| DefaultKeyedRateLimiter::keyed(quota.allow_burst(burst)))
        });
        Self { limiter, window }
    }

    /// Whether any limit applies
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// Refill period of a full budget
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count a request from `client`; false when over the limit
    pub fn check(&self, client: IpAddr) -> bool {
        self.limiter
            .as_ref()
            .is_none_or(|limiter| limiter.check_key(&client).is_ok())
    }

    /// Forget clients whose budget is full again
    pub fn retain_recent(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.retain_recent();
            limiter.shrink_to_fit();
        }
    }

    /// Number of clients currently tracked
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.limiter.as_ref().map_or(0, |limiter| limiter.len())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.is_enabled())
            .field("window", &self.window)
            .field("tracked_clients", &self.tracked_clients())
            .finish()
    }
}

fn request_id_of(req: &Request<Body>) -> RequestId {
    req.extensions().get::<RequestId>().copied().unwrap_or_default()
}

fn client_ip(req: &Request<Body>) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |info| info.0.ip())
}

/// Assign a request id, run the request inside a span carrying it, and echo
/// it in the `x-request-id` response header
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let id = RequestId::new();
    req.extensions_mut().insert(id);
    let span = tracing::info_span!("request", request_id = %id, method = %req.method(), path = %req.uri().path());

    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Reject clients over their request budget with 429
pub async fn rate_limit(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let client = client_ip(&req);
    if !state.limiter.check(client) {
        tracing::warn!(%client, "rate limit exceeded");
        return ServerError::RateLimited
            .for_request(request_id_of(&req))
            .into_response();
    }
    next.run(req).await
}

/// Require the configured API key with 401 otherwise
pub async fn require_api_key(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if let Err(err) = state.auth.authenticate(req.headers()) {
        return ServerError::from(err)
            .for_request(request_id_of(&req))
            .into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_per_client() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(a));
        assert!(limiter.check(a));
        assert!(!limiter.check(a));
        assert!(limiter.check(b));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_retain_keeps_limited_clients() {
        let limiter = RateLimiter::per_minute(1);
        let a: IpAddr = "10.0.0.1".parse().unwrap();

        assert!(limiter.check(a));
        limiter.retain_recent();
        assert!(!limiter.check(a));
    }

    #[test]
    fn test_zero_disables() {
        let limiter = RateLimiter::per_minute(0);
        assert!(!limiter.is_enabled());
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        for _ in 0..1000 {
            assert!(limiter.check(a));
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }
}
