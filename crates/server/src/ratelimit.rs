//! Rate limiting middleware built on governor's keyed token buckets.
//!
//! Two gates are applied:
//! - per client IP, before authentication
//! - per token, after authentication
//!
//! Each gate tracks when a key was last seen so stale keys can be evicted by a
//! background task. New keys are rejected once `max_entries` is reached.
//!
//! Forwarded headers (`X-Forwarded-For`, `X-Real-IP`) are only honored when the
//! connection comes from a configured trusted proxy.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::{DashMap, mapref::entry::Entry};
use farmgate_core::config::RateLimitConfig;
use governor::{
    Quota, RateLimiter, clock::Clock, clock::DefaultClock, middleware::NoOpMiddleware,
    state::InMemoryState,
};
use ipnet::IpNet;
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

type KeyedLimiter =
    RateLimiter<String, DashMap<String, InMemoryState>, DefaultClock, NoOpMiddleware>;

/// Rebuild a limiter once at least this many keys were evicted in one sweep.
const REBUILD_MIN_EVICTIONS: usize = 100;

/// Rebuild anyway after this long, so governor's key map cannot grow forever.
const REBUILD_MAX_AGE: Duration = Duration::from_secs(300);

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReason {
    RateLimited,
    /// Too many distinct keys are tracked already.
    AtCapacity,
}

/// Rejection returned by the gates; renders as 429 with `Retry-After`.
#[derive(Debug)]
pub struct RateLimitError {
    pub retry_after_secs: u64,
    pub reason: RateLimitReason,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let (code, message) = match self.reason {
            RateLimitReason::RateLimited => (
                "rate_limit_exceeded",
                format!(
                    "Rate limit exceeded. Retry after {} seconds.",
                    self.retry_after_secs
                ),
            ),
            RateLimitReason::AtCapacity => (
                "rate_limiter_at_capacity",
                "Server is under heavy load. Please retry later.".to_string(),
            ),
        };

        let body = serde_json::json!({
            "code": code,
            "message": message,
            "retry_after": self.retry_after_secs,
        });

        (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", self.retry_after_secs.to_string())],
            axum::Json(body),
        )
            .into_response()
    }
}

/// One keyed limiter plus the bookkeeping needed to evict idle keys.
struct KeyedGate {
    label: &'static str,
    quota: Quota,
    limiter: RwLock<KeyedLimiter>,
    last_seen: DashMap<String, Instant>,
    last_rebuild: RwLock<Instant>,
    capacity_warned: AtomicBool,
}

impl KeyedGate {
    fn new(label: &'static str, quota: Quota) -> Self {
        Self {
            label,
            quota,
            limiter: RwLock::new(RateLimiter::dashmap(quota)),
            last_seen: DashMap::new(),
            last_rebuild: RwLock::new(Instant::now()),
            capacity_warned: AtomicBool::new(false),
        }
    }

    fn check(&self, key: &str, max_entries: usize) -> Result<(), RateLimitError> {
        // len() must be read before taking an entry lock.
        let tracked = self.last_seen.len();

        match self.last_seen.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                entry.insert(Instant::now());
            }
            Entry::Vacant(entry) => {
                if tracked >= max_entries {
                    if !self.capacity_warned.swap(true, Ordering::Relaxed) {
                        tracing::warn!(
                            gate = self.label,
                            tracked,
                            max_entries,
                            "Rate limiter at capacity, rejecting new keys"
                        );
                    }
                    return Err(RateLimitError {
                        retry_after_secs: 60,
                        reason: RateLimitReason::AtCapacity,
                    });
                }
                entry.insert(Instant::now());
            }
        }

        let limiter = self
            .limiter
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        limiter.check_key(&key.to_string()).map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            RateLimitError {
                retry_after_secs: wait.as_secs() + 1,
                reason: RateLimitReason::RateLimited,
            }
        })
    }

    /// Drop keys idle for longer than `ttl`. Returns how many were dropped.
    fn evict(&self, ttl: Duration, now: Instant) -> usize {
        let stale: Vec<String> = self
            .last_seen
            .iter()
            .filter(|entry| now.duration_since(*entry.value()) > ttl)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for key in stale {
            // Re-check under the shard lock; the key may have been touched since.
            if self
                .last_seen
                .remove_if(&key, |_, seen| now.duration_since(*seen) > ttl)
                .is_some()
            {
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.capacity_warned.store(false, Ordering::Relaxed);
            if self.rebuild_due(evicted, now) {
                self.rebuild(now);
            }
        }
        evicted
    }

    fn rebuild_due(&self, evicted: usize, now: Instant) -> bool {
        let tracked_before = self.last_seen.len() + evicted;
        let threshold = (tracked_before / 10).max(REBUILD_MIN_EVICTIONS);
        if evicted >= threshold {
            return true;
        }
        let last = self
            .last_rebuild
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        now.duration_since(*last) >= REBUILD_MAX_AGE
    }

    /// Governor cannot forget individual keys, so the whole limiter is replaced.
    /// Active keys lose their accumulated budget.
    fn rebuild(&self, now: Instant) {
        *self
            .limiter
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = RateLimiter::dashmap(self.quota);
        *self
            .last_rebuild
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
        tracing::debug!(
            gate = self.label,
            remaining = self.last_seen.len(),
            "Rebuilt rate limiter"
        );
    }
}

#[derive(Clone, Debug)]
enum TrustedEntry {
    Ip(IpAddr),
    Cidr(IpNet),
}

/// Which peers may set forwarded headers.
#[derive(Clone, Debug)]
enum TrustedProxies {
    None,
    All,
    List(Vec<TrustedEntry>),
}

impl TrustedProxies {
    fn from_config(proxies: &[String]) -> Self {
        match proxies {
            [] => Self::None,
            [only] if only == "*" => Self::All,
            _ => Self::List(
                proxies
                    .iter()
                    .filter_map(|p| {
                        let parsed = if p.contains('/') {
                            p.parse::<IpNet>().map(TrustedEntry::Cidr).map_err(|e| e.to_string())
                        } else {
                            p.parse::<IpAddr>().map(TrustedEntry::Ip).map_err(|e| e.to_string())
                        };
                        parsed
                            .map_err(|e| {
                                tracing::warn!(entry = %p, error = %e, "Ignoring invalid trusted_proxies entry");
                            })
                            .ok()
                    })
                    .collect(),
            ),
        }
    }

    fn is_trusted(&self, peer: IpAddr) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::List(entries) => entries.iter().any(|entry| match entry {
                TrustedEntry::Ip(ip) => *ip == peer,
                TrustedEntry::Cidr(net) => net.contains(&peer),
            }),
        }
    }
}

struct Gates {
    ip: KeyedGate,
    token: KeyedGate,
    trusted_proxies: TrustedProxies,
    max_entries: usize,
    entry_ttl: Duration,
    connect_info_warned: AtomicBool,
}

/// Rate limiter state shared across requests. Disabled limiting allocates nothing.
#[derive(Clone)]
pub struct RateLimitState {
    inner: Option<Arc<Gates>>,
}

fn per_minute(requests: u32, fallback: u32, burst: u32) -> Quota {
    let rate = NonZeroU32::new(requests)
        .or(NonZeroU32::new(fallback))
        .unwrap_or(NonZeroU32::MIN);
    Quota::per_minute(rate).allow_burst(NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN))
}

impl RateLimitState {
    pub fn new(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self { inner: None };
        }

        let ip_quota = per_minute(config.ip_requests_per_minute, 60, config.burst_size);
        // Authenticated callers get twice the burst.
        let token_quota = per_minute(
            config.token_requests_per_minute,
            600,
            config.burst_size.saturating_mul(2),
        );

        Self {
            inner: Some(Arc::new(Gates {
                ip: KeyedGate::new("ip", ip_quota),
                token: KeyedGate::new("token", token_quota),
                trusted_proxies: TrustedProxies::from_config(&config.trusted_proxies),
                max_entries: config.max_entries as usize,
                entry_ttl: Duration::from_secs(config.entry_ttl_secs),
                connect_info_warned: AtomicBool::new(false),
            })),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn check_ip(&self, ip: &str) -> Result<(), RateLimitError> {
        match &self.inner {
            Some(gates) => gates.ip.check(ip, gates.max_entries),
            None => Ok(()),
        }
    }

    pub fn check_token(&self, token_id: &str) -> Result<(), RateLimitError> {
        match &self.inner {
            Some(gates) => gates.token.check(token_id, gates.max_entries),
            None => Ok(()),
        }
    }

    /// Evict idle keys from both gates. Returns the total evicted.
    pub fn cleanup(&self) -> usize {
        let Some(gates) = &self.inner else {
            return 0;
        };
        let now = Instant::now();
        let evicted = gates.ip.evict(gates.entry_ttl, now) + gates.token.evict(gates.entry_ttl, now);
        if evicted > 0 {
            tracing::debug!(
                evicted,
                ip_entries = gates.ip.last_seen.len(),
                token_entries = gates.token.last_seen.len(),
                "Rate limiter cleanup completed"
            );
        }
        evicted
    }

    /// Tracked (ip, token) key counts.
    pub fn entry_count(&self) -> (usize, usize) {
        match &self.inner {
            Some(gates) => (gates.ip.last_seen.len(), gates.token.last_seen.len()),
            None => (0, 0),
        }
    }

    fn client_ip(&self, req: &Request<Body>) -> String {
        let Some(gates) = &self.inner else {
            return "unknown".to_string();
        };

        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip());

        let trust_headers = match peer {
            Some(ip) => gates.trusted_proxies.is_trusted(ip),
            None => matches!(gates.trusted_proxies, TrustedProxies::All),
        };

        if trust_headers && let Some(forwarded) = forwarded_ip(req) {
            return forwarded;
        }

        match peer {
            Some(ip) => ip.to_string(),
            None => {
                if !gates.connect_info_warned.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        "ConnectInfo missing; all clients share the 'unknown' rate limit key. \
                         Serve with into_make_service_with_connect_info::<SocketAddr>()"
                    );
                }
                "unknown".to_string()
            }
        }
    }
}

fn forwarded_ip(req: &Request<Body>) -> Option<String> {
    let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok());

    if let Some(chain) = header("x-forwarded-for")
        && let Some(first) = chain.split(',').next()
    {
        return Some(first.trim().to_string());
    }
    header("x-real-ip").map(|ip| ip.trim().to_string())
}

/// Per-IP limiting; runs before authentication.
pub async fn ip_rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !rate_limit.is_enabled() {
        return next.run(req).await;
    }

    let ip = rate_limit.client_ip(&req);
    match rate_limit.check_ip(&ip) {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

/// Per-token limiting; unauthenticated requests fall through.
pub async fn token_rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let token_id = req.extensions().get::<TokenIdExtension>().cloned();
    match token_id {
        Some(TokenIdExtension(id)) if rate_limit.is_enabled() => match rate_limit.check_token(&id) {
            Ok(()) => next.run(req).await,
            Err(e) => e.into_response(),
        },
        _ => next.run(req).await,
    }
}

/// Token ID set by the auth middleware for the token gate.
#[derive(Clone)]
pub struct TokenIdExtension(pub String);

/// Periodically evict idle rate limiter keys.
pub fn spawn_cleanup_task(state: RateLimitState, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let evicted = state.cleanup();
            if evicted > 0 {
                tracing::info!(evicted, "Rate limiter evicted idle keys");
            }
        }
    })
}
