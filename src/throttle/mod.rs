//! Multi-tier fixed-window rate limiting.
//!
//! # Algorithm
//!
//! Every tier owns one counter per `(tier, client address, route)` bucket.
//! A request increments the bucket of each tier in evaluation order; the
//! first tier whose post-increment count exceeds its limit rejects the
//! request. A request is admitted only when every tier admits it.
//!
//! # Known Limitations
//!
//! - Fixed windows: a burst straddling a window boundary can reach up to twice
//!   the nominal rate.
//! - Tiers evaluated before the rejecting tier keep their increment, so a
//!   rejected request still consumes quota there. Later tiers are untouched.
//! - Counters are process-local with [`MemoryStore`]; replicas do not share
//!   limits.
//!
//! # Route Registration
//!
//! Buckets are keyed by the registered route pattern (`/users/{id}`), never the
//! concrete path, so path parameters cannot multiply the number of buckets.
//! Patterns are passed in explicitly through [`RoutePolicy`] when routes are
//! set up.

mod store;
mod tier;

use std::slice;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::error::AppResult;
use crate::middleware::context::RequestContext;

pub use store::{CounterStore, MemoryStore, RateLimitRecord};
pub use tier::{LONG, MEDIUM, SHORT, TierDefinition, default_tiers};

/// How a route is throttled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Throttle {
    /// The global short/medium/long tiers.
    Tiers,
    /// A single route-specific tier replacing the global ones.
    Override(TierDefinition),
    /// No rate limiting.
    Skip,
}

impl Throttle {
    /// Route-specific limit of `max_requests` per `window`.
    pub fn limit(max_requests: u32, window: Duration) -> Self {
        Throttle::Override(TierDefinition::new("route", window, max_requests))
    }
}

/// Rate limiting policy registered together with a route.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    pub pattern: &'static str,
    pub throttle: Throttle,
}

impl RoutePolicy {
    pub fn new(pattern: &'static str, throttle: Throttle) -> Self {
        Self { pattern, throttle }
    }
}

/// Identity a counter is kept for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub client_address: String,
    pub route_key: String,
    pub tier_name: String,
}

impl RequestIdentity {
    pub fn new(context: &RequestContext, route: &RoutePolicy, tier_name: &str) -> Self {
        Self {
            client_address: context.client_address.clone(),
            route_key: format!("{} {}", context.method, route.pattern),
            tier_name: tier_name.to_owned(),
        }
    }

    /// Store key: `tier:client:route`.
    pub fn bucket_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.tier_name, self.client_address, self.route_key
        )
    }
}

/// Remaining allowance in the most constrained tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
}

/// Outcome of [`RateLimiter::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Admitted. `quota` is `None` when no tier applied.
    Admit { quota: Option<Quota> },
    /// Rejected by `tier`.
    Reject {
        tier: String,
        limit: u32,
        retry_after: Duration,
    },
}

/// Admission control over a [`CounterStore`].
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    tiers: Vec<TierDefinition>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, tiers: Vec<TierDefinition>) -> Self {
        Self { store, tiers }
    }

    /// In-memory limiter with the given global tiers.
    pub fn in_memory(tiers: Vec<TierDefinition>) -> Self {
        Self::new(Arc::new(MemoryStore::new()), tiers)
    }

    pub fn tiers(&self) -> &[TierDefinition] {
        &self.tiers
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Count this request against every applicable tier.
    ///
    /// # Errors
    ///
    /// Propagates store failures; the in-memory store never fails.
    pub async fn check(&self, context: &RequestContext, route: &RoutePolicy) -> AppResult<Decision> {
        let tiers: &[TierDefinition] = match &route.throttle {
            Throttle::Skip => return Ok(Decision::Admit { quota: None }),
            Throttle::Override(tier) => slice::from_ref(tier),
            Throttle::Tiers => &self.tiers,
        };

        let mut tightest: Option<Quota> = None;
        for tier in tiers {
            let identity = RequestIdentity::new(context, route, &tier.name);
            let record = self
                .store
                .increment(&identity.bucket_key(), tier.window)
                .await?;

            trace!(
                key = %record.key,
                count = record.count,
                limit = tier.max_requests,
                "Rate limit bucket incremented"
            );

            if record.count > tier.max_requests {
                return Ok(Decision::Reject {
                    tier: tier.name.clone(),
                    limit: tier.max_requests,
                    retry_after: record.retry_after(Instant::now()),
                });
            }

            let quota = Quota {
                limit: tier.max_requests,
                remaining: tier.max_requests - record.count,
            };
            if tightest.is_none_or(|t| quota.remaining < t.remaining) {
                tightest = Some(quota);
            }
        }

        Ok(Decision::Admit { quota: tightest })
    }
}
