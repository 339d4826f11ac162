//! Tier definitions.
//!
//! # Global Tiers
//!
//! | Tier     | Window        | Limit         |
//! |----------|---------------|---------------|
//! | `short`  | base          | base          |
//! | `medium` | base ×10      | base ×10      |
//! | `long`   | base ×60      | base ×60      |
//!
//! The base comes from `THROTTLE_TTL_MS` and `THROTTLE_LIMIT`. With the
//! defaults (60 s, 100 requests) that is 100/min, 1 000/10 min and
//! 6 000/hour.
//!
//! # Overrides
//!
//! A route may replace all three with one tier of its own through
//! [`Throttle::limit`](super::Throttle::limit).

use std::time::Duration;

pub const SHORT: &str = "short";
pub const MEDIUM: &str = "medium";
pub const LONG: &str = "long";

/// A fixed-window limit: at most `max_requests` per `window`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierDefinition {
    pub name: String,
    pub window: Duration,
    pub max_requests: u32,
}

impl TierDefinition {
    pub fn new(name: impl Into<String>, window: Duration, max_requests: u32) -> Self {
        Self {
            name: name.into(),
            window,
            max_requests,
        }
    }

    /// A scaled copy of this tier: window and limit both multiplied by `factor`.
    fn scaled(&self, name: &str, factor: u32) -> Self {
        Self::new(
            name,
            self.window.saturating_mul(factor),
            self.max_requests.saturating_mul(factor),
        )
    }
}

/// The three global tiers derived from one base limit and window.
///
/// `short` is the base, `medium` is ×10 in both window and limit, `long` is
/// ×60 in both. With a one minute base window this gives 1 minute, 10 minute
/// and 1 hour windows. Evaluation order is the order of the returned vector.
///
/// A `limit` of 0 disables the global tiers and yields an empty list.
pub fn default_tiers(limit: u32, window: Duration) -> Vec<TierDefinition> {
    if limit == 0 {
        return Vec::new();
    }

    let short = TierDefinition::new(SHORT, window, limit);
    let medium = short.scaled(MEDIUM, 10);
    let long = short.scaled(LONG, 60);
    vec![short, medium, long]
}
