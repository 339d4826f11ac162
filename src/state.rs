//! Shared application state for Axum handlers.
//!
//! Holds the configuration, the rate limiter and the lifecycle handles of
//! background tasks. Cloning is cheap; everything is behind `Arc`.
//!
//! # Structured Concurrency
//!
//! Background tasks are managed using `tokio_util::task::TaskTracker` and
//! `CancellationToken`. Call `shutdown()` to stop them before exit.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::metrics;
use crate::middleware::ClientAddressResolver;
use crate::throttle::{CounterStore, MemoryStore, RateLimiter, default_tiers};

/// Shared application state for Axum handlers.
///
/// # Lifecycle
///
/// Creating the state spawns the counter sweeper, so it must happen inside a
/// Tokio runtime:
///
/// ```rust,ignore
/// let state = AppState::new(config);
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Rate limiter shared by every throttled route
    pub limiter: Arc<RateLimiter>,
    /// Client address resolution policy
    pub resolver: Arc<ClientAddressResolver>,
    /// Timestamp when the application started
    pub started_at: Instant,
    task_tracker: TaskTracker,
    cancellation_token: CancellationToken,
}

impl AppState {
    /// State backed by the in-memory counter store.
    pub fn new(config: Config) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// State backed by `store`.
    pub fn with_store(config: Config, store: Arc<dyn CounterStore>) -> Self {
        let tiers = default_tiers(config.throttle_limit, config.throttle_ttl);
        if tiers.is_empty() {
            warn!("THROTTLE_LIMIT is 0, global rate limit tiers are disabled");
        }

        let resolver = ClientAddressResolver::new(config.trust_proxy, config.trusted_proxies.clone());

        let state = Self {
            limiter: Arc::new(RateLimiter::new(store, tiers)),
            resolver: Arc::new(resolver),
            config: Arc::new(config),
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_sweeper_task();
        state
    }

    /// Periodically drop expired counter records.
    fn spawn_sweeper_task(&self) {
        let store = self.limiter.store().clone();
        let period = self.config.throttle_sweep_interval;
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Counter sweeper received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => sweep(store.as_ref()).await,
                }
            }

            debug!("Counter sweeper shutting down");
        });
    }

    /// Whether `shutdown()` has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Flag the service as shutting down; `/ready` starts answering 503.
    pub fn begin_shutdown(&self) {
        self.cancellation_token.cancel();
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// Signals cancellation, closes the tracker and waits for every task.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.begin_shutdown();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

async fn sweep(store: &dyn CounterStore) {
    match store.sweep().await {
        Ok(removed) => {
            trace!(removed, "Expired rate limit records swept");
            if let Some(live) = store.len() {
                metrics::set_rate_limit_records(live);
            }
        }
        Err(e) => warn!(error = %e, "Rate limit sweep failed"),
    }
}
