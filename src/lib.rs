//! # Service Scaffold
//!
//! An Axum service template whose every request runs through one pipeline:
//!
//! - **Rate limiting**: three fixed-window tiers per client and route pattern,
//!   with per-route overrides
//! - **Validation**: whitelisted, coerced input with all violations reported
//! - **Logging**: one start and one end record per request, even on failure
//! - **Error normalization**: a single JSON envelope for every failure
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Error Normalizer → Context → Logger → CORS/Panic/Limits    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Rate Limiter (per route) → Validating extractors           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, examples)                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CounterStore (in-memory DashMap, swept in background)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use service_scaffold::{AppState, Config, utils};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let listener = TcpListener::bind(config.server_addr()).await?;
//!     let state = AppState::new(config);
//!
//!     utils::serve(listener, state, utils::shutdown_signal()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Rate Limit Configuration
//!
//! ```bash
//! THROTTLE_TTL_MS=60000 THROTTLE_LIMIT=100 cargo run
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod throttle;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult, ErrorEnvelope};
pub use routes::build_router;
pub use state::AppState;
