//! The request processing pipeline.
//!
//! Every request passes through these stages in a fixed order:
//!
//! ```text
//! normalize_errors → capture_context → log_requests → [CORS, catch-panic, body limit]
//!     → enforce_rate_limit (per route) → validating extractors → handler
//! ```
//!
//! - [`context`]: derives the [`RequestContext`] (request id, client address,
//!   method, path) once, for all later stages.
//! - [`rate_limit`]: multi-tier fixed-window admission control, registered per
//!   route together with its pattern.
//! - [`logging`]: one start and one end record per request, even on failure
//!   or cancellation.
//! - [`normalize`]: renders every failure as the JSON error envelope.
//!
//! Stages fail by returning [`crate::error::AppError`]; none swallows a
//! failure.

pub mod context;
pub mod ip;
pub mod logging;
pub mod normalize;
pub mod rate_limit;

#[cfg(test)]
pub(crate) mod log_capture;

pub use context::{REQUEST_ID_HEADER, RequestContext, capture_context};
pub use ip::{CidrRange, ClientAddressResolver, UNKNOWN_IP};
pub use logging::log_requests;
pub use normalize::{NormalizerSettings, normalize_errors, panic_response};
pub use rate_limit::{
    RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER, RouteGuard, enforce_rate_limit,
};
