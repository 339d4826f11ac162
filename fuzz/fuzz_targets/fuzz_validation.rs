//! Fuzz testing for input validation.
//!
//! Feeds arbitrary bytes to the schema validator and the date parser and
//! checks that neither panics.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the validation fuzz target
//! cargo +nightly fuzz run fuzz_validation
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_validation -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `Schema::check` via `validate::<CreateUserRequest>` and
//!   `validate::<ListUsersQuery>` on any JSON object
//! - `ParseDate` in required and optional mode on any UTF-8 string

#![no_main]

use libfuzzer_sys::fuzz_target;
use service_scaffold::models::{CreateUserRequest, ListUsersQuery};
use service_scaffold::validation::{ParseDate, validate};

fuzz_target!(|data: &[u8]| {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_slice(data) {
        let _ = validate::<CreateUserRequest>(&map);
        let _ = validate::<ListUsersQuery>(&map);
    }

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = ParseDate::required("date").parse(Some(s));
        let _ = ParseDate::optional("date").parse(Some(s));
    }
});
